//! Covariance helpers.
//!
//! ROS carries 6×6 covariances as a flat, row-major `[f64; 36]`.  PX4 only
//! reports per-axis variances, so every matrix built here is diagonal and
//! all off-diagonal terms are exactly zero.

use px4bridge_types::Covariance6;

/// First element of an IMU covariance array meaning "this field carries no
/// estimate".  A zero matrix would instead claim a perfectly known value.
pub const ORIENTATION_UNAVAILABLE: f64 = -1.0;

/// Variance reported for each angular-velocity axis of the twist, since PX4
/// provides none.  Consumers read zero variance as exact knowledge.
pub const ANGULAR_VELOCITY_VARIANCE_FLOOR: f64 = 1e-6;

/// Build a row-major 6×6 matrix with `diagonal` on the diagonal and zeros
/// everywhere else.
pub fn diagonal6(diagonal: [f64; 6]) -> Covariance6 {
    let mut cov = [0.0; 36];
    for (i, value) in diagonal.into_iter().enumerate() {
        cov[i * 6 + i] = value;
    }
    cov
}

/// Read back the diagonal of a row-major 6×6 matrix.
pub fn diagonal_of(cov: &Covariance6) -> [f64; 6] {
    std::array::from_fn(|i| cov[i * 6 + i])
}

/// `true` when every off-diagonal entry is exactly zero.
pub fn is_diagonal(cov: &Covariance6) -> bool {
    cov.iter()
        .enumerate()
        .all(|(idx, value)| idx / 6 == idx % 6 || *value == 0.0)
}

/// Concatenate two per-axis variance triples into a 6-element diagonal.
pub fn stack(first: [f32; 3], second: [f32; 3]) -> [f64; 6] {
    [
        f64::from(first[0]),
        f64::from(first[1]),
        f64::from(first[2]),
        f64::from(second[0]),
        f64::from(second[1]),
        f64::from(second[2]),
    ]
}
