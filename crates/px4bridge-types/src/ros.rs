//! Destination schemas from the ROS 2 `common_interfaces` packages.
//!
//! Only the messages the bridges produce (and the types they are built from)
//! are defined here.  Field names match the ROS 2 IDL so the JSON form is
//! what a rosbridge client expects.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// builtin_interfaces / std_msgs
// ────────────────────────────────────────────────────────────────────────────

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// `builtin_interfaces/msg/Time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    pub fn new(sec: i32, nanosec: u32) -> Self {
        Self { sec, nanosec }
    }

    /// Build a stamp from nanoseconds.  Negative values clamp to zero and
    /// values past the `i32` seconds range clamp to the maximum stamp.
    pub fn from_nanos(nanos: i64) -> Self {
        if nanos <= 0 {
            return Self::default();
        }
        let sec = nanos / NANOS_PER_SEC;
        if sec > i64::from(i32::MAX) {
            return Self::new(i32::MAX, (NANOS_PER_SEC - 1) as u32);
        }
        Self::new(sec as i32, (nanos % NANOS_PER_SEC) as u32)
    }

    /// Build a stamp from a PX4 microsecond counter.
    pub fn from_micros(micros: u64) -> Self {
        Self::from_nanos(i64::try_from(micros.saturating_mul(1_000)).unwrap_or(i64::MAX))
    }
}

/// `std_msgs/msg/Header`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

// ────────────────────────────────────────────────────────────────────────────
// geometry_msgs
// ────────────────────────────────────────────────────────────────────────────

/// `geometry_msgs/msg/Vector3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(f64::from(v[0]), f64::from(v[1]), f64::from(v[2]))
    }
}

/// `geometry_msgs/msg/Point`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f32; 3]> for Point {
    fn from(v: [f32; 3]) -> Self {
        Self {
            x: f64::from(v[0]),
            y: f64::from(v[1]),
            z: f64::from(v[2]),
        }
    }
}

/// `geometry_msgs/msg/Quaternion`, in ROS `(x, y, z, w)` order.
///
/// The IDL default is the identity rotation, so `Default` yields `w = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

/// `geometry_msgs/msg/Pose`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// `geometry_msgs/msg/Twist`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// Row-major 6×6 covariance matrix as carried by the `*WithCovariance`
/// messages.
pub type Covariance6 = [f64; 36];

/// `geometry_msgs/msg/PoseWithCovariance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    /// Row-major, axis order `[x, y, z, roll, pitch, yaw]`.
    #[serde(with = "covariance6")]
    pub covariance: Covariance6,
}

impl Default for PoseWithCovariance {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            covariance: [0.0; 36],
        }
    }
}

/// `geometry_msgs/msg/TwistWithCovariance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    pub twist: Twist,
    /// Row-major, axis order `[vx, vy, vz, wx, wy, wz]`.
    #[serde(with = "covariance6")]
    pub covariance: Covariance6,
}

impl Default for TwistWithCovariance {
    fn default() -> Self {
        Self {
            twist: Twist::default(),
            covariance: [0.0; 36],
        }
    }
}

// serde only implements arrays up to 32 elements.
mod covariance6 {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Covariance6;

    pub fn serialize<S: Serializer>(values: &Covariance6, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Covariance6, D::Error> {
        let values = Vec::<f64>::deserialize(deserializer)?;
        let len = values.len();
        values
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"36 covariance entries"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// sensor_msgs / nav_msgs
// ────────────────────────────────────────────────────────────────────────────

/// `sensor_msgs/msg/Imu`.
///
/// A covariance array of all zeros means "unknown"; `-1` in the first
/// element of a covariance array means the corresponding field carries no
/// estimate at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imu {
    pub header: Header,
    pub orientation: Quaternion,
    pub orientation_covariance: [f64; 9],
    pub angular_velocity: Vector3,
    pub angular_velocity_covariance: [f64; 9],
    pub linear_acceleration: Vector3,
    pub linear_acceleration_covariance: [f64; 9],
}

/// `nav_msgs/msg/Odometry`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub header: Header,
    /// Frame the twist is expressed in.
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
    pub twist: TwistWithCovariance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_from_micros_splits_seconds() {
        let t = Time::from_micros(1_500_250);
        assert_eq!(t, Time::new(1, 500_250_000));
    }

    #[test]
    fn time_from_negative_nanos_is_zero() {
        assert_eq!(Time::from_nanos(-5), Time::default());
    }

    #[test]
    fn time_saturates_past_i32_seconds() {
        let t = Time::from_nanos(i64::MAX);
        assert_eq!(t.sec, i32::MAX);
        assert_eq!(t.nanosec, 999_999_999);
    }

    #[test]
    fn quaternion_default_is_identity() {
        assert_eq!(Quaternion::default(), Quaternion::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn covariance_serializes_as_flat_array() {
        let mut pose = PoseWithCovariance::default();
        pose.covariance[35] = 0.5;
        let json = serde_json::to_value(pose).unwrap();
        let cov = json["covariance"].as_array().unwrap();
        assert_eq!(cov.len(), 36);
        assert_eq!(cov[35], 0.5);

        let back: PoseWithCovariance = serde_json::from_value(json).unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn covariance_rejects_wrong_length() {
        let json = serde_json::json!({
            "twist": Twist::default(),
            "covariance": [0.0, 1.0, 2.0],
        });
        let err = serde_json::from_value::<TwistWithCovariance>(json).unwrap_err();
        assert!(err.to_string().contains("36 covariance entries"));
    }
}
