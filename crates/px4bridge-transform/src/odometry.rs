//! `VehicleOdometry` → `nav_msgs/Odometry`.
//!
//! Position, attitude and both velocities are copied 1:1 (f32 widened to
//! f64); no frame rotation is applied.  Covariances are diagonal:
//!
//! ```text
//! pose.covariance  = diag(pos_var.x, pos_var.y, pos_var.z, att_var.x, att_var.y, att_var.z)
//! twist.covariance = diag(vel_var.x, vel_var.y, vel_var.z, FLOOR, FLOOR, FLOOR)
//! ```
//!
//! where `FLOOR` is [`ANGULAR_VELOCITY_VARIANCE_FLOOR`].

use px4bridge_types::{
    Header, Odometry, Point, Pose, PoseWithCovariance, Quaternion, Time, Twist, TwistWithCovariance,
    Vector3, VehicleOdometry,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::covariance::{ANGULAR_VELOCITY_VARIANCE_FLOOR, diagonal6, stack};
use crate::handler::MessageHandler;
use crate::timestamp::TimestampPolicy;

pub const DEFAULT_ODOM_FRAME_ID: &str = "odom";
pub const DEFAULT_CHILD_FRAME_ID: &str = "base_link";

/// How the four components of `VehicleOdometry::q` are laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuaternionLayout {
    /// `q = [x, y, z, w]`, copied straight into the ROS field order.
    #[default]
    Xyzw,
    /// `q = [w, x, y, z]`, the Hamilton order PX4 documents for its
    /// attitude quaternions.
    Wxyz,
}

impl QuaternionLayout {
    pub fn to_ros(self, q: [f32; 4]) -> Quaternion {
        let [a, b, c, d] = q.map(f64::from);
        match self {
            QuaternionLayout::Xyzw => Quaternion::new(a, b, c, d),
            QuaternionLayout::Wxyz => Quaternion::new(b, c, d, a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryBridgeConfig {
    /// `header.frame_id`: the frame the pose is expressed in.
    pub frame_id: String,
    /// `child_frame_id`: the frame the twist is expressed in.
    pub child_frame_id: String,
    pub timestamp_policy: TimestampPolicy,
    pub quaternion_layout: QuaternionLayout,
}

impl Default for OdometryBridgeConfig {
    fn default() -> Self {
        Self {
            frame_id: DEFAULT_ODOM_FRAME_ID.to_string(),
            child_frame_id: DEFAULT_CHILD_FRAME_ID.to_string(),
            timestamp_policy: TimestampPolicy::default(),
            quaternion_layout: QuaternionLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OdometryTransform {
    config: OdometryBridgeConfig,
}

impl OdometryTransform {
    pub fn new(config: OdometryBridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OdometryBridgeConfig {
        &self.config
    }

    pub fn transform(&self, source: &VehicleOdometry, received_at: Time) -> Odometry {
        if source.pose_frame != VehicleOdometry::POSE_FRAME_NED {
            debug!(
                pose_frame = source.pose_frame_name().unwrap_or("invalid"),
                velocity_frame = source.velocity_frame_name().unwrap_or("invalid"),
                "odometry pose is not NED; copied without rotation"
            );
        }
        let [vx, vy, vz] = source.velocity_variance.map(f64::from);
        let floor = ANGULAR_VELOCITY_VARIANCE_FLOOR;

        Odometry {
            header: Header {
                stamp: self.config.timestamp_policy.stamp(source.sample_time_us(), received_at),
                frame_id: self.config.frame_id.clone(),
            },
            child_frame_id: self.config.child_frame_id.clone(),
            pose: PoseWithCovariance {
                pose: Pose {
                    position: Point::from(source.position),
                    orientation: self.config.quaternion_layout.to_ros(source.q),
                },
                covariance: diagonal6(stack(source.position_variance, source.orientation_variance)),
            },
            twist: TwistWithCovariance {
                twist: Twist {
                    linear: Vector3::from(source.velocity),
                    angular: Vector3::from(source.angular_velocity),
                },
                covariance: diagonal6([vx, vy, vz, floor, floor, floor]),
            },
        }
    }
}

impl MessageHandler for OdometryTransform {
    type Source = VehicleOdometry;
    type Output = Odometry;

    fn name(&self) -> &str {
        "px4_to_odom_bridge"
    }

    fn handle(&self, source: &VehicleOdometry, received_at: Time) -> Odometry {
        self.transform(source, received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::{diagonal_of, is_diagonal};

    fn scenario() -> VehicleOdometry {
        VehicleOdometry {
            timestamp: 5_000_000,
            timestamp_sample: 4_990_000,
            position: [1.0, 2.0, 3.0],
            q: [0.0, 0.0, 0.0, 1.0],
            velocity: [0.5, -0.25, 0.0],
            angular_velocity: [0.01, 0.02, -0.03],
            position_variance: [0.01, 0.01, 0.02],
            orientation_variance: [0.001, 0.001, 0.001],
            velocity_variance: [0.1, 0.1, 0.1],
            ..Default::default()
        }
    }

    fn assert_diag_close(actual: [f64; 6], expected: [f64; 6]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "diagonal {actual:?} != {expected:?}");
        }
    }

    #[test]
    fn scenario_covariance_diagonals() {
        let odom = OdometryTransform::default().transform(&scenario(), Time::default());

        assert_diag_close(
            diagonal_of(&odom.pose.covariance),
            [0.01, 0.01, 0.02, 0.001, 0.001, 0.001],
        );
        assert_diag_close(
            diagonal_of(&odom.twist.covariance),
            [0.1, 0.1, 0.1, 1e-6, 1e-6, 1e-6],
        );
    }

    #[test]
    fn off_diagonal_terms_are_exactly_zero() {
        let mut src = scenario();
        for variance in [[0.0, 0.0, 0.0], [5.0, 6.0, 7.0], [1e-9, 1e9, 0.5]] {
            src.position_variance = variance;
            src.orientation_variance = variance;
            src.velocity_variance = variance;
            let odom = OdometryTransform::default().transform(&src, Time::default());

            assert!(is_diagonal(&odom.pose.covariance));
            assert!(is_diagonal(&odom.twist.covariance));
            let off_diagonal = odom
                .pose
                .covariance
                .iter()
                .chain(odom.twist.covariance.iter())
                .enumerate()
                .filter(|(i, _)| (i % 36) / 6 != (i % 36) % 6)
                .count();
            assert_eq!(off_diagonal, 60);
        }
    }

    #[test]
    fn angular_twist_variance_is_always_the_floor() {
        let mut src = scenario();
        for velocity_variance in [[0.0; 3], [100.0, 200.0, 300.0]] {
            src.velocity_variance = velocity_variance;
            src.angular_velocity = [9.0, -9.0, 9.0];
            let odom = OdometryTransform::default().transform(&src, Time::default());
            let diag = diagonal_of(&odom.twist.covariance);
            assert_eq!(diag[3..], [ANGULAR_VELOCITY_VARIANCE_FLOOR; 3]);
        }
    }

    #[test]
    fn pose_and_twist_are_copied_one_to_one() {
        let src = scenario();
        let odom = OdometryTransform::default().transform(&src, Time::default());

        assert_eq!(odom.pose.pose.position, Point::from(src.position));
        assert_eq!(odom.pose.pose.orientation, Quaternion::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(odom.twist.twist.linear, Vector3::from(src.velocity));
        assert_eq!(odom.twist.twist.angular, Vector3::from(src.angular_velocity));
        assert_eq!(odom.pose.pose.position.x, 1.0);
        assert_eq!(odom.pose.pose.position.z, 3.0);
    }

    #[test]
    fn quaternion_components_keep_their_bits() {
        let mut src = scenario();
        src.q = [0.1, -0.2, 0.3, 0.927_361_8];
        let odom = OdometryTransform::default().transform(&src, Time::default());
        let q = odom.pose.pose.orientation;
        assert_eq!([q.x, q.y, q.z, q.w], src.q.map(f64::from));
    }

    #[test]
    fn wxyz_layout_reorders_quaternion() {
        let mut src = scenario();
        src.q = [1.0, 0.0, 0.0, 0.0];
        let transform = OdometryTransform::new(OdometryBridgeConfig {
            quaternion_layout: QuaternionLayout::Wxyz,
            ..Default::default()
        });
        let odom = transform.transform(&src, Time::default());
        assert_eq!(odom.pose.pose.orientation, Quaternion::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn frames_come_from_config() {
        let odom = OdometryTransform::default().transform(&scenario(), Time::default());
        assert_eq!(odom.header.frame_id, "odom");
        assert_eq!(odom.child_frame_id, "base_link");

        let transform = OdometryTransform::new(OdometryBridgeConfig {
            frame_id: "uav2/odom".into(),
            child_frame_id: "uav2/base_link".into(),
            ..Default::default()
        });
        let odom = transform.transform(&scenario(), Time::default());
        assert_eq!(odom.header.frame_id, "uav2/odom");
        assert_eq!(odom.child_frame_id, "uav2/base_link");
    }

    #[test]
    fn source_stamp_uses_sample_time() {
        let odom = OdometryTransform::default().transform(&scenario(), Time::new(99, 0));
        assert_eq!(odom.header.stamp, Time::new(4, 990_000_000));

        let local = OdometryTransform::new(OdometryBridgeConfig {
            timestamp_policy: TimestampPolicy::LocalClock,
            ..Default::default()
        })
        .transform(&scenario(), Time::new(99, 0));
        assert_eq!(local.header.stamp, Time::new(99, 0));
    }

    #[test]
    fn config_parses_from_toml() {
        let cfg: OdometryBridgeConfig = toml::from_str(
            "frame_id = \"map\"\nquaternion_layout = \"wxyz\"\ntimestamp_policy = \"local_clock\"",
        )
        .unwrap();
        assert_eq!(cfg.frame_id, "map");
        assert_eq!(cfg.child_frame_id, DEFAULT_CHILD_FRAME_ID);
        assert_eq!(cfg.quaternion_layout, QuaternionLayout::Wxyz);
        assert_eq!(cfg.timestamp_policy, TimestampPolicy::LocalClock);
    }
}
