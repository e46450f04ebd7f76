//! `SensorCombined` → `sensor_msgs/Imu`.
//!
//! Gyro and accelerometer vectors are copied component-wise; both schemas
//! use rad/s and m/s², so no scaling is applied.  `SensorCombined` has no
//! attitude, so the orientation keeps its schema default and the first
//! element of `orientation_covariance` is set to
//! [`ORIENTATION_UNAVAILABLE`], which ROS consumers read as "no orientation
//! estimate".  The angular-velocity and acceleration covariances stay zero
//! ("unknown").

use px4bridge_types::{Header, Imu, SensorCombined, Time, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::covariance::ORIENTATION_UNAVAILABLE;
use crate::handler::MessageHandler;
use crate::timestamp::TimestampPolicy;

/// Mount frame of the IMU on the reference x500 depth airframe.
pub const DEFAULT_IMU_FRAME_ID: &str = "x500_depth_0/camera_link/StereoOV7251";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuBridgeConfig {
    /// `header.frame_id` of every outgoing message.
    pub frame_id: String,
    pub timestamp_policy: TimestampPolicy,
}

impl Default for ImuBridgeConfig {
    fn default() -> Self {
        Self {
            frame_id: DEFAULT_IMU_FRAME_ID.to_string(),
            timestamp_policy: TimestampPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImuTransform {
    config: ImuBridgeConfig,
}

impl ImuTransform {
    pub fn new(config: ImuBridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImuBridgeConfig {
        &self.config
    }

    pub fn transform(&self, source: &SensorCombined, received_at: Time) -> Imu {
        let mut orientation_covariance = [0.0; 9];
        orientation_covariance[0] = ORIENTATION_UNAVAILABLE;
        if !source.accelerometer_valid() {
            debug!(timestamp = source.timestamp, "accelerometer sample flagged invalid");
        }

        Imu {
            header: Header {
                stamp: self.config.timestamp_policy.stamp(source.timestamp, received_at),
                frame_id: self.config.frame_id.clone(),
            },
            orientation_covariance,
            angular_velocity: Vector3::from(source.gyro_rad),
            linear_acceleration: Vector3::from(source.accelerometer_m_s2),
            ..Default::default()
        }
    }
}

impl MessageHandler for ImuTransform {
    type Source = SensorCombined;
    type Output = Imu;

    fn name(&self) -> &str {
        "px4_imu_bridge"
    }

    fn handle(&self, source: &SensorCombined, received_at: Time) -> Imu {
        self.transform(source, received_at)
    }
}
