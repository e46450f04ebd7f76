//! Source schemas published by the PX4 autopilot over uXRCE-DDS.
//!
//! Field names and types follow `px4_msgs` so the rosbridge JSON form of a
//! sample deserializes directly into these structs.

use serde::{Deserialize, Serialize};

/// `px4_msgs/msg/SensorCombined` – raw gyro and accelerometer sample.
///
/// Carries no orientation estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorCombined {
    /// Microseconds since FMU boot.
    pub timestamp: u64,
    /// Average angular rate measured in the FRD body frame (rad/s).
    pub gyro_rad: [f32; 3],
    /// Gyro measurement sampling period (µs).
    pub gyro_integral_dt: u32,
    /// Accelerometer timestamp relative to `timestamp` (µs).
    pub accelerometer_timestamp_relative: i32,
    /// Average specific force in the FRD body frame (m/s²).
    pub accelerometer_m_s2: [f32; 3],
    /// Accelerometer measurement sampling period (µs).
    pub accelerometer_integral_dt: u32,
    pub accelerometer_clipping: u8,
    pub gyro_clipping: u8,
    pub accel_calibration_count: u8,
    pub gyro_calibration_count: u8,
}

impl SensorCombined {
    /// Value of `accelerometer_timestamp_relative` when the accelerometer
    /// sample is invalid.
    pub const RELATIVE_TIMESTAMP_INVALID: i32 = 2_147_483_647;

    /// `false` when PX4 marked the accelerometer half of this sample invalid.
    pub fn accelerometer_valid(&self) -> bool {
        self.accelerometer_timestamp_relative != Self::RELATIVE_TIMESTAMP_INVALID
    }
}

/// `px4_msgs/msg/VehicleOdometry` – fused pose and twist estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleOdometry {
    /// Microseconds since FMU boot, time of publication.
    pub timestamp: u64,
    /// Microseconds since FMU boot, time the estimate was sampled.
    pub timestamp_sample: u64,
    pub pose_frame: u8,
    pub position: [f32; 3],
    pub q: [f32; 4],
    pub velocity_frame: u8,
    pub velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub position_variance: [f32; 3],
    pub orientation_variance: [f32; 3],
    pub velocity_variance: [f32; 3],
    pub reset_counter: u8,
    pub quality: i8,
}

impl VehicleOdometry {
    pub const POSE_FRAME_UNKNOWN: u8 = 0;
    pub const POSE_FRAME_NED: u8 = 1;
    pub const POSE_FRAME_FRD: u8 = 2;

    pub const VELOCITY_FRAME_UNKNOWN: u8 = 0;
    pub const VELOCITY_FRAME_NED: u8 = 1;
    pub const VELOCITY_FRAME_FRD: u8 = 2;
    pub const VELOCITY_FRAME_BODY_FRD: u8 = 3;

    /// Short name of `pose_frame`; `None` for values outside the enum.
    pub fn pose_frame_name(&self) -> Option<&'static str> {
        match self.pose_frame {
            Self::POSE_FRAME_UNKNOWN => Some("unknown"),
            Self::POSE_FRAME_NED => Some("ned"),
            Self::POSE_FRAME_FRD => Some("frd"),
            _ => None,
        }
    }

    /// Short name of `velocity_frame`; `None` for values outside the enum.
    pub fn velocity_frame_name(&self) -> Option<&'static str> {
        match self.velocity_frame {
            Self::VELOCITY_FRAME_UNKNOWN => Some("unknown"),
            Self::VELOCITY_FRAME_NED => Some("ned"),
            Self::VELOCITY_FRAME_FRD => Some("frd"),
            Self::VELOCITY_FRAME_BODY_FRD => Some("body_frd"),
            _ => None,
        }
    }

    /// The best available sample time: `timestamp_sample` when set,
    /// otherwise the publication `timestamp`.
    pub fn sample_time_us(&self) -> u64 {
        if self.timestamp_sample != 0 {
            self.timestamp_sample
        } else {
            self.timestamp
        }
    }
}
