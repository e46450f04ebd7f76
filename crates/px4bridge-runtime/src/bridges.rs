//! The two PX4 bridges: their default topics and QoS, and factories that
//! turn settings into a ready [`BridgeNode`].
//!
//! | Node | Input | Output | Input QoS | Output QoS |
//! |---|---|---|---|---|
//! | `px4_imu_bridge` | `/fmu/out/sensor_combined` | `/imu/data` | best-effort, transient-local, 10 | same as input |
//! | `px4_to_odom_bridge` | `/px4_1/fmu/out/vehicle_odometry` | `/odom` | best-effort, transient-local, 10 | reliable, volatile, 10 |

use px4bridge_middleware::{QosProfile, TopicBus};
use px4bridge_transform::{ImuBridgeConfig, ImuTransform, OdometryBridgeConfig, OdometryTransform};
use px4bridge_types::BridgeError;
use serde::{Deserialize, Serialize};

use crate::node::{BridgeNode, NodeTopics};

pub const IMU_INPUT_TOPIC: &str = "/fmu/out/sensor_combined";
pub const IMU_OUTPUT_TOPIC: &str = "/imu/data";
pub const ODOM_INPUT_TOPIC: &str = "/px4_1/fmu/out/vehicle_odometry";
pub const ODOM_OUTPUT_TOPIC: &str = "/odom";

// ─────────────────────────────────────────────────────────────────────────────
// IMU
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuBridgeSettings {
    pub enabled: bool,
    pub input_topic: String,
    pub output_topic: String,
    pub input_qos: QosProfile,
    pub output_qos: QosProfile,
    #[serde(flatten)]
    pub transform: ImuBridgeConfig,
}

impl Default for ImuBridgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            input_topic: IMU_INPUT_TOPIC.to_string(),
            output_topic: IMU_OUTPUT_TOPIC.to_string(),
            input_qos: QosProfile::px4_sensor_data(),
            output_qos: QosProfile::px4_sensor_data(),
            transform: ImuBridgeConfig::default(),
        }
    }
}

impl ImuBridgeSettings {
    pub fn topics(&self) -> NodeTopics {
        NodeTopics {
            input: self.input_topic.clone(),
            input_qos: self.input_qos,
            output: self.output_topic.clone(),
            output_qos: self.output_qos,
        }
    }

    pub fn build(&self, bus: &TopicBus) -> Result<BridgeNode<ImuTransform>, BridgeError> {
        BridgeNode::new(bus, ImuTransform::new(self.transform.clone()), &self.topics())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Odometry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryBridgeSettings {
    pub enabled: bool,
    pub input_topic: String,
    pub output_topic: String,
    pub input_qos: QosProfile,
    /// The host default profile, unlike the IMU bridge which republishes
    /// with its input profile.
    pub output_qos: QosProfile,
    #[serde(flatten)]
    pub transform: OdometryBridgeConfig,
}

impl Default for OdometryBridgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            input_topic: ODOM_INPUT_TOPIC.to_string(),
            output_topic: ODOM_OUTPUT_TOPIC.to_string(),
            input_qos: QosProfile::px4_sensor_data(),
            output_qos: QosProfile::default_with_depth(10),
            transform: OdometryBridgeConfig::default(),
        }
    }
}

impl OdometryBridgeSettings {
    pub fn topics(&self) -> NodeTopics {
        NodeTopics {
            input: self.input_topic.clone(),
            input_qos: self.input_qos,
            output: self.output_topic.clone(),
            output_qos: self.output_qos,
        }
    }

    pub fn build(&self, bus: &TopicBus) -> Result<BridgeNode<OdometryTransform>, BridgeError> {
        BridgeNode::new(bus, OdometryTransform::new(self.transform.clone()), &self.topics())
    }
}
