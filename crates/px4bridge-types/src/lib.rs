//! `px4bridge-types` – the wire schemas on both sides of the bridge.
//!
//! # Modules
//!
//! - [`px4`] – source schemas published by the autopilot
//!   ([`SensorCombined`][px4::SensorCombined],
//!   [`VehicleOdometry`][px4::VehicleOdometry]).
//! - [`ros`] – destination schemas consumed by ROS 2 navigation and
//!   perception ([`Imu`][ros::Imu], [`Odometry`][ros::Odometry] and the
//!   `geometry_msgs` types they are built from).
//!
//! [`TopicMessage`] ties each schema to its ROS type name and to the
//! [`Message`] envelope that the bus and the rosbridge gateway carry.

pub mod px4;
pub mod ros;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use px4::{SensorCombined, VehicleOdometry};
pub use ros::{
    Covariance6, Header, Imu, Odometry, Point, Pose, PoseWithCovariance, Quaternion, Time, Twist,
    TwistWithCovariance, Vector3,
};

/// A schema that can travel over a topic.
pub trait TopicMessage: Clone + Send + Sync + 'static {
    /// Fully qualified ROS type name, e.g. `"sensor_msgs/msg/Imu"`.
    const TYPE_NAME: &'static str;

    fn into_message(self) -> Message;

    /// Unwrap the envelope, or `None` if it holds a different schema.
    fn from_message(message: Message) -> Option<Self>;
}

/// Envelope over every schema the bridge knows.
///
/// Serializes to the inner message's JSON form, which is what a rosbridge
/// client sees in the `msg` field of a `publish` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    SensorCombined(SensorCombined),
    VehicleOdometry(VehicleOdometry),
    Imu(Imu),
    Odometry(Odometry),
}

impl Message {
    /// ROS type name of the wrapped schema.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::SensorCombined(_) => SensorCombined::TYPE_NAME,
            Message::VehicleOdometry(_) => VehicleOdometry::TYPE_NAME,
            Message::Imu(_) => Imu::TYPE_NAME,
            Message::Odometry(_) => Odometry::TYPE_NAME,
        }
    }

    /// Decode a JSON payload as the schema named by `type_name`.
    ///
    /// Accepts both the `pkg/msg/Type` and the short `pkg/Type` spellings
    /// used by rosbridge clients.
    pub fn from_json(type_name: &str, value: serde_json::Value) -> Result<Self, BridgeError> {
        let decode_err = |e: serde_json::Error| {
            BridgeError::Serialization(format!("invalid {type_name} payload: {e}"))
        };
        match canonical_type_name(type_name).as_str() {
            t if t == SensorCombined::TYPE_NAME => serde_json::from_value(value)
                .map(Message::SensorCombined)
                .map_err(decode_err),
            t if t == VehicleOdometry::TYPE_NAME => serde_json::from_value(value)
                .map(Message::VehicleOdometry)
                .map_err(decode_err),
            t if t == Imu::TYPE_NAME => serde_json::from_value(value).map(Message::Imu).map_err(decode_err),
            t if t == Odometry::TYPE_NAME => serde_json::from_value(value)
                .map(Message::Odometry)
                .map_err(decode_err),
            _ => Err(BridgeError::UnknownMessageType(type_name.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, BridgeError> {
        serde_json::to_value(self).map_err(|e| BridgeError::Serialization(e.to_string()))
    }
}

/// Normalise `pkg/Type` to `pkg/msg/Type`.
pub fn canonical_type_name(type_name: &str) -> String {
    match type_name.split('/').collect::<Vec<_>>().as_slice() {
        [pkg, name] => format!("{pkg}/msg/{name}"),
        _ => type_name.to_string(),
    }
}

macro_rules! topic_message {
    ($ty:ident, $name:literal) => {
        impl TopicMessage for $ty {
            const TYPE_NAME: &'static str = $name;

            fn into_message(self) -> Message {
                Message::$ty(self)
            }

            fn from_message(message: Message) -> Option<Self> {
                match message {
                    Message::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

topic_message!(SensorCombined, "px4_msgs/msg/SensorCombined");
topic_message!(VehicleOdometry, "px4_msgs/msg/VehicleOdometry");
topic_message!(Imu, "sensor_msgs/msg/Imu");
topic_message!(Odometry, "nav_msgs/msg/Odometry");

/// Error type shared by every bridge crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Invalid QoS profile: {0}")]
    InvalidQos(String),

    #[error("Topic {topic} carries {expected}, not {found}")]
    TopicTypeMismatch {
        topic: String,
        expected: String,
        found: String,
    },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Bus has been shut down")]
    Shutdown,
}
