//! `px4bridge-transform` – The bridging core.
//!
//! Pure, stateless functions from PX4 schemas to ROS 2 schemas.  Nothing in
//! this crate performs I/O: the host reads its clock and hands the reading
//! in, and publishing is left to the caller.
//!
//! # Modules
//!
//! - [`imu`] – [`ImuTransform`][imu::ImuTransform]:
//!   `SensorCombined` → `sensor_msgs/Imu`, with the orientation marked as
//!   not estimated.
//! - [`odometry`] – [`OdometryTransform`][odometry::OdometryTransform]:
//!   `VehicleOdometry` → `nav_msgs/Odometry`, with diagonal pose and twist
//!   covariances.
//! - [`covariance`] – row-major 6×6 diagonal covariance helpers and the
//!   sentinel / floor constants.
//! - [`timestamp`] – [`TimestampPolicy`][timestamp::TimestampPolicy]:
//!   which clock stamps the outgoing header.
//! - [`handler`] – [`MessageHandler`][handler::MessageHandler]: the
//!   capability a host registers to turn one source sample into one output.

pub mod covariance;
pub mod handler;
pub mod imu;
pub mod odometry;
pub mod timestamp;

pub use handler::MessageHandler;
pub use imu::{ImuBridgeConfig, ImuTransform};
pub use odometry::{OdometryBridgeConfig, OdometryTransform, QuaternionLayout};
pub use timestamp::TimestampPolicy;
