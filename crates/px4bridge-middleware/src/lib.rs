//! `px4bridge-middleware` – The pub/sub plumbing.
//!
//! Carries samples between the PX4 side, the bridges and ROS 2 consumers
//! without caring what the samples mean.
//!
//! # Modules
//!
//! - [`qos`] – [`QosProfile`]: reliability / durability / history policies
//!   and the request/offered rules deciding whether a writer and a reader
//!   are matched.
//! - [`bus`] – [`TopicBus`]: named, typed, QoS-aware topics with a
//!   keep-last queue per reader, handing out [`Publisher`] and
//!   [`Subscription`] handles.
//! - [`rosbridge`] – [`RosbridgeGateway`]: WebSocket server that speaks the
//!   rosbridge JSON protocol so external processes can publish PX4 samples
//!   into the bus and subscribe to the bridged ROS 2 topics.

pub mod bus;
pub mod qos;
pub mod rosbridge;

pub use bus::{Publisher, Subscription, TopicBus};
pub use qos::{Durability, History, QosMismatch, QosProfile, Reliability};
pub use rosbridge::RosbridgeGateway;
