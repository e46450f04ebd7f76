//! `px4bridge-runtime` – Hosts the bridges.
//!
//! Wires each [`MessageHandler`][px4bridge_transform::MessageHandler] to the
//! bus and drives it.
//!
//! # Modules
//!
//! - [`node`] – [`BridgeNode`]: the per-bridge context object owning one
//!   subscription, one publisher and the handler between them, with a
//!   serialized callback loop ([`BridgeNode::spin`]) and [`NodeStats`]
//!   counters.
//! - [`bridges`] – [`ImuBridgeSettings`] and [`OdometryBridgeSettings`]:
//!   default topics and QoS for the two PX4 bridges, and factories that
//!   build ready nodes from them.
//! - [`clock`] – [`Clock`]: the host clock read on every delivery
//!   ([`SystemClock`] in production, [`FixedClock`] for replays).
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod bridges;
pub mod clock;
pub mod node;
pub mod telemetry;

pub use bridges::{ImuBridgeSettings, OdometryBridgeSettings};
pub use clock::{Clock, FixedClock, SystemClock};
pub use node::{BridgeNode, NodeStats, NodeTopics};
