//! [`BridgeNode`] – one subscription, one handler, one publisher.
//!
//! A node is the explicit context object of a bridge: it owns the bus
//! handles for its input and output topic, the [`MessageHandler`] that maps
//! one to the other, and the clock read on every delivery.  Building a node
//! registers both handles on the bus; dropping it (normally at the end of
//! [`BridgeNode::spin`]) unregisters them.
//!
//! Callbacks are strictly serialized: `spin` awaits the next sample, runs
//! the handler synchronously and publishes exactly one output before
//! awaiting again, so output order always equals input order.

use std::fmt;
use std::sync::Arc;

use px4bridge_middleware::{Publisher, QosProfile, Subscription, TopicBus};
use px4bridge_transform::MessageHandler;
use px4bridge_types::{BridgeError, TopicMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};

/// Per-node counters, reported when the node stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Samples taken from the input topic.
    pub received: u64,
    /// Outputs handed to the output topic.
    pub published: u64,
    /// Input samples lost to keep-last overflow before the node saw them.
    pub dropped: u64,
}

impl fmt::Display for NodeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} published={} dropped={}",
            self.received, self.published, self.dropped
        )
    }
}

/// Where a node reads from and writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTopics {
    pub input: String,
    pub input_qos: QosProfile,
    pub output: String,
    pub output_qos: QosProfile,
}

pub struct BridgeNode<H: MessageHandler> {
    handler: H,
    subscription: Subscription<H::Source>,
    publisher: Publisher<H::Output>,
    clock: Arc<dyn Clock>,
    stats: NodeStats,
}

impl<H: MessageHandler> BridgeNode<H> {
    /// Register `handler` between `topics.input` and `topics.output` on
    /// `bus`, stamping deliveries with the [`SystemClock`].
    ///
    /// # Errors
    ///
    /// Anything [`TopicBus::create_subscription`] or
    /// [`TopicBus::create_publisher`] reports.  A QoS incompatibility with
    /// an existing writer is *not* an error: the node builds and stays idle.
    pub fn new(bus: &TopicBus, handler: H, topics: &NodeTopics) -> Result<Self, BridgeError> {
        let subscription = bus.create_subscription::<H::Source>(&topics.input, topics.input_qos)?;
        let publisher = bus.create_publisher::<H::Output>(&topics.output, topics.output_qos)?;
        Ok(Self {
            handler,
            subscription,
            publisher,
            clock: Arc::new(SystemClock),
            stats: NodeStats::default(),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            dropped: self.subscription.dropped(),
            ..self.stats
        }
    }

    /// The delivery callback: transform `sample` and publish the result.
    ///
    /// Returns the number of readers the output reached.
    pub fn on_message(&mut self, sample: &H::Source) -> Result<usize, BridgeError> {
        self.stats.received += 1;
        let output = self.handler.handle(sample, self.clock.now());
        let delivered = self.publisher.publish(output)?;
        self.stats.published += 1;
        Ok(delivered)
    }

    /// Run the callback loop until `shutdown` flips to `true` or the bus
    /// closes, then unregister and return the final counters.
    pub async fn spin(mut self, mut shutdown: watch::Receiver<bool>) -> NodeStats {
        info!(
            node = self.handler.name(),
            input = self.subscription.topic(),
            input_type = <H::Source as TopicMessage>::TYPE_NAME,
            output = self.publisher.topic(),
            output_type = <H::Output as TopicMessage>::TYPE_NAME,
            "{} -> {} bridge started",
            self.subscription.topic(),
            self.publisher.topic(),
        );
        if self.subscription.matched_writers() == 0 {
            debug!(node = self.handler.name(), "no compatible writer yet");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                sample = self.subscription.recv() => match sample {
                    Some(sample) => match self.on_message(&sample) {
                        Ok(_) => {}
                        Err(BridgeError::Shutdown) => break,
                        Err(e) => warn!(node = self.handler.name(), error = %e, "publish failed"),
                    },
                    None => {
                        debug!(node = self.handler.name(), "input topic closed");
                        break;
                    }
                },
            }
        }

        let stats = self.stats();
        info!(
            node = self.handler.name(),
            received = stats.received,
            published = stats.published,
            dropped = stats.dropped,
            "bridge stopped"
        );
        stats
    }
}

impl<H: MessageHandler + fmt::Debug> fmt::Debug for BridgeNode<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeNode")
            .field("handler", &self.handler)
            .field("input", &self.subscription.topic())
            .field("output", &self.publisher.topic())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
