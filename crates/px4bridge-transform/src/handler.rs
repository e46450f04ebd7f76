//! The message-handler capability.
//!
//! A host registers a [`MessageHandler`] against one input topic and one
//! output topic and calls [`MessageHandler::handle`] once per delivered
//! sample, on the delivery callback.  Handlers own no threads and keep no
//! state between calls.

use px4bridge_types::{Time, TopicMessage};

/// A pure function from one source sample to one output message.
pub trait MessageHandler: Send + Sync + 'static {
    type Source: TopicMessage;
    type Output: TopicMessage;

    /// Short name used as the node name in logs.
    fn name(&self) -> &str;

    /// Transform `source`.  `received_at` is the host clock read when the
    /// sample was delivered.
    fn handle(&self, source: &Self::Source, received_at: Time) -> Self::Output;
}
