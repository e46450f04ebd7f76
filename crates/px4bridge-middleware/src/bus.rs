//! In-process, QoS-aware, topic-based publish/subscribe bus.
//!
//! Each named topic is bound to one message type on first use.  Writers
//! ([`Publisher`]) and readers ([`Subscription`]) declare a [`QosProfile`];
//! delivery happens only between pairs whose profiles are compatible (see
//! [`crate::qos`]).  Incompatible pairs are logged once with `warn!` when
//! they meet and are otherwise silent: the reader simply never receives
//! anything from that writer.
//!
//! Every reader owns a queue holding at most its history depth; a writer
//! pushing onto a full queue evicts the *oldest* sample (keep-last
//! semantics) and never blocks.  Readers park on a [`tokio::sync::Notify`]
//! while their queue is empty.  Transient-local writers retain their last
//! `depth` samples and replay them to late-joining transient-local readers.
//!
//! # Example
//!
//! ```rust,no_run
//! use px4bridge_middleware::{QosProfile, TopicBus};
//! use px4bridge_types::Imu;
//!
//! # async fn demo() -> Result<(), px4bridge_types::BridgeError> {
//! let bus = TopicBus::new();
//! let mut sub = bus.create_subscription::<Imu>("/imu/data", QosProfile::default())?;
//! let publisher = bus.create_publisher::<Imu>("/imu/data", QosProfile::default())?;
//! publisher.publish(Imu::default())?;
//! let imu = sub.recv().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use px4bridge_types::{BridgeError, Message, TopicMessage};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::qos::{Durability, QosProfile};

// ─────────────────────────────────────────────────────────────────────────────
// Bus state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BusState {
    topics: HashMap<String, TopicState>,
    next_id: u64,
    shut_down: bool,
}

#[derive(Debug)]
struct TopicState {
    type_name: &'static str,
    writers: Vec<WriterSlot>,
    readers: Vec<ReaderSlot>,
}

#[derive(Debug)]
struct WriterSlot {
    id: u64,
    qos: QosProfile,
    /// Retained samples for late joiners (transient-local writers only).
    history: VecDeque<Message>,
}

#[derive(Debug)]
struct ReaderSlot {
    id: u64,
    qos: QosProfile,
    queue: Arc<ReaderQueue>,
}

/// Keep-last buffer between the writers of a topic and one reader.
#[derive(Debug)]
struct ReaderQueue {
    depth: usize,
    state: Mutex<QueueState>,
    ready: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    samples: VecDeque<Message>,
    dropped: u64,
    closed: bool,
}

impl ReaderQueue {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `message`, evicting the oldest samples beyond `depth`.
    /// Returns `false` once the queue is closed.
    fn push(&self, message: Message) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.samples.push_back(message);
            while state.samples.len() > self.depth {
                state.samples.pop_front();
                state.dropped += 1;
                debug!(depth = self.depth, dropped = state.dropped, "reader queue full; oldest sample dropped");
            }
        }
        self.ready.notify_one();
        true
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }
}

impl BusState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Look up `topic`, binding it to `type_name` if it does not exist yet.
    fn bind_topic(&mut self, topic: &str, type_name: &'static str) -> Result<&mut TopicState, BridgeError> {
        if self.shut_down {
            return Err(BridgeError::Shutdown);
        }
        let state = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState {
                type_name,
                writers: Vec::new(),
                readers: Vec::new(),
            });
        if state.type_name != type_name {
            return Err(BridgeError::TopicTypeMismatch {
                topic: topic.to_string(),
                expected: state.type_name.to_string(),
                found: type_name.to_string(),
            });
        }
        Ok(state)
    }
}

fn warn_mismatch(topic: &str, offered: &QosProfile, requested: &QosProfile) -> bool {
    let mismatches = QosProfile::check_compatible(offered, requested);
    if mismatches.is_empty() {
        return false;
    }
    let reasons: Vec<String> = mismatches.iter().map(ToString::to_string).collect();
    warn!(
        topic,
        offered = %offered,
        requested = %requested,
        reasons = %reasons.join("; "),
        "incompatible QoS: writer and reader will never exchange samples"
    );
    true
}

// ─────────────────────────────────────────────────────────────────────────────
// TopicBus
// ─────────────────────────────────────────────────────────────────────────────

/// Shared topic bus.  Clone it cheaply – all clones share the same topics.
#[derive(Clone, Debug, Default)]
pub struct TopicBus {
    state: Arc<Mutex<BusState>>,
}

impl TopicBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // Every mutation is a single push/retain, so a poisoned lock still
        // guards consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare a writer on `topic` offering `qos`.
    ///
    /// # Errors
    ///
    /// * [`BridgeError::InvalidQos`] if `qos` fails [`QosProfile::validate`].
    /// * [`BridgeError::TopicTypeMismatch`] if `topic` already carries
    ///   another message type.
    /// * [`BridgeError::Shutdown`] once [`TopicBus::shutdown`] has run.
    pub fn create_publisher<T: TopicMessage>(
        &self,
        topic: &str,
        qos: QosProfile,
    ) -> Result<Publisher<T>, BridgeError> {
        qos.validate()?;
        let mut state = self.lock();
        let id = state.allocate_id();
        let topic_state = state.bind_topic(topic, T::TYPE_NAME)?;
        for reader in &topic_state.readers {
            warn_mismatch(topic, &qos, &reader.qos);
        }
        topic_state.writers.push(WriterSlot {
            id,
            qos,
            history: VecDeque::new(),
        });
        debug!(topic, type_name = T::TYPE_NAME, qos = %qos, "publisher created");
        Ok(Publisher {
            bus: self.clone(),
            topic: topic.to_string(),
            id,
            qos,
            _marker: PhantomData,
        })
    }

    /// Declare a reader on `topic` requesting `qos`.
    ///
    /// Creation succeeds even when no current writer is compatible; such a
    /// subscription is silent until a compatible writer appears.
    ///
    /// # Errors
    ///
    /// Same as [`TopicBus::create_publisher`].
    pub fn create_subscription<T: TopicMessage>(
        &self,
        topic: &str,
        qos: QosProfile,
    ) -> Result<Subscription<T>, BridgeError> {
        qos.validate()?;
        let mut state = self.lock();
        let id = state.allocate_id();
        let topic_state = state.bind_topic(topic, T::TYPE_NAME)?;
        let queue = Arc::new(ReaderQueue::new(qos.depth()));

        for writer in &topic_state.writers {
            if warn_mismatch(topic, &writer.qos, &qos) {
                continue;
            }
            if writer.qos.durability == Durability::TransientLocal
                && qos.durability == Durability::TransientLocal
            {
                for sample in &writer.history {
                    queue.push(sample.clone());
                }
            }
        }
        topic_state.readers.push(ReaderSlot {
            id,
            qos,
            queue: Arc::clone(&queue),
        });
        debug!(topic, type_name = T::TYPE_NAME, qos = %qos, "subscription created");

        Ok(Subscription {
            bus: self.clone(),
            topic: topic.to_string(),
            id,
            qos,
            queue,
            _marker: PhantomData,
        })
    }

    /// Names of every topic currently bound, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// The message type `topic` is bound to, if any.
    pub fn topic_type(&self, topic: &str) -> Option<&'static str> {
        self.lock().topics.get(topic).map(|t| t.type_name)
    }

    /// Close every topic.  Open subscriptions drain and then yield `None`;
    /// further publishes fail with [`BridgeError::Shutdown`].
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        for topic in state.topics.values() {
            for reader in &topic.readers {
                reader.queue.close();
            }
        }
        state.topics.clear();
        debug!("topic bus shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    fn remove_writer(&self, topic: &str, id: u64) {
        let mut state = self.lock();
        if let Some(t) = state.topics.get_mut(topic) {
            t.writers.retain(|w| w.id != id);
        }
    }

    fn remove_reader(&self, topic: &str, id: u64) {
        let mut state = self.lock();
        if let Some(t) = state.topics.get_mut(topic) {
            t.readers.retain(|r| r.id != id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Publisher
// ─────────────────────────────────────────────────────────────────────────────

/// Writer handle for one topic.  Dropping it unregisters the writer.
#[derive(Debug)]
pub struct Publisher<T> {
    bus: TopicBus,
    topic: String,
    id: u64,
    qos: QosProfile,
    _marker: PhantomData<fn(T)>,
}

impl<T: TopicMessage> Publisher<T> {
    /// Publish `message` to every compatible reader.
    ///
    /// Returns the number of readers the sample was handed to.  `Ok(0)` is
    /// normal: nobody is listening, or every listener is QoS-incompatible.
    pub fn publish(&self, message: T) -> Result<usize, BridgeError> {
        let mut state = self.bus.lock();
        if state.shut_down {
            return Err(BridgeError::Shutdown);
        }
        let Some(topic_state) = state.topics.get_mut(&self.topic) else {
            return Err(BridgeError::Shutdown);
        };
        let message = message.into_message();

        if self.qos.durability == Durability::TransientLocal
            && let Some(writer) = topic_state.writers.iter_mut().find(|w| w.id == self.id)
        {
            writer.history.push_back(message.clone());
            while writer.history.len() > self.qos.depth() {
                writer.history.pop_front();
            }
        }

        let mut delivered = 0;
        for reader in &topic_state.readers {
            if self.qos.is_compatible_with(&reader.qos) && reader.queue.push(message.clone()) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Number of current readers this writer is compatible with.
    pub fn matched_readers(&self) -> usize {
        self.bus
            .lock()
            .topics
            .get(&self.topic)
            .map(|t| t.readers.iter().filter(|r| self.qos.is_compatible_with(&r.qos)).count())
            .unwrap_or(0)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn qos(&self) -> &QosProfile {
        &self.qos
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.bus.remove_writer(&self.topic, self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// Reader handle for one topic.  Dropping it unregisters the reader.
#[derive(Debug)]
pub struct Subscription<T> {
    bus: TopicBus,
    topic: String,
    id: u64,
    qos: QosProfile,
    queue: Arc<ReaderQueue>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TopicMessage> Subscription<T> {
    /// Wait for the next sample.
    ///
    /// Samples overwritten because this reader fell more than `depth` behind
    /// are skipped and counted in [`Subscription::dropped`].  Returns `None`
    /// once the bus has shut down.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let next = {
                let mut state = self.queue.lock();
                match state.samples.pop_front() {
                    Some(message) => Some(message),
                    None if state.closed => return None,
                    None => None,
                }
            };
            let Some(message) = next else {
                self.queue.ready.notified().await;
                continue;
            };
            match T::from_message(message) {
                Some(sample) => return Some(sample),
                None => warn!(topic = %self.topic, expected = T::TYPE_NAME, "dropping sample of unexpected type"),
            }
        }
    }

    /// Number of current writers this reader is compatible with.
    pub fn matched_writers(&self) -> usize {
        self.bus
            .lock()
            .topics
            .get(&self.topic)
            .map(|t| t.writers.iter().filter(|w| w.qos.is_compatible_with(&self.qos)).count())
            .unwrap_or(0)
    }

    /// Samples lost to keep-last overflow so far.
    pub fn dropped(&self) -> u64 {
        self.queue.lock().dropped
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn qos(&self) -> &QosProfile {
        &self.qos
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.bus.remove_reader(&self.topic, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::{History, Reliability};
    use px4bridge_types::{Imu, Odometry, SensorCombined, Vector3};
    use std::time::Duration;

    fn imu(x: f64) -> Imu {
        Imu {
            angular_velocity: Vector3::new(x, 0.0, 0.0),
            ..Default::default()
        }
    }

    fn sensor(ts: u64) -> SensorCombined {
        SensorCombined {
            timestamp: ts,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = TopicBus::new();
        let mut sub = bus.create_subscription::<Imu>("/imu/data", QosProfile::default())?;
        let publisher = bus.create_publisher::<Imu>("/imu/data", QosProfile::default())?;

        assert_eq!(publisher.publish(imu(1.0))?, 1);
        let received = sub.recv().await.ok_or("no sample")?;
        assert_eq!(received.angular_velocity.x, 1.0);
        Ok(())
    }

    #[test]
    fn publish_without_readers_is_ok() {
        let bus = TopicBus::new();
        let publisher = bus.create_publisher::<Imu>("/imu/data", QosProfile::default()).unwrap();
        assert_eq!(publisher.publish(imu(0.0)).unwrap(), 0);
    }

    #[test]
    fn topic_is_bound_to_first_type() {
        let bus = TopicBus::new();
        let _p = bus.create_publisher::<Imu>("/imu/data", QosProfile::default()).unwrap();
        let err = bus
            .create_subscription::<Odometry>("/imu/data", QosProfile::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::TopicTypeMismatch { .. }));
        assert_eq!(bus.topic_type("/imu/data"), Some("sensor_msgs/msg/Imu"));
    }

    #[test]
    fn zero_depth_is_rejected() {
        let bus = TopicBus::new();
        let qos = QosProfile {
            history: History::KeepLast(0),
            ..QosProfile::default()
        };
        assert!(matches!(
            bus.create_subscription::<Imu>("/imu/data", qos),
            Err(BridgeError::InvalidQos(_))
        ));
    }

    #[tokio::test]
    async fn reliable_reader_never_hears_best_effort_writer() {
        let bus = TopicBus::new();
        let mut sub = bus
            .create_subscription::<SensorCombined>("/fmu/out/sensor_combined", QosProfile::default())
            .unwrap();
        let publisher = bus
            .create_publisher::<SensorCombined>("/fmu/out/sensor_combined", QosProfile::px4_sensor_data())
            .unwrap();

        assert_eq!(publisher.matched_readers(), 0);
        assert_eq!(sub.matched_writers(), 0);
        assert_eq!(publisher.publish(sensor(1)).unwrap(), 0);

        let result = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(result.is_err(), "mismatched reader must not receive anything");
    }

    #[tokio::test]
    async fn matching_reader_hears_px4_writer() {
        let bus = TopicBus::new();
        let mut sub = bus
            .create_subscription::<SensorCombined>("/fmu/out/sensor_combined", QosProfile::px4_sensor_data())
            .unwrap();
        let publisher = bus
            .create_publisher::<SensorCombined>("/fmu/out/sensor_combined", QosProfile::px4_sensor_data())
            .unwrap();

        assert_eq!(publisher.matched_readers(), 1);
        publisher.publish(sensor(7)).unwrap();
        assert_eq!(sub.recv().await.unwrap().timestamp, 7);
    }

    #[tokio::test]
    async fn transient_local_replays_last_samples_to_late_joiner() {
        let bus = TopicBus::new();
        let qos = QosProfile {
            history: History::KeepLast(3),
            ..QosProfile::px4_sensor_data()
        };
        let publisher = bus.create_publisher::<SensorCombined>("/t", qos).unwrap();
        for ts in 1..=5 {
            publisher.publish(sensor(ts)).unwrap();
        }

        let mut late = bus.create_subscription::<SensorCombined>("/t", qos).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(late.recv().await.unwrap().timestamp);
        }
        assert_eq!(seen, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn volatile_late_joiner_gets_no_history() {
        let bus = TopicBus::new();
        let writer_qos = QosProfile::px4_sensor_data();
        let reader_qos = QosProfile {
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
            history: History::KeepLast(10),
        };
        let publisher = bus.create_publisher::<SensorCombined>("/t", writer_qos).unwrap();
        publisher.publish(sensor(1)).unwrap();

        let mut late = bus.create_subscription::<SensorCombined>("/t", reader_qos).unwrap();
        publisher.publish(sensor(2)).unwrap();
        assert_eq!(late.recv().await.unwrap().timestamp, 2);
    }

    #[tokio::test]
    async fn keep_last_overflow_drops_oldest() {
        let bus = TopicBus::new();
        let qos = QosProfile::default_with_depth(2);
        let mut slow = bus.create_subscription::<SensorCombined>("/t", qos).unwrap();
        let publisher = bus.create_publisher::<SensorCombined>("/t", qos).unwrap();
        for ts in 1..=5 {
            publisher.publish(sensor(ts)).unwrap();
        }

        assert_eq!(slow.recv().await.unwrap().timestamp, 4);
        assert_eq!(slow.recv().await.unwrap().timestamp, 5);
        assert_eq!(slow.dropped(), 3);
    }

    #[tokio::test]
    async fn keep_last_ten_retains_exactly_ten_samples() {
        let bus = TopicBus::new();
        let qos = QosProfile::px4_sensor_data();
        let mut slow = bus.create_subscription::<SensorCombined>("/t", qos).unwrap();
        let publisher = bus.create_publisher::<SensorCombined>("/t", qos).unwrap();
        for ts in 1..=15 {
            publisher.publish(sensor(ts)).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(slow.recv().await.unwrap().timestamp);
        }
        assert_eq!(seen, (6..=15).collect::<Vec<u64>>());
        assert_eq!(slow.dropped(), 5);
        let empty = tokio::time::timeout(Duration::from_millis(20), slow.recv()).await;
        assert!(empty.is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_reader() {
        let bus = TopicBus::new();
        let publisher = bus.create_publisher::<Imu>("/imu/data", QosProfile::default()).unwrap();
        let sub = bus.create_subscription::<Imu>("/imu/data", QosProfile::default()).unwrap();
        assert_eq!(publisher.matched_readers(), 1);
        drop(sub);
        assert_eq!(publisher.matched_readers(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_subscriptions_and_rejects_publish() {
        let bus = TopicBus::new();
        let mut sub = bus.create_subscription::<Imu>("/imu/data", QosProfile::default()).unwrap();
        let publisher = bus.create_publisher::<Imu>("/imu/data", QosProfile::default()).unwrap();

        bus.shutdown();
        assert!(bus.is_shut_down());
        assert!(sub.recv().await.is_none());
        assert_eq!(publisher.publish(imu(0.0)), Err(BridgeError::Shutdown));
        assert!(matches!(
            bus.create_publisher::<Imu>("/other", QosProfile::default()),
            Err(BridgeError::Shutdown)
        ));
    }

    #[test]
    fn topic_names_are_sorted() {
        let bus = TopicBus::new();
        let _a = bus.create_publisher::<Odometry>("/odom", QosProfile::default()).unwrap();
        let _b = bus.create_publisher::<Imu>("/imu/data", QosProfile::default()).unwrap();
        assert_eq!(bus.topic_names(), vec!["/imu/data".to_string(), "/odom".to_string()]);
    }
}
