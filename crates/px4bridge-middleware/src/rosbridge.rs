//! rosbridge-v2 compatible WebSocket gateway onto the [`TopicBus`].
//!
//! [`RosbridgeGateway`] lets processes outside the bus take part in it using
//! the JSON protocol spoken by `rosbridge_server`:
//!
//! * **Ingest** – `advertise` declares a topic's type, `publish` decodes the
//!   `msg` field as that type and publishes it on the bus with the
//!   gateway's ingest QoS (by default what PX4 offers, see
//!   [`QosProfile::px4_sensor_data`]).
//! * **Egress** – `subscribe` opens a bus subscription and forwards every
//!   sample back as `{"op":"publish","topic":…,"msg":…}`; `unsubscribe`
//!   closes it.
//!
//! Malformed frames are answered with a `status` frame and otherwise
//! ignored; they never tear down the connection.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use px4bridge_types::{
    BridgeError, Imu, Message, Odometry, SensorCombined, TopicMessage, VehicleOdometry,
    canonical_type_name,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{Publisher, Subscription, TopicBus};
use crate::qos::QosProfile;

/// Outbound frames buffered per client before forwarders start waiting.
const CLIENT_QUEUE_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// The subset of rosbridge operations the gateway understands.  Unknown
/// fields (`id`, `compression`, …) are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientOp {
    Advertise {
        topic: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    Unadvertise {
        topic: String,
    },
    Publish {
        topic: String,
        msg: serde_json::Value,
        #[serde(rename = "type", default)]
        type_name: Option<String>,
    },
    Subscribe {
        topic: String,
        #[serde(rename = "type", default)]
        type_name: Option<String>,
    },
    Unsubscribe {
        topic: String,
    },
}

fn publish_frame(topic: &str, message: &Message) -> Result<String, BridgeError> {
    let frame = json!({ "op": "publish", "topic": topic, "msg": message.to_json()? });
    Ok(frame.to_string())
}

fn status_frame(level: &str, text: &str) -> String {
    json!({ "op": "status", "level": level, "msg": text }).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Type-erased bus handles
// ─────────────────────────────────────────────────────────────────────────────

enum IngestPublisher {
    SensorCombined(Publisher<SensorCombined>),
    VehicleOdometry(Publisher<VehicleOdometry>),
    Imu(Publisher<Imu>),
    Odometry(Publisher<Odometry>),
}

impl IngestPublisher {
    fn create(bus: &TopicBus, topic: &str, type_name: &str, qos: QosProfile) -> Result<Self, BridgeError> {
        let type_name = canonical_type_name(type_name);
        let publisher = match type_name.as_str() {
            t if t == SensorCombined::TYPE_NAME => Self::SensorCombined(bus.create_publisher(topic, qos)?),
            t if t == VehicleOdometry::TYPE_NAME => Self::VehicleOdometry(bus.create_publisher(topic, qos)?),
            t if t == Imu::TYPE_NAME => Self::Imu(bus.create_publisher(topic, qos)?),
            t if t == Odometry::TYPE_NAME => Self::Odometry(bus.create_publisher(topic, qos)?),
            _ => return Err(BridgeError::UnknownMessageType(type_name)),
        };
        Ok(publisher)
    }

    fn publish(&self, message: Message) -> Result<usize, BridgeError> {
        let expected = self.type_name();
        let found = message.type_name();
        let mismatch = || BridgeError::TopicTypeMismatch {
            topic: self.topic().to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        };
        match (self, message) {
            (Self::SensorCombined(p), Message::SensorCombined(m)) => p.publish(m),
            (Self::VehicleOdometry(p), Message::VehicleOdometry(m)) => p.publish(m),
            (Self::Imu(p), Message::Imu(m)) => p.publish(m),
            (Self::Odometry(p), Message::Odometry(m)) => p.publish(m),
            _ => Err(mismatch()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::SensorCombined(_) => SensorCombined::TYPE_NAME,
            Self::VehicleOdometry(_) => VehicleOdometry::TYPE_NAME,
            Self::Imu(_) => Imu::TYPE_NAME,
            Self::Odometry(_) => Odometry::TYPE_NAME,
        }
    }

    fn topic(&self) -> &str {
        match self {
            Self::SensorCombined(p) => p.topic(),
            Self::VehicleOdometry(p) => p.topic(),
            Self::Imu(p) => p.topic(),
            Self::Odometry(p) => p.topic(),
        }
    }
}

fn spawn_forwarder<T: TopicMessage>(mut sub: Subscription<T>, out: mpsc::Sender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(sample) = sub.recv().await {
            let frame = match publish_frame(sub.topic(), &sample.into_message()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(topic = %sub.topic(), error = %e, "dropping unencodable sample");
                    continue;
                }
            };
            if out.send(frame).await.is_err() {
                break;
            }
        }
    })
}

fn subscribe_any(
    bus: &TopicBus,
    topic: &str,
    type_name: &str,
    qos: QosProfile,
    out: mpsc::Sender<String>,
) -> Result<JoinHandle<()>, BridgeError> {
    let type_name = canonical_type_name(type_name);
    let handle = match type_name.as_str() {
        t if t == SensorCombined::TYPE_NAME => {
            spawn_forwarder(bus.create_subscription::<SensorCombined>(topic, qos)?, out)
        }
        t if t == VehicleOdometry::TYPE_NAME => {
            spawn_forwarder(bus.create_subscription::<VehicleOdometry>(topic, qos)?, out)
        }
        t if t == Imu::TYPE_NAME => spawn_forwarder(bus.create_subscription::<Imu>(topic, qos)?, out),
        t if t == Odometry::TYPE_NAME => spawn_forwarder(bus.create_subscription::<Odometry>(topic, qos)?, out),
        _ => return Err(BridgeError::UnknownMessageType(type_name)),
    };
    Ok(handle)
}

// ─────────────────────────────────────────────────────────────────────────────
// Client session
// ─────────────────────────────────────────────────────────────────────────────

/// Per-connection state: what the client advertised, its ingest writers,
/// and the forwarder tasks feeding its subscriptions.
struct ClientSession {
    id: Uuid,
    bus: TopicBus,
    ingest_qos: QosProfile,
    egress_qos: QosProfile,
    advertised: HashMap<String, String>,
    publishers: HashMap<String, IngestPublisher>,
    subscriptions: HashMap<String, JoinHandle<()>>,
    out: mpsc::Sender<String>,
}

impl ClientSession {
    fn new(
        bus: TopicBus,
        ingest_qos: QosProfile,
        egress_qos: QosProfile,
        out: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bus,
            ingest_qos,
            egress_qos,
            advertised: HashMap::new(),
            publishers: HashMap::new(),
            subscriptions: HashMap::new(),
            out,
        }
    }

    /// Apply one text frame.  Returns a status frame to send back when the
    /// request could not be honoured.
    fn handle_text(&mut self, text: &str) -> Option<String> {
        let op = match serde_json::from_str::<ClientOp>(text) {
            Ok(op) => op,
            Err(e) => {
                debug!(client = %self.id, error = %e, "unparseable rosbridge frame");
                return Some(status_frame("error", &format!("invalid frame: {e}")));
            }
        };
        match self.apply(op) {
            Ok(()) => None,
            Err(e) => {
                debug!(client = %self.id, error = %e, "rosbridge request rejected");
                Some(status_frame("error", &e.to_string()))
            }
        }
    }

    fn apply(&mut self, op: ClientOp) -> Result<(), BridgeError> {
        match op {
            ClientOp::Advertise { topic, type_name } => {
                let publisher = IngestPublisher::create(&self.bus, &topic, &type_name, self.ingest_qos)?;
                info!(client = %self.id, %topic, type_name = publisher.type_name(), "client advertised topic");
                self.advertised.insert(topic.clone(), type_name);
                self.publishers.insert(topic, publisher);
                Ok(())
            }
            ClientOp::Unadvertise { topic } => {
                self.advertised.remove(&topic);
                self.publishers.remove(&topic);
                Ok(())
            }
            ClientOp::Publish { topic, msg, type_name } => {
                let type_name = self.resolve_type(&topic, type_name)?;
                let message = Message::from_json(&type_name, msg)?;
                if !self.publishers.contains_key(&topic) {
                    let publisher = IngestPublisher::create(&self.bus, &topic, &type_name, self.ingest_qos)?;
                    self.publishers.insert(topic.clone(), publisher);
                }
                if let Some(publisher) = self.publishers.get(&topic) {
                    publisher.publish(message)?;
                }
                Ok(())
            }
            ClientOp::Subscribe { topic, type_name } => {
                if self.subscriptions.contains_key(&topic) {
                    return Ok(());
                }
                let type_name = self.resolve_type(&topic, type_name)?;
                let handle = subscribe_any(&self.bus, &topic, &type_name, self.egress_qos, self.out.clone())?;
                info!(client = %self.id, %topic, "client subscribed");
                self.subscriptions.insert(topic, handle);
                Ok(())
            }
            ClientOp::Unsubscribe { topic } => {
                if let Some(handle) = self.subscriptions.remove(&topic) {
                    handle.abort();
                }
                Ok(())
            }
        }
    }

    /// Explicit `type` field, then the client's own advertisement, then the
    /// type the topic is already bound to on the bus.
    fn resolve_type(&self, topic: &str, explicit: Option<String>) -> Result<String, BridgeError> {
        explicit
            .or_else(|| self.advertised.get(topic).cloned())
            .or_else(|| self.bus.topic_type(topic).map(str::to_string))
            .ok_or_else(|| BridgeError::UnknownMessageType(format!("no type known for topic {topic}")))
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.drain() {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket server exposing the bus with the rosbridge JSON protocol.
#[derive(Clone, Debug)]
pub struct RosbridgeGateway {
    bus: TopicBus,
    ingest_qos: QosProfile,
    egress_qos: QosProfile,
}

impl RosbridgeGateway {
    /// Create a gateway over `bus`.  Samples published by clients are
    /// offered with `ingest_qos`; client subscriptions request best-effort,
    /// volatile, depth 10, which every bridge output satisfies.
    pub fn new(bus: TopicBus, ingest_qos: QosProfile) -> Self {
        Self {
            bus,
            ingest_qos,
            egress_qos: QosProfile::best_effort_with_depth(10),
        }
    }

    /// Override the QoS requested by client subscriptions.
    #[must_use]
    pub fn with_egress_qos(mut self, qos: QosProfile) -> Self {
        self.egress_qos = qos;
        self
    }

    /// Bind `addr` and serve until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the listener cannot be bound.
    pub async fn serve(self, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("ws bind error on {addr}: {e}")))?;
        self.run(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<(), BridgeError> {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "rosbridge gateway listening");
        }
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let gateway = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = gateway.handle_client(stream, peer, shutdown).await {
                                error!(peer = %peer, error = %e, "ws client error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "ws accept error"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("rosbridge gateway stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_client(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BridgeError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| BridgeError::Transport(format!("ws handshake from {peer}: {e}")))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);
        let mut session = ClientSession::new(self.bus.clone(), self.ingest_qos, self.egress_qos, out_tx);
        info!(peer = %peer, client = %session.id, "ws client connected");

        loop {
            tokio::select! {
                // Forward bus samples to the client.
                Some(frame) = out_rx.recv() => {
                    if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // Handle incoming frames.
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Err(e)) => {
                            debug!(peer = %peer, error = %e, "ws read error");
                            break;
                        }
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(reply) = session.handle_text(text.as_str())
                                && ws_tx.send(WsMessage::Text(reply.into())).await.is_err()
                            {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }

        info!(peer = %peer, client = %session.id, "ws client disconnected");
        Ok(())
    }
}
