use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

use crate::Result;

/// Content type declared on every published message.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Whether the broker must persist a message to survive a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient,
    Persistent,
}

/// Publish-time message properties.
#[derive(Debug, Clone)]
pub struct Properties {
    pub delivery_mode: DeliveryMode,
    pub content_type: &'static str,
}

impl Properties {
    /// The properties every event in this crate is published with:
    /// durable storage, JSON body.
    pub fn persistent_json() -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            content_type: CONTENT_TYPE_JSON,
        }
    }
}

/// One delivery attempt of a stored message.
///
/// The `delivery_tag` is the broker-assigned handle used to settle this
/// specific attempt via [`Channel::ack`] or [`Channel::nack`]. A message
/// requeued and delivered again arrives with a fresh tag and
/// `redelivered = true`.
#[derive(Debug)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub body: Vec<u8>,
}

/// An active consumer on a queue: a push-based stream of deliveries plus
/// the tag used to cancel it.
#[derive(Debug)]
pub struct Consumer {
    pub consumer_tag: String,
    pub deliveries: Receiver<Delivery>,
}

/// The broker port.
///
/// Models the slice of an AMQP-style channel this crate relies on: durable
/// queues, at-least-once delivery, explicit ack/nack with optional requeue,
/// and consumer cancellation. The in-process [`MemoryBroker`] implements it
/// for tests and local runs; a production adapter over a real broker client
/// implements the same trait.
///
/// A channel is owned by the component that created it. Implementations
/// must serialize their own internal state; callers must not assume more
/// than that.
///
/// [`MemoryBroker`]: crate::MemoryBroker
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Send one message to the named queue. On success the broker has
    /// stored the message according to `props.delivery_mode`. No consumer
    /// ack is awaited.
    async fn publish(&self, queue: &str, body: Vec<u8>, props: Properties) -> Result<()>;

    /// Start consuming from the named queue. Deliveries are pushed into the
    /// returned receiver until the consumer is cancelled or the broker
    /// closes.
    async fn consume(&self, queue: &str) -> Result<Consumer>;

    /// Accept a delivery. Terminal: the broker removes the message.
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    /// Decline a delivery. With `requeue` the message returns to the queue
    /// for redelivery (not necessarily at the tail, not necessarily to a
    /// different consumer); without it the message is dropped.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()>;

    /// Stop deliveries to the given consumer. Deliveries already pushed but
    /// not yet settled are returned to the queue; tags already settled stay
    /// settled.
    async fn cancel(&self, consumer_tag: &str) -> Result<()>;
}
