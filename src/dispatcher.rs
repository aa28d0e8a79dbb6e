use std::sync::Arc;

use tokio::{sync::mpsc::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    Envelope, HandlerRegistry, Result,
    broker::{Channel, Delivery},
};

/// The consumer core: one subscription to the shared queue, routing each
/// delivery by pattern.
///
/// Many logical consumers share one physical queue, each interested in a
/// subset of patterns. The rule that keeps this safe is: never consume a
/// message that isn't yours. Per delivery:
///
/// 1. the body is decoded; a malformed body is rejected outright with a
///    nack without requeue, since it cannot become well-formed on
///    redelivery;
/// 2. a pattern found in the registry is accepted: ack first, then the
///    handler runs with the decoded payload;
/// 3. any other pattern is declined with nack-requeue, returning the
///    message to the broker for some other consumer.
///
/// Acking *before* the handler runs means a permanently failing handler
/// can never wedge the queue with redeliveries; the cost is that a handler
/// error after the ack is logged, not retried, so processing at the
/// handler stage is at-most-once. An implementation wanting
/// ack-after-success needs a bounded retry count and a dead-letter path to
/// stay safe against poison messages.
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Start consuming from `queue`, routing deliveries through `registry`.
    ///
    /// Returns a [`Subscription`] handle; dispatch runs in a background
    /// task until the handle is cancelled or the broker closes the stream.
    pub async fn listen(&self, queue: &str, registry: HandlerRegistry) -> Result<Subscription> {
        let consumer = self.channel.consume(queue).await?;
        let consumer_tag = consumer.consumer_tag.clone();
        let cancel_token = CancellationToken::new();

        let worker = DispatchLoop {
            channel: self.channel.clone(),
            registry,
            deliveries: consumer.deliveries,
            consumer_tag: consumer.consumer_tag,
            cancel_token: cancel_token.clone(),
        };
        let handle = tokio::spawn(worker.run());

        debug!(queue, %consumer_tag, "dispatcher listening");
        Ok(Subscription {
            cancel_token,
            handle,
            consumer_tag,
        })
    }
}

/// Handle to a running dispatch loop.
///
/// Dropping the handle does not stop dispatch; call [`cancel`] or
/// [`shutdown`].
///
/// [`cancel`]: Subscription::cancel
/// [`shutdown`]: Subscription::shutdown
pub struct Subscription {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
    consumer_tag: String,
}

impl Subscription {
    /// Stop accepting new deliveries. Safe to call from any task; a
    /// delivery currently being settled is still settled before the loop
    /// exits and the consumer is cancelled on the channel.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Cancel and wait for the dispatch task to finish its close sequence.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel_token.cancel();
        self.handle.await?;
        Ok(())
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }
}

struct DispatchLoop {
    channel: Arc<dyn Channel>,
    registry: HandlerRegistry,
    deliveries: Receiver<Delivery>,
    consumer_tag: String,
    cancel_token: CancellationToken,
}

impl DispatchLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                maybe = self.deliveries.recv() => match maybe {
                    // A delivery is settled to completion before the token
                    // is checked again.
                    Some(delivery) => self.dispatch(delivery).await,
                    None => break,
                }
            }
        }
        // Close sequence: no new deliveries are read past this point and
        // the in-flight one (if any) was settled above.
        if let Err(e) = self.channel.cancel(&self.consumer_tag).await {
            debug!(consumer_tag = %self.consumer_tag, %e, "consumer cancel failed");
        }
        debug!(consumer_tag = %self.consumer_tag, "dispatch loop stopped");
    }

    async fn dispatch(&self, delivery: Delivery) {
        let tag = delivery.delivery_tag;
        let envelope = match Envelope::from_bytes(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Rejected: a body that doesn't parse now won't parse on
                // redelivery either, so it must not go back to the queue.
                warn!(delivery_tag = tag, %e, "rejecting malformed message");
                if let Err(e) = self.channel.nack(tag, false).await {
                    error!(delivery_tag = tag, %e, "reject failed");
                }
                return;
            }
        };

        match self.registry.lookup(&envelope.pattern) {
            Some(handler) => {
                // Matched: ack happens here, not on handler success.
                if let Err(e) = self.channel.ack(tag).await {
                    error!(pattern = %envelope.pattern, delivery_tag = tag, %e, "ack failed");
                    return;
                }
                if let Err(e) = handler(envelope.payload).await {
                    error!(pattern = %envelope.pattern, %e, "handler failed after ack");
                }
            }
            None => {
                // Unmatched: someone else's message. Back to the queue.
                debug!(pattern = %envelope.pattern, delivery_tag = tag, "requeueing unmatched message");
                if let Err(e) = self.channel.nack(tag, true).await {
                    error!(pattern = %envelope.pattern, delivery_tag = tag, %e, "requeue failed");
                }
            }
        }
    }
}
