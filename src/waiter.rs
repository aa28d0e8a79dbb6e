use std::{sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::{Envelope, Error, Result, broker::Channel};

/// One-shot, time-bounded consumer that observes the next message of a
/// single pattern.
///
/// Exists for verification code that wants to assert "the next matching
/// event" without standing up a [`Dispatcher`](crate::Dispatcher); it has
/// no role in production delivery. The ack/nack policy per message is
/// identical to the dispatcher's: matched messages are acked, unmatched
/// ones requeued, malformed ones rejected.
pub struct PatternWaiter {
    channel: Arc<dyn Channel>,
}

/// Terminal outcome of the wait loop. Settled exactly once, before the
/// subscription is cancelled, so a message racing the timeout can neither
/// double-resolve the wait nor be left unacked.
enum Settled {
    Matched(Value),
    TimedOut,
    Failed(Error),
}

impl PatternWaiter {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Wait for the next message on `queue` whose pattern equals `pattern`.
    ///
    /// Starts a dedicated subscription, resolves with `Some(payload)` on a
    /// match or `None` once `timeout` elapses, and cancels the subscription
    /// either way before returning. A zero timeout answers immediately.
    /// Connection loss is a hard error, distinct from the `None` timeout.
    pub async fn await_pattern<T: DeserializeOwned>(
        &self,
        queue: &str,
        pattern: &str,
        timeout: Duration,
    ) -> Result<Option<T>> {
        let mut consumer = self.channel.consume(queue).await?;
        let deadline = Instant::now() + timeout;

        let settled = loop {
            tokio::select! {
                // Deadline first: with a zero timeout no delivery is
                // accepted at all.
                biased;
                _ = sleep_until(deadline) => break Settled::TimedOut,
                maybe = consumer.deliveries.recv() => {
                    let Some(delivery) = maybe else {
                        break Settled::Failed(Error::Connection(
                            "delivery stream closed".into(),
                        ));
                    };
                    let tag = delivery.delivery_tag;
                    match Envelope::from_bytes(&delivery.body) {
                        Err(e) => {
                            warn!(delivery_tag = tag, %e, "rejecting malformed message");
                            if let Err(e) = self.channel.nack(tag, false).await {
                                break Settled::Failed(e);
                            }
                        }
                        Ok(envelope) if envelope.pattern == pattern => {
                            if let Err(e) = self.channel.ack(tag).await {
                                break Settled::Failed(e);
                            }
                            break Settled::Matched(envelope.payload);
                        }
                        Ok(envelope) => {
                            debug!(
                                wanted = pattern,
                                got = %envelope.pattern,
                                "requeueing unmatched message"
                            );
                            if let Err(e) = self.channel.nack(tag, true).await {
                                break Settled::Failed(e);
                            }
                        }
                    }
                }
            }
        };

        // Close sequence: the in-flight message (if any) was settled above,
        // so cancelling here cannot abandon an unacked delivery.
        if let Err(e) = self.channel.cancel(&consumer.consumer_tag).await {
            debug!(consumer_tag = %consumer.consumer_tag, %e, "consumer cancel failed");
        }

        match settled {
            Settled::Matched(payload) => {
                let payload = serde_json::from_value(payload).map_err(Error::Decode)?;
                Ok(Some(payload))
            }
            Settled::TimedOut => Ok(None),
            Settled::Failed(e) => Err(e),
        }
    }
}
