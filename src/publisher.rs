use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{Envelope, Error, Result, broker::Channel, broker::Properties};

/// Publishes pattern-tagged events onto the shared queue.
///
/// Each call sends one persistent JSON message. Success means the broker
/// has durably stored the message; delivery to a consumer is the broker's
/// at-least-once guarantee, not awaited here. There is no internal retry:
/// a failed publish surfaces to the caller, and retry policy (if any) is an
/// operational concern above this layer.
pub struct Publisher {
    channel: Arc<dyn Channel>,
    queue: Arc<str>,
}

impl Publisher {
    pub fn new(channel: Arc<dyn Channel>, queue: impl Into<Arc<str>>) -> Self {
        Self {
            channel,
            queue: queue.into(),
        }
    }

    /// Wrap `payload` in an envelope tagged with `pattern` and send it.
    ///
    /// Fails with [`Error::EmptyPattern`] for an empty pattern,
    /// [`Error::Encode`] when the payload doesn't serialize, and
    /// [`Error::Connection`] when the channel is gone.
    pub async fn publish<T: Serialize>(&self, pattern: &str, payload: &T) -> Result<()> {
        if pattern.is_empty() {
            return Err(Error::EmptyPattern);
        }
        let envelope = Envelope::new(pattern, payload)?;
        let body = envelope.to_bytes()?;
        self.channel
            .publish(&self.queue, body, Properties::persistent_json())
            .await?;
        debug!(pattern, queue = %self.queue, "published event");
        Ok(())
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}
