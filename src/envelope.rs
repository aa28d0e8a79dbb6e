use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};

/// The unit exchanged over the queue: a routing pattern plus an opaque
/// payload.
///
/// Canonical wire contract: the envelope is serialized as a JSON object
/// `{"pattern": "...", "data": ...}` carried in the message body. The
/// pattern is *not* placed in broker headers; both ends of the queue decode
/// the body to route. Producers and consumers must agree on this exactly.
///
/// The payload is never interpreted here. Its schema is owned by the
/// producer/consumer pair; [`Envelope::payload_as`] is the deserialization
/// hook a consumer applies once a message has been accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub pattern: String,
    #[serde(rename = "data")]
    pub payload: Value,
}

impl Envelope {
    /// Wrap a serializable payload under the given pattern.
    pub fn new<T: Serialize>(pattern: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self {
            pattern: pattern.into(),
            payload: serde_json::to_value(payload).map_err(Error::Encode)?,
        })
    }

    /// Serialize to the wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    /// Parse a message body. A failure here means the message can never
    /// become well-formed and must be rejected, not requeued.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }

    /// Decode the payload into a caller-owned type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(Error::Decode)
    }
}
