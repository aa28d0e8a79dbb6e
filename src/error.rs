#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Broker connection unavailable: {0}")]
    Connection(String),

    #[error("Couldn't publish the message: {0}")]
    Publish(String),

    #[error("Pattern must be a non-empty string.")]
    EmptyPattern,

    #[error("Couldn't encode the envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Malformed message body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Handler for pattern '{pattern}' failed: {message}")]
    Handler { pattern: String, message: String },

    #[error("Dispatch task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Build a handler error from anything printable. Convenience for
    /// handler closures that surface domain failures.
    pub fn handler(pattern: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Handler {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::Connection(e.to_string())
    }
}
