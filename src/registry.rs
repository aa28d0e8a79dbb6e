use std::{collections::HashMap, sync::Arc};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use crate::Result;

/// An async handler invoked with the decoded payload of an accepted
/// message.
///
/// Handlers run *after* the message has been acked; an error returned here
/// is surfaced by the dispatcher's logging but never requeues the message.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Mapping from pattern to handler. Pure lookup table, no I/O.
///
/// Populated once at subscription setup and then consulted per delivery by
/// the [`Dispatcher`](crate::Dispatcher). Lookup is exact string match; a
/// message whose pattern is absent from the registry is not this consumer's
/// to process.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a pattern, consuming and returning the
    /// registry so registrations chain.
    ///
    /// Patterns are unique per registry. Registering the same pattern twice
    /// replaces the prior handler (last write wins); since that is almost
    /// always a misconfiguration, the replacement is logged as a warning.
    pub fn on<F, Fut>(mut self, pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let pattern = pattern.into();
        let boxed: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        if self.handlers.insert(pattern.clone(), boxed).is_some() {
            warn!(%pattern, "replacing an already registered handler");
        }
        self
    }

    /// Look up the handler for a pattern, if this registry holds one.
    pub fn lookup(&self, pattern: &str) -> Option<&Handler> {
        self.handlers.get(pattern)
    }

    /// Patterns this registry is interested in.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("patterns", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
