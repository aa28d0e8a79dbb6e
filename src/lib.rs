//! Notiq - Pattern-addressed event dispatch over a shared durable queue
//!
//! Publishers tag each event with a flat pattern string and push it onto
//! one shared queue; every consumer sees every message and accepts (acks)
//! only the patterns it registered for, declining the rest with
//! nack-requeue so another consumer can take them.
//!
//! The broker is reached through the [`broker::Channel`] port;
//! [`MemoryBroker`] is the in-process implementation used by tests and
//! local runs.

pub mod broker;
pub mod notifier;
pub mod pattern;

mod config;
mod dispatcher;
mod envelope;
mod error;
mod memory_broker;
mod publisher;
mod registry;
mod user_event;
mod waiter;

pub use config::Config;
pub use dispatcher::{Dispatcher, Subscription};
pub use envelope::Envelope;
pub use error::Error;
pub use memory_broker::MemoryBroker;
pub use publisher::Publisher;
pub use registry::{Handler, HandlerRegistry};
pub use user_event::{UserEvent, UserEventPublisher};
pub use waiter::PatternWaiter;

pub type Result<T = ()> = std::result::Result<T, Error>;
