//! Notification-side handlers for the user lifecycle patterns.
//!
//! This is the consumer half of the user event stream: one registry
//! covering all three patterns, attached to a single dispatcher (the
//! "multi-pattern single consumer" mode). The handlers only log what a
//! real notification sender would do.

use serde_json::Value;
use tracing::info;

use crate::{HandlerRegistry, Result, UserEvent, pattern};

/// Build the registry the notification service listens with.
pub fn user_event_handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .on(pattern::USER_CREATED, handle_user_created)
        .on(pattern::USER_UPDATED, handle_user_updated)
        .on(pattern::USER_DELETED, handle_user_deleted)
}

async fn handle_user_created(payload: Value) -> Result<()> {
    let user = decode(pattern::USER_CREATED, payload)?;
    info!(id = %user.id, email = %user.email, "sending welcome email");
    Ok(())
}

async fn handle_user_updated(payload: Value) -> Result<()> {
    let user = decode(pattern::USER_UPDATED, payload)?;
    info!(id = %user.id, email = %user.email, "sending profile update confirmation");
    Ok(())
}

async fn handle_user_deleted(payload: Value) -> Result<()> {
    let user = decode(pattern::USER_DELETED, payload)?;
    info!(id = %user.id, email = %user.email, "sending account deletion confirmation");
    Ok(())
}

fn decode(pattern: &str, payload: Value) -> Result<UserEvent> {
    serde_json::from_value(payload).map_err(|e| crate::Error::handler(pattern, e))
}
