//! Routing patterns and the shared queue name.
//!
//! Patterns form a flat namespace: no wildcards, no hierarchy. The sole
//! routing rule anywhere in this crate is exact string equality between a
//! message's pattern and a registered one.
//!
//! The constants are deliberately fixed strings rather than values derived
//! from a type name. Deriving them would silently change the wire contract
//! whenever the underlying type is renamed.

/// The single durable queue all publishers and consumers agree on.
pub const NOTIFICATIONS_QUEUE: &str = "notifications_queue";

/// Emitted after a user has been created.
pub const USER_CREATED: &str = "user.created";

/// Emitted after a user has been updated.
pub const USER_UPDATED: &str = "user.updated";

/// Emitted after a user has been deleted.
pub const USER_DELETED: &str = "user.deleted";
