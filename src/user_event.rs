use serde::{Deserialize, Serialize};

use crate::{Publisher, Result, pattern};

/// The user lifecycle event body exchanged between the user service and
/// its consumers. Schema is shared out-of-band; the dispatch layer never
/// looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Typed publishing surface for the three user lifecycle patterns.
///
/// Called by the persistence layer after a domain mutation has committed.
pub struct UserEventPublisher {
    publisher: Publisher,
}

impl UserEventPublisher {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    pub async fn publish_created(&self, user: &UserEvent) -> Result<()> {
        self.publisher.publish(pattern::USER_CREATED, user).await
    }

    pub async fn publish_updated(&self, user: &UserEvent) -> Result<()> {
        self.publisher.publish(pattern::USER_UPDATED, user).await
    }

    pub async fn publish_deleted(&self, user: &UserEvent) -> Result<()> {
        self.publisher.publish(pattern::USER_DELETED, user).await
    }
}
