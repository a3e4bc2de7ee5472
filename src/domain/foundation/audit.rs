//! Audit trail primitives.
//!
//! Every domain write carries an [`AuditEntry`] that repositories persist in
//! the same transaction as the write itself. The acting party is threaded
//! explicitly through the call chain as an [`Actor`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Who caused a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// A background process inside this service (sweeper, command handler).
    pub fn system(component: &str) -> Self {
        Self(format!("system:{}", component))
    }

    /// The payment gateway, acting through a specific webhook event.
    pub fn gateway_event(event_id: &str) -> Self {
        Self(format!("gateway:{}", event_id))
    }

    /// A client or operator acting through an upstream API.
    pub fn user(id: impl fmt::Display) -> Self {
        Self(format!("user:{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub actor: Actor,
    pub detail: Value,
    pub recorded_at: Timestamp,
}

impl AuditEntry {
    pub fn new(entity_type: &str, entity_id: Uuid, action: &str, actor: &Actor) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id,
            action: action.to_string(),
            actor: actor.clone(),
            detail: Value::Null,
            recorded_at: Timestamp::now(),
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}
