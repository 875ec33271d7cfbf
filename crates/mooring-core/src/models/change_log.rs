//! Change-log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityKind;
use super::queue::Operation;

/// Append-only record of a local write, kept for audit and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    /// Row identifier
    pub id: i64,
    /// Entity that was written
    pub entity_id: String,
    /// Kind of the entity
    pub entity_type: EntityKind,
    /// Operation applied
    pub operation: Operation,
    /// When the write was committed
    pub timestamp: DateTime<Utc>,
}
