//! Sync queue item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::entity::EntityKind;

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Lowercase name, as written to the change log
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    const fn action_prefix(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown operation '{other}'"))),
        }
    }
}

/// Queue action type such as `UPDATE_PROJECT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionType {
    pub operation: Operation,
    pub kind: EntityKind,
}

impl ActionType {
    pub const fn new(operation: Operation, kind: EntityKind) -> Self {
        Self { operation, kind }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.operation.action_prefix(),
            self.kind.action_suffix()
        )
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (operation, kind) = s
            .split_once('_')
            .ok_or_else(|| Error::InvalidInput(format!("malformed action type '{s}'")))?;
        Ok(Self {
            operation: operation.parse()?,
            kind: kind.parse()?,
        })
    }
}

impl TryFrom<String> for ActionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.to_string()
    }
}

/// Lifecycle status of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting to be pushed
    Pending,
    /// Accepted by the remote authority
    Synced,
    /// Rejected with a version mismatch
    Conflict,
    /// Rejected for any other reason
    Failed,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Map a per-item HTTP status from a push response to the next state.
    pub const fn from_push_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Synced,
            409 => Self::Conflict,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown queue status '{other}'"))),
        }
    }
}

/// One attempted mutation awaiting (or past) confirmation by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Local auto-increment key
    pub id: i64,
    /// Action type, e.g. `CREATE_TASK`
    #[serde(rename = "type")]
    pub action: ActionType,
    /// Data sent to the remote
    pub payload: Value,
    /// Deduplication token, fixed for the item's lifetime
    pub idempotency_key: Uuid,
    pub status: QueueStatus,
    /// Server response body once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure detail once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Enqueue time, defines push order
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    /// Id of the entity this item mutates.
    pub fn entity_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self.status, QueueStatus::Pending)
    }
}

/// Queue tallies by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub synced: usize,
    pub conflict: usize,
    pub failed: usize,
}

impl QueueCounts {
    /// Items that still need an operator or a push.
    pub const fn outstanding(&self) -> usize {
        self.pending + self.conflict + self.failed
    }
}
