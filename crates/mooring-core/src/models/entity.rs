//! Entity records and the typed entity registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::now_millis;

/// Entity types known to the local store.
///
/// Each kind owns one table and one collection in the remote snapshot, so an
/// unknown name is rejected here instead of reaching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Project,
    Alert,
    Report,
    Post,
}

impl EntityKind {
    /// Every registered kind, in snapshot order.
    pub const ALL: [Self; 5] = [
        Self::Task,
        Self::Project,
        Self::Alert,
        Self::Report,
        Self::Post,
    ];

    /// Collection name used by the remote snapshot and as the local table name
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Task => "tasks",
            Self::Project => "projects",
            Self::Alert => "alerts",
            Self::Report => "reports",
            Self::Post => "posts",
        }
    }

    /// Suffix used in queue action types, e.g. `TASK` in `CREATE_TASK`
    pub const fn action_suffix(self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Project => "PROJECT",
            Self::Alert => "ALERT",
            Self::Report => "REPORT",
            Self::Post => "POST",
        }
    }

    /// Singular lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Alert => "alert",
            Self::Report => "report",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    /// Accepts the singular name, the collection name, or the action suffix.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| {
                normalized == kind.as_str()
                    || normalized == kind.collection()
                    || normalized.eq_ignore_ascii_case(kind.action_suffix())
            })
            .ok_or_else(|| Error::UnknownEntity(s.to_string()))
    }
}

/// A domain record (task, project, alert, report, post).
///
/// Only `id` and `updatedAt` are interpreted; every other field travels
/// through the store and the wire untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable unique identifier
    pub id: String,
    /// Last modification time
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// Domain fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Create an entity with a fresh UUID v7 id, stamped now.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), fields)
    }

    /// Create an entity with a caller-chosen id, stamped now.
    #[must_use]
    pub fn with_id(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        let mut fields = fields;
        fields.remove("id");
        fields.remove("updatedAt");
        Self {
            id: id.into(),
            updated_at: now_millis(),
            fields,
        }
    }

    /// Parse an entity from a JSON value (must carry `id` and `updatedAt`).
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize to the JSON shape used on the wire and in storage.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Fetch a domain field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
