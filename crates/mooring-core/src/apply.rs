//! Pure apply-and-notify rules.
//!
//! Everything here computes what a write *should* produce without touching
//! storage, so optimistic UI behaviour and pull filtering can be tested on
//! plain values. Repositories and the sync service call into these functions
//! inside their transactions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{Entity, EntityKind, Operation, QueueItem};

/// Fields owned by the sync core rather than the caller's change set.
const RESERVED_FIELDS: [&str; 2] = ["id", "updatedAt"];

/// Merge `changes` into `existing`, stamping `updatedAt` with `now`.
///
/// Later values replace earlier ones key by key; `null` is stored as `null`.
pub fn merge_changes(existing: &Entity, changes: &Map<String, Value>, now: DateTime<Utc>) -> Entity {
    let mut merged = existing.clone();
    for (key, value) in changes {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        merged.fields.insert(key.clone(), value.clone());
    }
    merged.updated_at = now;
    merged
}

/// Strip reserved keys from a caller-supplied change set.
pub fn user_changes(changes: &Map<String, Value>) -> Map<String, Value> {
    changes
        .iter()
        .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Queue payload for an update: `{id, ...changes, updatedAt}`.
pub fn update_payload(id: &str, changes: &Map<String, Value>, updated_at: DateTime<Utc>) -> Value {
    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::String(id.to_string()));
    payload.extend(user_changes(changes));
    payload.insert(
        "updatedAt".to_string(),
        serde_json::to_value(updated_at).unwrap_or(Value::Null),
    );
    Value::Object(payload)
}

/// Queue payload for a delete: `{id}`.
pub fn delete_payload(id: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(payload)
}

/// Queue payload for a delete re-asserted after a conflict: `{id, updatedAt}`.
pub fn reissued_delete_payload(id: &str, updated_at: DateTime<Utc>) -> Value {
    let mut payload = Map::new();
    payload.insert("id".to_string(), Value::String(id.to_string()));
    payload.insert(
        "updatedAt".to_string(),
        serde_json::to_value(updated_at).unwrap_or(Value::Null),
    );
    Value::Object(payload)
}

/// The change set carried by a create or update payload.
pub fn payload_changes(payload: &Value) -> Map<String, Value> {
    payload
        .as_object()
        .map(user_changes)
        .unwrap_or_default()
}

/// Change set that re-asserts the local copy over a conflicting mutation.
///
/// Creates re-send every local field; updates re-send the current local value
/// of each field the original payload touched.
pub fn reassert_changes(operation: Operation, payload: &Value, local: &Entity) -> Map<String, Value> {
    match operation {
        Operation::Create => user_changes(&local.fields),
        Operation::Update | Operation::Delete => payload_changes(payload)
            .keys()
            .filter_map(|key| {
                local
                    .fields
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect(),
    }
}

/// Outcome of filtering a pulled collection against local pending work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullPlan {
    /// Entities to overwrite locally
    pub apply: Vec<Entity>,
    /// Ids kept at their local optimistic state
    pub skipped: Vec<String>,
}

/// Split incoming entities into those to apply and those protected by a
/// pending or conflicted local mutation.
pub fn plan_pull(incoming: Vec<Entity>, unresolved_ids: &HashSet<String>) -> PullPlan {
    let (skipped, apply): (Vec<_>, Vec<_>) = incoming
        .into_iter()
        .partition(|entity| unresolved_ids.contains(&entity.id));

    PullPlan {
        apply,
        skipped: skipped.into_iter().map(|entity| entity.id).collect(),
    }
}

/// Replay pending mutations (oldest first) on top of the server's copy.
///
/// Returns `None` when the replayed result is "does not exist".
pub fn rebase_pending(server: Option<Entity>, pending: &[QueueItem]) -> Result<Option<Entity>> {
    let mut current = server;
    for item in pending {
        current = match item.action.operation {
            Operation::Create => Some(Entity::from_value(item.payload.clone())?),
            Operation::Update => current.map(|entity| {
                let stamp = item
                    .payload
                    .get("updatedAt")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or(entity.updated_at);
                merge_changes(&entity, &payload_changes(&item.payload), stamp)
            }),
            Operation::Delete => None,
        };
    }
    Ok(current)
}

/// Where a committed write came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// A user mutation, queued for push
    Local,
    /// Server state applied by bootstrap, pull or conflict resolution
    Remote,
}

/// Notification emitted after a write commits, for UI refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub kind: EntityKind,
    pub entity_id: String,
    pub operation: Operation,
    pub origin: ChangeOrigin,
}

impl ChangeNotice {
    pub fn new(
        kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        syncd: bool,
    ) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            operation,
            origin: if syncd {
                ChangeOrigin::Remote
            } else {
                ChangeOrigin::Local
            },
        }
    }
}
