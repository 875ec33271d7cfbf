//! Remote authority contract: wire types and the client trait.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Entity, EntityKind, QueueItem};

/// Body of `GET /sync/bootstrap` and `GET /sync/pull?since=`.
///
/// Collections absent from the payload are treated as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Entity>,
    #[serde(default)]
    pub projects: Vec<Entity>,
    #[serde(default)]
    pub alerts: Vec<Entity>,
    #[serde(default)]
    pub reports: Vec<Entity>,
    #[serde(default)]
    pub posts: Vec<Entity>,
    /// Server clock at the time the snapshot was taken
    pub timestamp: String,
}

impl Snapshot {
    /// Empty snapshot stamped with `timestamp`
    pub fn empty(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    /// Entities returned for `kind`
    pub fn collection(&self, kind: EntityKind) -> &[Entity] {
        match kind {
            EntityKind::Task => &self.tasks,
            EntityKind::Project => &self.projects,
            EntityKind::Alert => &self.alerts,
            EntityKind::Report => &self.reports,
            EntityKind::Post => &self.posts,
        }
    }

    /// Mutable access, mostly for building fixtures
    pub fn collection_mut(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
        match kind {
            EntityKind::Task => &mut self.tasks,
            EntityKind::Project => &mut self.projects,
            EntityKind::Alert => &mut self.alerts,
            EntityKind::Report => &mut self.reports,
            EntityKind::Post => &mut self.posts,
        }
    }

    /// Total number of entities across collections
    pub fn len(&self) -> usize {
        EntityKind::ALL
            .into_iter()
            .map(|kind| self.collection(kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body of `POST /sync/push`.
#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub actions: &'a [QueueItem],
}

/// Per-action verdict inside a push response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub idempotency_key: Uuid,
    /// HTTP-style status for this action
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl PushResult {
    /// Error detail flattened to text
    pub fn error_text(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(message) => Some(message.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Body returned by `POST /sync/push`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub results: Vec<PushResult>,
}

/// Client side of the remote authority.
///
/// Implementations report network problems as `Error::Transport` and
/// non-success responses as `Error::Remote`.
#[allow(async_fn_in_trait)]
pub trait RemoteAuthority {
    /// Full snapshot of every collection
    async fn bootstrap(&self) -> Result<Snapshot>;

    /// Entities changed after `since`
    async fn pull(&self, since: &str) -> Result<Snapshot>;

    /// Current state of a single entity; `None` when the server no longer has it
    async fn fetch_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>>;

    /// Submit a batch of queued actions
    async fn push(&self, actions: &[QueueItem]) -> Result<PushResponse>;
}

/// No remote configured: local operations work, sync calls fail with `Config`.
impl<R: RemoteAuthority> RemoteAuthority for Option<R> {
    async fn bootstrap(&self) -> Result<Snapshot> {
        configured(self.as_ref())?.bootstrap().await
    }

    async fn pull(&self, since: &str) -> Result<Snapshot> {
        configured(self.as_ref())?.pull(since).await
    }

    async fn fetch_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        configured(self.as_ref())?.fetch_entity(kind, id).await
    }

    async fn push(&self, actions: &[QueueItem]) -> Result<PushResponse> {
        configured(self.as_ref())?.push(actions).await
    }
}

fn configured<R>(remote: Option<&R>) -> Result<&R> {
    remote.ok_or_else(|| Error::Config("no remote authority configured".to_string()))
}
