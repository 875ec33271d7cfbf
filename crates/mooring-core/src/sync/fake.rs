//! Scriptable in-process remote authority for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Entity, EntityKind, QueueItem};

use super::remote::{PushResponse, PushResult, RemoteAuthority, Snapshot};

#[derive(Default)]
struct FakeState {
    snapshot: Snapshot,
    deltas: VecDeque<Snapshot>,
    entities: HashMap<(EntityKind, String), Entity>,
    verdicts: HashMap<String, u16>,
    silent: HashSet<String>,
    stray_results: Vec<PushResult>,
    offline: bool,
    pushed: Vec<Vec<QueueItem>>,
    pull_sinces: Vec<String>,
    applied_keys: HashSet<Uuid>,
}

/// Remote that answers from canned data and records what it was sent.
///
/// Push verdicts default to 200 and are keyed by entity id. Keys already
/// applied are acknowledged again without being re-applied.
#[derive(Default)]
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn set_snapshot(&self, snapshot: Snapshot) {
        self.with(|state| state.snapshot = snapshot);
    }

    pub(crate) fn queue_delta(&self, delta: Snapshot) {
        self.with(|state| state.deltas.push_back(delta));
    }

    pub(crate) fn set_entity(&self, kind: EntityKind, entity: Entity) {
        self.with(|state| {
            state.entities.insert((kind, entity.id.clone()), entity);
        });
    }

    pub(crate) fn set_verdict(&self, entity_id: &str, status: u16) {
        self.with(|state| {
            state.verdicts.insert(entity_id.to_string(), status);
        });
    }

    /// Leave actions for `entity_id` out of push responses
    pub(crate) fn stay_silent_on(&self, entity_id: &str) {
        self.with(|state| {
            state.silent.insert(entity_id.to_string());
        });
    }

    pub(crate) fn add_stray_result(&self, result: PushResult) {
        self.with(|state| state.stray_results.push(result));
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.with(|state| state.offline = offline);
    }

    pub(crate) fn pushed(&self) -> Vec<Vec<QueueItem>> {
        self.with(|state| state.pushed.clone())
    }

    pub(crate) fn pull_sinces(&self) -> Vec<String> {
        self.with(|state| state.pull_sinces.clone())
    }

    /// Number of distinct idempotency keys the server applied
    pub(crate) fn applied_count(&self) -> usize {
        self.with(|state| state.applied_keys.len())
    }

    fn reachable(state: &FakeState) -> Result<()> {
        if state.offline {
            Err(Error::Remote {
                status: 503,
                message: "remote unreachable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl RemoteAuthority for FakeRemote {
    async fn bootstrap(&self) -> Result<Snapshot> {
        self.with(|state| {
            Self::reachable(state)?;
            Ok(state.snapshot.clone())
        })
    }

    async fn pull(&self, since: &str) -> Result<Snapshot> {
        self.with(|state| {
            Self::reachable(state)?;
            state.pull_sinces.push(since.to_string());
            Ok(state
                .deltas
                .pop_front()
                .unwrap_or_else(|| Snapshot::empty(since)))
        })
    }

    async fn fetch_entity(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        self.with(|state| {
            Self::reachable(state)?;
            Ok(state.entities.get(&(kind, id.to_string())).cloned())
        })
    }

    async fn push(&self, actions: &[QueueItem]) -> Result<PushResponse> {
        self.with(|state| {
            Self::reachable(state)?;
            state.pushed.push(actions.to_vec());

            let mut results = Vec::new();
            for action in actions {
                let entity_id = action.entity_id().unwrap_or_default().to_string();
                if state.silent.contains(&entity_id) {
                    continue;
                }
                let status = state.verdicts.get(&entity_id).copied().unwrap_or(200);
                if (200..300).contains(&status) {
                    state.applied_keys.insert(action.idempotency_key);
                }
                results.push(PushResult {
                    idempotency_key: action.idempotency_key,
                    status,
                    body: None,
                    error: (status >= 300).then(|| serde_json::json!(format!("status {status}"))),
                });
            }
            results.extend(state.stray_results.drain(..));
            Ok(PushResponse { results })
        })
    }
}
