//! Bootstrap, delta pull and queue push against a remote authority.

use std::collections::{HashMap, HashSet};

use libsql::Connection;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::apply::{plan_pull, rebase_pending, ChangeNotice};
use crate::db::{
    begin_write, finish_write, Database, LibSqlEntityRepository, LibSqlQueueRepository,
    LibSqlSyncStateRepository, QueueRepository,
};
use crate::error::{Error, Result};
use crate::models::{Entity, EntityKind, Operation, QueueItem, QueueStatus, SyncScope};

use super::remote::{PushResponse, RemoteAuthority, Snapshot};

/// Summary of a first-time bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Entities written across all collections
    pub applied: usize,
    /// Entities whose pending local mutations were replayed over server state
    pub rebased: usize,
    pub timestamp: String,
    #[serde(skip)]
    pub changes: Vec<ChangeNotice>,
}

/// An incoming entity left untouched because local work is still pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntity {
    pub kind: EntityKind,
    pub id: String,
}

/// Summary of a delta pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub applied: usize,
    pub skipped: Vec<SkippedEntity>,
    pub timestamp: String,
    #[serde(skip)]
    pub changes: Vec<ChangeNotice>,
}

/// Summary of one push round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub submitted: usize,
    pub synced: usize,
    pub conflicted: usize,
    pub failed: usize,
    /// Submitted items the response did not mention; they stay pending
    pub unanswered: usize,
    /// Results for keys that were not submitted or were already settled
    pub ignored: usize,
}

/// Outcome of a full sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub bootstrap: Option<BootstrapReport>,
    pub pull: Option<PullReport>,
    pub push: PushReport,
}

impl SyncReport {
    pub fn changes(&self) -> impl Iterator<Item = &ChangeNotice> {
        self.bootstrap
            .iter()
            .flat_map(|report| report.changes.iter())
            .chain(self.pull.iter().flat_map(|report| report.changes.iter()))
    }
}

/// Moves state between the local store and a remote authority.
///
/// The store lock is held only while reading or writing SQLite, never across
/// a network call.
pub struct SyncService<'a, R> {
    store: &'a Mutex<Database>,
    remote: &'a R,
}

impl<'a, R: RemoteAuthority> SyncService<'a, R> {
    pub const fn new(store: &'a Mutex<Database>, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Seed the store from a full snapshot. Only valid before the first sync.
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        if let Some(last_sync) = self.last_sync().await? {
            return Err(Error::AlreadyBootstrapped(last_sync));
        }

        let snapshot = self.remote.bootstrap().await?;
        let db = self.store.lock().await;
        let conn = db.connection();
        begin_write(conn).await?;
        let result = apply_bootstrap(conn, snapshot).await;
        let report = finish_write(conn, result).await?;

        tracing::info!(
            applied = report.applied,
            rebased = report.rebased,
            timestamp = %report.timestamp,
            "Bootstrapped local store"
        );
        Ok(report)
    }

    /// Apply entities changed after `since`, skipping ids with pending work.
    pub async fn pull(&self, since: &str) -> Result<PullReport> {
        let snapshot = self.remote.pull(since).await?;
        let db = self.store.lock().await;
        let conn = db.connection();
        begin_write(conn).await?;
        let result = apply_pull(conn, snapshot).await;
        let report = finish_write(conn, result).await?;

        tracing::info!(
            since,
            applied = report.applied,
            skipped = report.skipped.len(),
            timestamp = %report.timestamp,
            "Pulled remote changes"
        );
        Ok(report)
    }

    /// Pull from the stored watermark.
    pub async fn pull_latest(&self) -> Result<PullReport> {
        let since = self.last_sync().await?.ok_or(Error::NotBootstrapped)?;
        self.pull(&since).await
    }

    /// Submit every pending item in one batch and record the verdicts.
    ///
    /// A transport failure leaves all items pending and is returned as-is.
    pub async fn push_actions(&self) -> Result<PushReport> {
        let pending = {
            let db = self.store.lock().await;
            LibSqlQueueRepository::new(db.connection()).pending().await?
        };
        if pending.is_empty() {
            tracing::debug!("No pending actions to push");
            return Ok(PushReport::default());
        }

        let response = match self.remote.push(&pending).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(count = pending.len(), %error, "Push failed; actions stay pending");
                return Err(error);
            }
        };

        let db = self.store.lock().await;
        let conn = db.connection();
        begin_write(conn).await?;
        let result = record_push_results(conn, &pending, response).await;
        let report = finish_write(conn, result).await?;

        tracing::info!(
            submitted = report.submitted,
            synced = report.synced,
            conflicted = report.conflicted,
            failed = report.failed,
            unanswered = report.unanswered,
            "Pushed queued actions"
        );
        Ok(report)
    }

    /// Bootstrap on first run, otherwise pull; then push.
    ///
    /// A failed bootstrap or pull aborts the cycle before anything is pushed.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        match self.last_sync().await? {
            None => report.bootstrap = Some(self.bootstrap().await?),
            Some(since) => report.pull = Some(self.pull(&since).await?),
        }
        report.push = self.push_actions().await?;
        Ok(report)
    }

    pub async fn last_sync(&self) -> Result<Option<String>> {
        let db = self.store.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .last_sync(SyncScope::Global)
            .await
    }
}

async fn apply_bootstrap(conn: &Connection, mut snapshot: Snapshot) -> Result<BootstrapReport> {
    let state = LibSqlSyncStateRepository::new(conn);
    // Another bootstrap may have committed while the snapshot was in flight
    if let Some(last_sync) = state.last_sync(SyncScope::Global).await? {
        return Err(Error::AlreadyBootstrapped(last_sync));
    }

    let pending = LibSqlQueueRepository::new(conn).pending().await?;
    let mut report = BootstrapReport {
        timestamp: snapshot.timestamp.clone(),
        ..BootstrapReport::default()
    };

    for kind in EntityKind::ALL {
        let server = std::mem::take(snapshot.collection_mut(kind));
        let (entities, rebased) = rebase_collection(kind, server, &pending)?;
        let removed = LibSqlEntityRepository::new(conn, kind)
            .replace_all_in_tx(&entities)
            .await?;

        report.applied += entities.len();
        report.rebased += rebased;
        report.changes.extend(
            entities
                .iter()
                .map(|entity| ChangeNotice::new(kind, entity.id.clone(), Operation::Create, true)),
        );
        report.changes.extend(
            removed
                .into_iter()
                .map(|id| ChangeNotice::new(kind, id, Operation::Delete, true)),
        );
    }

    state.set(SyncScope::Global, &snapshot.timestamp).await?;
    Ok(report)
}

/// Server collection with pending local mutations replayed on top.
fn rebase_collection(
    kind: EntityKind,
    server: Vec<Entity>,
    pending: &[QueueItem],
) -> Result<(Vec<Entity>, usize)> {
    let mut order = Vec::new();
    let mut by_id: HashMap<&str, Vec<QueueItem>> = HashMap::new();
    for item in pending.iter().filter(|item| item.action.kind == kind) {
        let Some(id) = item.entity_id() else {
            continue;
        };
        by_id
            .entry(id)
            .or_insert_with(|| {
                order.push(id);
                Vec::new()
            })
            .push(item.clone());
    }

    let mut rebased = 0;
    let mut entities = Vec::with_capacity(server.len());
    for entity in server {
        match by_id.remove(entity.id.as_str()) {
            Some(items) => {
                rebased += 1;
                entities.extend(rebase_pending(Some(entity), &items)?);
            }
            None => entities.push(entity),
        }
    }
    // Entities created offline that the server has never seen
    for id in order {
        if let Some(items) = by_id.remove(id) {
            rebased += 1;
            entities.extend(rebase_pending(None, &items)?);
        }
    }

    Ok((entities, rebased))
}

async fn apply_pull(conn: &Connection, mut snapshot: Snapshot) -> Result<PullReport> {
    let queue = LibSqlQueueRepository::new(conn);
    let mut report = PullReport {
        timestamp: snapshot.timestamp.clone(),
        ..PullReport::default()
    };

    for kind in EntityKind::ALL {
        let incoming = std::mem::take(snapshot.collection_mut(kind));
        if incoming.is_empty() {
            continue;
        }

        let unresolved_ids = queue.unresolved_entity_ids(kind).await?;
        let plan = plan_pull(incoming, &unresolved_ids);
        let repo = LibSqlEntityRepository::new(conn, kind);
        for entity in &plan.apply {
            let operation = repo.put_synced_in_tx(entity).await?;
            report
                .changes
                .push(ChangeNotice::new(kind, entity.id.clone(), operation, true));
        }
        report.applied += plan.apply.len();

        for id in plan.skipped {
            tracing::debug!(%kind, entity_id = %id, "Skipped pulled entity with unresolved local changes");
            report.skipped.push(SkippedEntity { kind, id });
        }
    }

    LibSqlSyncStateRepository::new(conn)
        .set(SyncScope::Global, &snapshot.timestamp)
        .await?;
    Ok(report)
}

async fn record_push_results(
    conn: &Connection,
    submitted: &[QueueItem],
    response: PushResponse,
) -> Result<PushReport> {
    let queue = LibSqlQueueRepository::new(conn);
    let keys: HashSet<Uuid> = submitted.iter().map(|item| item.idempotency_key).collect();
    let mut answered = HashSet::new();
    let mut report = PushReport {
        submitted: submitted.len(),
        ..PushReport::default()
    };

    for result in response.results {
        let key = result.idempotency_key;
        if !keys.contains(&key) {
            tracing::warn!(idempotency_key = %key, status = result.status, "Ignoring result for unknown idempotency key");
            report.ignored += 1;
            continue;
        }

        let status = QueueStatus::from_push_status(result.status);
        let error = match status {
            QueueStatus::Synced => None,
            QueueStatus::Conflict => Some(result.error_text().map_or_else(
                || "version mismatch".to_string(),
                |detail| format!("version mismatch: {detail}"),
            )),
            QueueStatus::Failed | QueueStatus::Pending => Some(
                result
                    .error_text()
                    .unwrap_or_else(|| format!("HTTP {}", result.status)),
            ),
        };

        if !queue
            .complete(&key, status, result.body.as_ref(), error.as_deref())
            .await?
        {
            report.ignored += 1;
            continue;
        }
        answered.insert(key);

        match status {
            QueueStatus::Synced => report.synced += 1,
            QueueStatus::Conflict => {
                tracing::warn!(idempotency_key = %key, "Remote rejected action with a version conflict");
                report.conflicted += 1;
            }
            QueueStatus::Failed | QueueStatus::Pending => {
                tracing::warn!(idempotency_key = %key, status = result.status, "Remote rejected action");
                report.failed += 1;
            }
        }
    }

    report.unanswered = submitted.len() - answered.len();
    Ok(report)
}
