//! Shared sync core used across shells.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch, Mutex};

use crate::apply::ChangeNotice;
use crate::db::{
    Database, EntityRepository, LibSqlChangeLog, LibSqlEntityRepository, LibSqlQueueRepository,
    QueueRepository,
};
use crate::models::{ChangeLogEntry, Entity, EntityKind, Operation, QueueCounts, QueueItem, QueueStatus};
use crate::state::SyncState;
use crate::sync::{
    BootstrapReport, ConflictResolver, PullReport, PushReport, RemoteAuthority, Resolution,
    SyncReport, SyncService,
};
use crate::Result;

const NOTICE_CAPACITY: usize = 256;

/// Offline-first entry point: local store, queue and remote behind one handle.
///
/// Clones share the same store, remote and connectivity state. The store lock
/// is only held for storage work; drains additionally serialize on a separate
/// sync lock so two pushes never interleave.
pub struct SyncCore<R> {
    db: Arc<Mutex<Database>>,
    remote: Arc<R>,
    sync_gate: Arc<Mutex<()>>,
    state: Arc<watch::Sender<SyncState>>,
    notices: broadcast::Sender<ChangeNotice>,
    db_path: Option<PathBuf>,
}

impl<R> Clone for SyncCore<R> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            remote: Arc::clone(&self.remote),
            sync_gate: Arc::clone(&self.sync_gate),
            state: Arc::clone(&self.state),
            notices: self.notices.clone(),
            db_path: self.db_path.clone(),
        }
    }
}

impl<R: RemoteAuthority> SyncCore<R> {
    /// Open the store at `db_path`, creating parent directories as needed.
    pub async fn open(db_path: impl Into<PathBuf>, remote: R) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!(path = %db_path.display(), "Opened sync core");
        Ok(Self::from_parts(db, remote, Some(db_path)))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory(remote: R) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_parts(db, remote, None))
    }

    fn from_parts(db: Database, remote: R, db_path: Option<PathBuf>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            remote: Arc::new(remote),
            sync_gate: Arc::new(Mutex::new(())),
            state: Arc::new(watch::Sender::new(SyncState::Offline)),
            notices,
            db_path,
        }
    }

    /// Wait for in-flight work, then flush the write-ahead log.
    pub async fn close(self) -> Result<()> {
        let _gate = self.sync_gate.lock().await;
        let db = self.db.lock().await;
        db.checkpoint().await?;
        tracing::info!("Closed sync core");
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Receive a notice after every committed write.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notices.subscribe()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Record connectivity. Coming back online drains the queue once.
    ///
    /// Returns the push report when the call triggered a drain.
    pub async fn set_online(&self, online: bool) -> Result<Option<PushReport>> {
        let changed = self.state.send_if_modified(|state| {
            if state.is_online() == online {
                return false;
            }
            *state = if online {
                SyncState::Synced
            } else {
                SyncState::Offline
            };
            true
        });
        if !changed {
            return Ok(None);
        }

        if online {
            tracing::info!("Connectivity restored; draining queue");
            self.push().await.map(Some)
        } else {
            tracing::info!("Connectivity lost; mutations will queue");
            Ok(None)
        }
    }

    /// Typed entry point for one entity kind.
    pub const fn repository(&self, kind: EntityKind) -> EntityHandle<'_, R> {
        EntityHandle { core: self, kind }
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Vec<Entity>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), kind)
            .get_all()
            .await
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), kind)
            .get_by_id(id)
            .await
    }

    /// Store a new entity and queue its creation.
    pub async fn create(&self, kind: EntityKind, entity: Entity) -> Result<Entity> {
        let created = {
            let db = self.db.lock().await;
            LibSqlEntityRepository::new(db.connection(), kind)
                .create(&entity, false)
                .await?
        };
        self.after_local_write(kind, &created.id, Operation::Create)
            .await;
        Ok(created)
    }

    /// Merge `changes` into an entity and queue the change set.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        changes: &Map<String, Value>,
    ) -> Result<Entity> {
        let updated = {
            let db = self.db.lock().await;
            LibSqlEntityRepository::new(db.connection(), kind)
                .update(id, changes, false)
                .await?
        };
        self.after_local_write(kind, id, Operation::Update).await;
        Ok(updated)
    }

    /// Remove an entity and queue the deletion.
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        {
            let db = self.db.lock().await;
            LibSqlEntityRepository::new(db.connection(), kind)
                .delete(id, false)
                .await?;
        }
        self.after_local_write(kind, id, Operation::Delete).await;
        Ok(())
    }

    pub async fn queue_items(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list(status)
            .await
    }

    pub async fn queue_item(&self, id: i64) -> Result<Option<QueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).get(id).await
    }

    pub async fn queue_counts(&self) -> Result<QueueCounts> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).counts().await
    }

    /// Reset a failed item to pending and push it if online.
    pub async fn retry(&self, id: i64) -> Result<QueueItem> {
        let item = {
            let db = self.db.lock().await;
            LibSqlQueueRepository::new(db.connection()).retry(id).await?
        };
        self.push_if_online().await;
        Ok(item)
    }

    /// Drop a failed or conflicting item without touching local state.
    pub async fn discard(&self, id: i64) -> Result<QueueItem> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .discard(id)
            .await
    }

    /// Delete synced items older than `before`.
    pub async fn prune_synced(&self, before: DateTime<Utc>) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .prune_synced(before)
            .await
    }

    /// Change-log entries for one entity, oldest first.
    pub async fn history(&self, kind: EntityKind, id: &str) -> Result<Vec<ChangeLogEntry>> {
        let db = self.db.lock().await;
        LibSqlChangeLog::new(db.connection())
            .for_entity(kind, id)
            .await
    }

    pub async fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let db = self.db.lock().await;
        LibSqlChangeLog::new(db.connection()).recent(limit).await
    }

    pub async fn last_sync(&self) -> Result<Option<String>> {
        self.service().last_sync().await
    }

    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        let report = self.drain(self.service().bootstrap()).await?;
        self.notify_all(report.changes.iter());
        Ok(report)
    }

    pub async fn pull(&self, since: &str) -> Result<PullReport> {
        let report = self.drain(self.service().pull(since)).await?;
        self.notify_all(report.changes.iter());
        Ok(report)
    }

    /// Pull from the stored watermark.
    pub async fn pull_latest(&self) -> Result<PullReport> {
        let report = self.drain(self.service().pull_latest()).await?;
        self.notify_all(report.changes.iter());
        Ok(report)
    }

    pub async fn push(&self) -> Result<PushReport> {
        self.drain(self.service().push_actions()).await
    }

    /// Bootstrap or pull, then push.
    pub async fn sync(&self) -> Result<SyncReport> {
        let report = self.drain(self.service().sync()).await?;
        self.notify_all(report.changes());
        Ok(report)
    }

    pub async fn conflicts(&self) -> Result<Vec<QueueItem>> {
        self.resolver().list_conflicts().await
    }

    pub async fn keep_local(&self, item_id: i64) -> Result<Resolution> {
        let resolution = self.resolver().keep_local(item_id).await?;
        self.notify_all(resolution.notice.iter());
        self.push_if_online().await;
        Ok(resolution)
    }

    pub async fn accept_remote(&self, item_id: i64) -> Result<Resolution> {
        let resolution = self.resolver().accept_remote(item_id).await?;
        self.notify_all(resolution.notice.iter());
        Ok(resolution)
    }

    fn service(&self) -> SyncService<'_, R> {
        SyncService::new(&self.db, &self.remote)
    }

    fn resolver(&self) -> ConflictResolver<'_, R> {
        ConflictResolver::new(&self.db, &self.remote)
    }

    async fn drain<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let _gate = self.sync_gate.lock().await;
        self.transition(SyncState::Syncing);
        let result = work.await;
        self.transition(if result.is_ok() {
            SyncState::Synced
        } else {
            SyncState::Error
        });
        result
    }

    /// Move between online states; never leaves or enters `Offline`.
    fn transition(&self, next: SyncState) {
        self.state.send_if_modified(|state| {
            if !state.is_online() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    async fn after_local_write(&self, kind: EntityKind, id: &str, operation: Operation) {
        self.notify(ChangeNotice::new(kind, id, operation, false));
        self.push_if_online().await;
    }

    async fn push_if_online(&self) {
        if !self.is_online() {
            return;
        }
        if let Err(error) = self.push().await {
            tracing::warn!(%error, "Opportunistic push failed; actions stay queued");
        }
    }

    fn notify(&self, notice: ChangeNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn notify_all<'n>(&self, notices: impl Iterator<Item = &'n ChangeNotice>) {
        for notice in notices {
            self.notify(notice.clone());
        }
    }
}

/// [`SyncCore`] operations bound to one entity kind.
pub struct EntityHandle<'a, R> {
    core: &'a SyncCore<R>,
    kind: EntityKind,
}

impl<R: RemoteAuthority> EntityHandle<'_, R> {
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    pub async fn list(&self) -> Result<Vec<Entity>> {
        self.core.list(self.kind).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Entity>> {
        self.core.get(self.kind, id).await
    }

    /// Create from field values under a fresh id
    pub async fn create(&self, fields: Map<String, Value>) -> Result<Entity> {
        self.core.create(self.kind, Entity::new(fields)).await
    }

    pub async fn update(&self, id: &str, changes: &Map<String, Value>) -> Result<Entity> {
        self.core.update(self.kind, id, changes).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.core.delete(self.kind, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::ChangeOrigin;
    use crate::sync::fake::FakeRemote;
    use crate::sync::Snapshot;
    use crate::Error;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn core() -> SyncCore<FakeRemote> {
        SyncCore::open_in_memory(FakeRemote::new()).await.unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn dated(id: &str, title: &str, updated_at: &str) -> Entity {
        Entity::from_value(json!({ "id": id, "updatedAt": updated_at, "title": title })).unwrap()
    }

    fn statuses(items: &[QueueItem]) -> Vec<QueueStatus> {
        items.iter().map(|item| item.status).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_create_then_push_syncs() {
        let core = core().await;
        let task = core
            .repository(EntityKind::Task)
            .create(fields(json!({ "title": "buy milk" })))
            .await
            .unwrap();
        assert!(core.remote().pushed().is_empty());
        assert_eq!(core.queue_counts().await.unwrap().pending, 1);

        let report = core.push().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(
            statuses(&core.queue_items(None).await.unwrap()),
            [QueueStatus::Synced]
        );
        assert_eq!(core.get(EntityKind::Task, &task.id).await.unwrap(), Some(task));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_idempotency_key_survives_transport_failure() {
        let core = core().await;
        core.create(EntityKind::Project, dated("p1", "roadmap", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();

        core.remote().set_offline(true);
        assert!(core.push().await.unwrap_err().is_transport());
        core.remote().set_offline(false);
        core.push().await.unwrap();

        let pushed = core.remote().pushed();
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[0][0].idempotency_key, pushed[1][0].idempotency_key);
        assert_eq!(core.remote().applied_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_settled_failures_are_not_resent() {
        let core = core().await;
        core.create(EntityKind::Task, dated("clash", "a", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        core.create(EntityKind::Task, dated("bad", "b", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        core.remote().set_verdict("clash", 409);
        core.remote().set_verdict("bad", 500);
        core.push().await.unwrap();

        core.create(EntityKind::Task, dated("next", "c", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        core.push().await.unwrap();

        let second = &core.remote().pushed()[1];
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].entity_id(), Some("next"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retry_resends_failed_item_with_same_key() {
        let core = core().await;
        core.create(EntityKind::Alert, dated("a1", "cpu", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        core.remote().set_verdict("a1", 503);
        core.push().await.unwrap();
        let failed = core.queue_items(Some(QueueStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);

        core.remote().set_verdict("a1", 200);
        let retried = core.retry(failed[0].id).await.unwrap();
        assert_eq!(retried.idempotency_key, failed[0].idempotency_key);
        core.push().await.unwrap();

        assert_eq!(
            statuses(&core.queue_items(None).await.unwrap()),
            [QueueStatus::Synced]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_is_last_write_wins_without_pending_work() {
        let core = core().await;
        core.remote().set_snapshot({
            let mut snapshot = Snapshot::empty("T0");
            snapshot.tasks.push(dated("t1", "local", "2024-06-01T00:00:00Z"));
            snapshot
        });
        core.bootstrap().await.unwrap();

        let mut delta = Snapshot::empty("T1");
        delta.tasks.push(dated("t1", "server", "2024-01-01T00:00:00Z"));
        core.remote().queue_delta(delta);
        core.pull_latest().await.unwrap();

        let task = core.get(EntityKind::Task, "t1").await.unwrap().unwrap();
        assert_eq!(task.field("title"), Some(&json!("server")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bootstrap_then_empty_delta_only_moves_watermark() {
        let core = core().await;
        let mut snapshot = Snapshot::empty("T0");
        snapshot.reports.push(dated("r1", "weekly", "2024-01-01T00:00:00Z"));
        core.remote().set_snapshot(snapshot);
        core.bootstrap().await.unwrap();
        let before = core.list(EntityKind::Report).await.unwrap();

        core.remote().queue_delta(Snapshot::empty("T1"));
        let report = core.pull_latest().await.unwrap();

        assert_eq!(report.applied, 0);
        assert_eq!(core.last_sync().await.unwrap().as_deref(), Some("T1"));
        assert_eq!(core.list(EntityKind::Report).await.unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_then_keep_local_advances_timestamp() {
        let core = core().await;
        let original = core
            .create(EntityKind::Post, dated("p1", "draft", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        core.remote().set_verdict("p1", 409);
        core.push().await.unwrap();

        let conflict = core.conflicts().await.unwrap().remove(0);
        let resolution = core.keep_local(conflict.id).await.unwrap();

        let items = core.queue_items(None).await.unwrap();
        assert!(items.iter().all(|item| item.id != conflict.id));
        let requeued = resolution.requeued.unwrap();
        assert_eq!(requeued.action.to_string(), "UPDATE_POST");
        assert_eq!(statuses(&items), [QueueStatus::Pending]);
        assert!(resolution.entity.unwrap().updated_at > original.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_leaves_conflicted_entity_for_keep_local() {
        let core = core().await;
        core.remote().set_snapshot({
            let mut snapshot = Snapshot::empty("T0");
            snapshot.tasks.push(dated("t1", "base", "2024-01-01T00:00:00Z"));
            snapshot
        });
        core.bootstrap().await.unwrap();
        core.update(EntityKind::Task, "t1", &fields(json!({ "title": "mine" })))
            .await
            .unwrap();
        core.remote().set_verdict("t1", 409);
        core.push().await.unwrap();

        let mut delta = Snapshot::empty("T1");
        delta.tasks.push(dated("t1", "theirs", "2030-01-01T00:00:00Z"));
        core.remote().queue_delta(delta);
        let report = core.pull_latest().await.unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(
            report.skipped.iter().map(|skip| skip.id.as_str()).collect::<Vec<_>>(),
            ["t1"]
        );
        let task = core.get(EntityKind::Task, "t1").await.unwrap().unwrap();
        assert_eq!(task.field("title"), Some(&json!("mine")));

        let conflict = core.conflicts().await.unwrap().remove(0);
        let resolution = core.keep_local(conflict.id).await.unwrap();
        assert_eq!(resolution.requeued.unwrap().payload["title"], "mine");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_going_online_drains_and_later_writes_push() {
        let core = core().await;
        let tasks = core.repository(EntityKind::Task);
        tasks.create(fields(json!({ "title": "offline" }))).await.unwrap();
        assert_eq!(core.state(), SyncState::Offline);

        let report = core.set_online(true).await.unwrap().unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(core.state(), SyncState::Synced);
        assert_eq!(core.set_online(true).await.unwrap(), None);

        tasks.create(fields(json!({ "title": "online" }))).await.unwrap();
        assert_eq!(core.remote().pushed().len(), 2);
        assert_eq!(core.queue_counts().await.unwrap().synced, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_opportunistic_push_is_not_returned() {
        let core = core().await;
        core.set_online(true).await.unwrap();
        core.remote().set_offline(true);

        let task = core
            .repository(EntityKind::Task)
            .create(fields(json!({ "title": "still saved" })))
            .await
            .unwrap();
        assert_eq!(core.state(), SyncState::Error);
        assert!(core.get(EntityKind::Task, &task.id).await.unwrap().is_some());
        assert_eq!(core.queue_counts().await.unwrap().pending, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_notices_follow_committed_writes() {
        let core = core().await;
        let mut notices = core.subscribe();

        core.create(EntityKind::Task, dated("t1", "a", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        let missing = core.delete(EntityKind::Task, "ghost").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        core.delete(EntityKind::Task, "t1").await.unwrap();

        let first = notices.recv().await.unwrap();
        assert_eq!(first.operation, Operation::Create);
        assert_eq!(first.origin, ChangeOrigin::Local);
        let second = notices.recv().await.unwrap();
        assert_eq!(second.operation, Operation::Delete);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reopen_keeps_queue_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mooring.db");

        let core = SyncCore::open(&path, FakeRemote::new()).await.unwrap();
        core.create(EntityKind::Task, dated("t1", "durable", "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        core.close().await.unwrap();

        let reopened = SyncCore::open(&path, FakeRemote::new()).await.unwrap();
        assert!(reopened.get(EntityKind::Task, "t1").await.unwrap().is_some());
        assert_eq!(reopened.queue_counts().await.unwrap().pending, 1);
        assert_eq!(
            reopened.history(EntityKind::Task, "t1").await.unwrap().len(),
            1
        );
    }
}
