//! Sync queue repository implementation

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Value};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ActionType, EntityKind, QueueCounts, QueueItem, QueueStatus};
use crate::util::{from_millis, now_millis};

use super::connection::{begin_write, finish_write};

const QUEUE_COLUMNS: &str =
    "id, action_type, payload, idempotency_key, status, result, error, created_at";

/// Trait for sync queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append a `pending` item with a freshly minted idempotency key
    async fn enqueue(&self, action: ActionType, payload: Json) -> Result<QueueItem>;

    /// Get an item by local id
    async fn get(&self, id: i64) -> Result<Option<QueueItem>>;

    /// List items in push order, optionally filtered by status
    async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>>;

    /// Record the remote verdict for a `pending` item.
    ///
    /// Returns `false` when no pending item carries `idempotency_key`.
    async fn complete(
        &self,
        idempotency_key: &Uuid,
        status: QueueStatus,
        result: Option<&Json>,
        error: Option<&str>,
    ) -> Result<bool>;

    /// Move a `failed` item back to `pending`, keeping its idempotency key
    async fn retry(&self, id: i64) -> Result<QueueItem>;

    /// Delete a `failed` or `conflict` item
    async fn discard(&self, id: i64) -> Result<QueueItem>;

    /// Tally items by status
    async fn counts(&self) -> Result<QueueCounts>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Pending items in push order
    pub async fn pending(&self) -> Result<Vec<QueueItem>> {
        self.list(Some(QueueStatus::Pending)).await
    }

    /// Ids of `kind` entities with local intent not yet settled: at least one
    /// `pending` or `conflict` item
    pub async fn unresolved_entity_ids(&self, kind: EntityKind) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT entity_id FROM sync_queue
                 WHERE entity_type = ? AND status IN ('pending', 'conflict')",
                [kind.as_str()],
            )
            .await?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// Pending items for one entity, in push order
    pub async fn pending_for_entity(&self, kind: EntityKind, id: &str) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue
             WHERE entity_type = ? AND entity_id = ? AND status = 'pending'
             ORDER BY created_at ASC, id ASC"
        );
        let mut rows = self.conn.query(&sql, [kind.as_str(), id]).await?;
        collect_items(&mut rows).await
    }

    /// Delete `synced` items completed before `before`. Returns the number removed.
    pub async fn prune_synced(&self, before: DateTime<Utc>) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE status = 'synced' AND updated_at < ?",
                [before.timestamp_millis()],
            )
            .await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned synced queue items");
        }
        Ok(removed)
    }

    /// Insert without opening a transaction (caller owns it)
    pub(crate) async fn enqueue_in_tx(&self, action: ActionType, payload: Json) -> Result<QueueItem> {
        let entity_id = payload
            .get("id")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::InvalidInput("queue payload must carry an id".to_string()))?
            .to_string();
        let idempotency_key = Uuid::new_v4();
        let created_at = now_millis();
        let serialized = serde_json::to_string(&payload)?;

        self.conn
            .execute(
                "INSERT INTO sync_queue (
                    action_type, entity_type, entity_id, payload, idempotency_key,
                    status, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
                libsql::params![
                    action.to_string(),
                    action.kind.as_str(),
                    entity_id.as_str(),
                    serialized,
                    idempotency_key.to_string(),
                    created_at.timestamp_millis(),
                    created_at.timestamp_millis()
                ],
            )
            .await?;

        let id = self.conn.last_insert_rowid();
        tracing::debug!(
            queue_id = id,
            action = %action,
            entity_id = %entity_id,
            idempotency_key = %idempotency_key,
            "Queued mutation"
        );

        Ok(QueueItem {
            id,
            action,
            payload,
            idempotency_key,
            status: QueueStatus::Pending,
            result: None,
            error: None,
            created_at,
        })
    }

    /// Delete an item without opening a transaction (caller owns it)
    pub(crate) async fn remove_in_tx(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(rows > 0)
    }

    async fn require(&self, id: i64) -> Result<QueueItem> {
        self.get(id).await?.ok_or(Error::QueueItemNotFound(id))
    }

    /// Parse a queue item from a database row
    fn parse_item(row: &Row) -> Result<QueueItem> {
        let action: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let key: String = row.get(3)?;
        let status: String = row.get(4)?;
        let result = optional_text(row, 5)?
            .map(|raw| serde_json::from_str::<Json>(&raw))
            .transpose()?;

        Ok(QueueItem {
            id: row.get(0)?,
            action: action.parse()?,
            payload: serde_json::from_str(&payload)?,
            idempotency_key: key
                .parse()
                .map_err(|_| Error::Database(format!("invalid idempotency key '{key}'")))?,
            status: status.parse()?,
            result,
            error: optional_text(row, 6)?,
            created_at: from_millis(row.get(7)?),
        })
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn enqueue(&self, action: ActionType, payload: Json) -> Result<QueueItem> {
        begin_write(self.conn).await?;
        let result = self.enqueue_in_tx(action, payload).await;
        finish_write(self.conn, result).await
    }

    async fn get(&self, id: i64) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?");
        let mut rows = self.conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>> {
        let mut rows = if let Some(status) = status {
            let sql = format!(
                "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE status = ? ORDER BY created_at ASC, id ASC"
            );
            self.conn.query(&sql, [status.as_str()]).await?
        } else {
            let sql =
                format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY created_at ASC, id ASC");
            self.conn.query(&sql, ()).await?
        };
        collect_items(&mut rows).await
    }

    async fn complete(
        &self,
        idempotency_key: &Uuid,
        status: QueueStatus,
        result: Option<&Json>,
        error: Option<&str>,
    ) -> Result<bool> {
        let result = result.map(serde_json::to_string).transpose()?;
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = ?, result = ?, error = ?, updated_at = ?
                 WHERE idempotency_key = ? AND status = 'pending'",
                libsql::params![
                    status.as_str(),
                    text_or_null(result),
                    text_or_null(error.map(str::to_string)),
                    Utc::now().timestamp_millis(),
                    idempotency_key.to_string()
                ],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn retry(&self, id: i64) -> Result<QueueItem> {
        let item = self.require(id).await?;
        if item.status != QueueStatus::Failed {
            return Err(Error::InvalidState(format!(
                "queue item {id} is {}; only failed items can be retried",
                item.status
            )));
        }

        self.conn
            .execute(
                "UPDATE sync_queue SET status = 'pending', result = NULL, error = NULL, updated_at = ?
                 WHERE id = ? AND status = 'failed'",
                libsql::params![Utc::now().timestamp_millis(), id],
            )
            .await?;
        tracing::info!(queue_id = id, idempotency_key = %item.idempotency_key, "Queue item reset to pending");

        self.require(id).await
    }

    async fn discard(&self, id: i64) -> Result<QueueItem> {
        let item = self.require(id).await?;
        if !matches!(item.status, QueueStatus::Failed | QueueStatus::Conflict) {
            return Err(Error::InvalidState(format!(
                "queue item {id} is {}; only failed or conflicting items can be discarded",
                item.status
            )));
        }

        self.remove_in_tx(id).await?;
        tracing::info!(queue_id = id, action = %item.action, "Discarded queue item");
        Ok(item)
    }

    async fn counts(&self) -> Result<QueueCounts> {
        let mut rows = self
            .conn
            .query("SELECT status, COUNT(*) FROM sync_queue GROUP BY status", ())
            .await?;

        let mut counts = QueueCounts::default();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count = usize::try_from(row.get::<i64>(1)?).unwrap_or_default();
            match status.parse()? {
                QueueStatus::Pending => counts.pending = count,
                QueueStatus::Synced => counts.synced = count,
                QueueStatus::Conflict => counts.conflict = count,
                QueueStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

async fn collect_items(rows: &mut libsql::Rows) -> Result<Vec<QueueItem>> {
    let mut items = Vec::new();
    while let Some(row) = rows.next().await? {
        items.push(LibSqlQueueRepository::parse_item(&row)?);
    }
    Ok(items)
}

pub(crate) fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Text(text) => Ok(Some(text)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "unexpected value in column {idx}: {other:?}"
        ))),
    }
}

pub(crate) fn text_or_null(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Operation;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn create_task() -> ActionType {
        ActionType::new(Operation::Create, EntityKind::Task)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_and_get() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let item = repo
            .enqueue(create_task(), json!({ "id": "t1", "title": "a" }))
            .await
            .unwrap();
        assert_eq!(item.status, QueueStatus::Pending);

        let fetched = repo.get(item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_requires_entity_id() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let error = repo.enqueue(create_task(), json!({ "title": "a" })).await;
        assert!(matches!(error, Err(Error::InvalidInput(_))));
        assert!(repo.list(None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_keeps_enqueue_order() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        for id in ["t1", "t2", "t3"] {
            repo.enqueue(create_task(), json!({ "id": id })).await.unwrap();
        }

        let ids = repo
            .pending()
            .await
            .unwrap()
            .iter()
            .map(|item| item.entity_id().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["t1", "t2", "t3"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_complete_only_touches_pending_items() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let item = repo.enqueue(create_task(), json!({ "id": "t1" })).await.unwrap();

        let body = json!({ "ok": true });
        assert!(repo
            .complete(&item.idempotency_key, QueueStatus::Synced, Some(&body), None)
            .await
            .unwrap());
        // A second verdict for the same key is ignored
        assert!(!repo
            .complete(&item.idempotency_key, QueueStatus::Failed, None, Some("late"))
            .await
            .unwrap());

        let stored = repo.get(item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Synced);
        assert_eq!(stored.result, Some(body));
        assert_eq!(stored.error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retry_keeps_idempotency_key() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let item = repo.enqueue(create_task(), json!({ "id": "t1" })).await.unwrap();
        repo.complete(&item.idempotency_key, QueueStatus::Failed, None, Some("boom"))
            .await
            .unwrap();

        let retried = repo.retry(item.id).await.unwrap();
        assert_eq!(retried.status, QueueStatus::Pending);
        assert_eq!(retried.idempotency_key, item.idempotency_key);
        assert_eq!(retried.error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retry_refuses_conflicts() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let item = repo.enqueue(create_task(), json!({ "id": "t1" })).await.unwrap();
        repo.complete(&item.idempotency_key, QueueStatus::Conflict, None, Some("409"))
            .await
            .unwrap();

        assert!(matches!(
            repo.retry(item.id).await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            repo.retry(9999).await,
            Err(Error::QueueItemNotFound(9999))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_discard_only_terminal_failures() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let pending = repo.enqueue(create_task(), json!({ "id": "t1" })).await.unwrap();
        let failed = repo.enqueue(create_task(), json!({ "id": "t2" })).await.unwrap();
        repo.complete(&failed.idempotency_key, QueueStatus::Failed, None, Some("400"))
            .await
            .unwrap();

        assert!(repo.discard(pending.id).await.is_err());
        repo.discard(failed.id).await.unwrap();
        assert!(repo.get(failed.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_counts_and_unresolved_ids() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let first = repo.enqueue(create_task(), json!({ "id": "t1" })).await.unwrap();
        repo.enqueue(create_task(), json!({ "id": "t2" })).await.unwrap();
        let rejected = repo.enqueue(create_task(), json!({ "id": "t3" })).await.unwrap();
        let failed = repo.enqueue(create_task(), json!({ "id": "t4" })).await.unwrap();
        repo.complete(&rejected.idempotency_key, QueueStatus::Conflict, None, None)
            .await
            .unwrap();
        repo.complete(&failed.idempotency_key, QueueStatus::Failed, None, None)
            .await
            .unwrap();
        repo.enqueue(
            ActionType::new(Operation::Create, EntityKind::Post),
            json!({ "id": "p1" }),
        )
        .await
        .unwrap();
        repo.complete(&first.idempotency_key, QueueStatus::Synced, None, None)
            .await
            .unwrap();

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.synced, 1);
        assert_eq!(counts.conflict, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.outstanding(), 4);

        let ids = repo.unresolved_entity_ids(EntityKind::Task).await.unwrap();
        assert_eq!(ids, HashSet::from(["t2".to_string(), "t3".to_string()]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prune_synced_keeps_other_states() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let synced = repo.enqueue(create_task(), json!({ "id": "t1" })).await.unwrap();
        repo.enqueue(create_task(), json!({ "id": "t2" })).await.unwrap();
        repo.complete(&synced.idempotency_key, QueueStatus::Synced, None, None)
            .await
            .unwrap();

        let removed = repo
            .prune_synced(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.list(None).await.unwrap().len(), 1);
    }
}
