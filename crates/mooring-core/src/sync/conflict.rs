//! Operator-driven resolution of `conflict` queue items.

use libsql::Connection;
use tokio::sync::Mutex;

use crate::apply::{reassert_changes, ChangeNotice};
use crate::db::{
    begin_write, finish_write, Database, LibSqlEntityRepository, LibSqlQueueRepository,
    QueueRepository,
};
use crate::error::{Error, Result};
use crate::models::{Entity, Operation, QueueItem, QueueStatus};

use super::remote::RemoteAuthority;

/// What resolving a conflict changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The conflict item, as it was before removal
    pub resolved: QueueItem,
    /// Fresh mutation queued by keep-local
    pub requeued: Option<QueueItem>,
    /// Local copy after resolution, if the entity still exists
    pub entity: Option<Entity>,
    pub notice: Option<ChangeNotice>,
}

pub struct ConflictResolver<'a, R> {
    store: &'a Mutex<Database>,
    remote: &'a R,
}

impl<'a, R: RemoteAuthority> ConflictResolver<'a, R> {
    pub const fn new(store: &'a Mutex<Database>, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Items the remote rejected with a version conflict, oldest first
    pub async fn list_conflicts(&self) -> Result<Vec<QueueItem>> {
        let db = self.store.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list(Some(QueueStatus::Conflict))
            .await
    }

    /// Drop the conflict and queue a fresh mutation re-asserting local state.
    pub async fn keep_local(&self, item_id: i64) -> Result<Resolution> {
        let db = self.store.lock().await;
        let conn = db.connection();
        begin_write(conn).await?;
        let result = keep_local_in_tx(conn, item_id).await;
        let resolution = finish_write(conn, result).await?;

        tracing::info!(
            queue_id = item_id,
            action = %resolution.resolved.action,
            "Conflict resolved in favour of local state"
        );
        Ok(resolution)
    }

    /// Drop the conflict and overwrite the local copy with the server's.
    pub async fn accept_remote(&self, item_id: i64) -> Result<Resolution> {
        let item = {
            let db = self.store.lock().await;
            require_conflict(db.connection(), item_id).await?
        };
        let entity_id = conflict_entity_id(&item)?;
        let server = self
            .remote
            .fetch_entity(item.action.kind, &entity_id)
            .await?;

        let db = self.store.lock().await;
        let conn = db.connection();
        begin_write(conn).await?;
        let result = accept_remote_in_tx(conn, item_id, &entity_id, server).await;
        let resolution = finish_write(conn, result).await?;

        tracing::info!(
            queue_id = item_id,
            action = %resolution.resolved.action,
            deleted_remotely = resolution.entity.is_none(),
            "Conflict resolved in favour of remote state"
        );
        Ok(resolution)
    }
}

async fn keep_local_in_tx(conn: &Connection, item_id: i64) -> Result<Resolution> {
    let item = require_conflict(conn, item_id).await?;
    let kind = item.action.kind;
    let entity_id = conflict_entity_id(&item)?;
    LibSqlQueueRepository::new(conn).remove_in_tx(item.id).await?;
    let repo = LibSqlEntityRepository::new(conn, kind);

    if item.action.operation == Operation::Delete {
        let requeued = repo.reissue_delete_in_tx(&entity_id).await?;
        return Ok(Resolution {
            resolved: item,
            requeued: Some(requeued),
            entity: None,
            notice: None,
        });
    }

    let local = repo
        .load(&entity_id)
        .await?
        .ok_or_else(|| Error::not_found(kind, entity_id.clone()))?;
    let changes = reassert_changes(item.action.operation, &item.payload, &local);
    let outcome = repo.update_in_tx(&entity_id, &changes, false).await?;

    Ok(Resolution {
        notice: Some(ChangeNotice::new(kind, entity_id, Operation::Update, false)),
        resolved: item,
        requeued: outcome.queued,
        entity: outcome.entity,
    })
}

async fn accept_remote_in_tx(
    conn: &Connection,
    item_id: i64,
    entity_id: &str,
    server: Option<Entity>,
) -> Result<Resolution> {
    // Re-check: the item may have been discarded while the fetch was in flight
    let item = require_conflict(conn, item_id).await?;
    let kind = item.action.kind;
    LibSqlQueueRepository::new(conn).remove_in_tx(item.id).await?;
    let repo = LibSqlEntityRepository::new(conn, kind);

    let notice = match &server {
        Some(entity) => {
            let operation = repo.put_synced_in_tx(entity).await?;
            Some(ChangeNotice::new(kind, entity_id, operation, true))
        }
        None => repo
            .remove_synced_in_tx(entity_id)
            .await?
            .then(|| ChangeNotice::new(kind, entity_id, Operation::Delete, true)),
    };

    Ok(Resolution {
        resolved: item,
        requeued: None,
        entity: server,
        notice,
    })
}

async fn require_conflict(conn: &Connection, item_id: i64) -> Result<QueueItem> {
    let item = LibSqlQueueRepository::new(conn)
        .get(item_id)
        .await?
        .ok_or(Error::QueueItemNotFound(item_id))?;
    if item.status != QueueStatus::Conflict {
        return Err(Error::InvalidState(format!(
            "queue item {item_id} is {}, not conflict",
            item.status
        )));
    }
    Ok(item)
}

fn conflict_entity_id(item: &QueueItem) -> Result<String> {
    item.entity_id().map(str::to_string).ok_or_else(|| {
        Error::InvalidState(format!("queue item {} has no entity id", item.id))
    })
}
