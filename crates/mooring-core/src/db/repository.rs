//! Entity repository implementation

use std::collections::HashSet;

use chrono::SecondsFormat;
use libsql::{Connection, Row};
use serde_json::{Map, Value};

use crate::apply::{delete_payload, merge_changes, reissued_delete_payload, update_payload};
use crate::error::{Error, Result};
use crate::models::{ActionType, Entity, EntityKind, Operation, QueueItem};
use crate::util::now_millis;

use super::change_log::LibSqlChangeLog;
use super::connection::{begin_write, finish_write};
use super::queue_repository::LibSqlQueueRepository;

/// Trait for entity storage operations (async)
///
/// Every write pairs the entity change with one change-log entry and, unless
/// `syncd` is set, one queue item, all in the same transaction.
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// All entities of this kind, most recently updated first
    async fn get_all(&self) -> Result<Vec<Entity>>;

    /// Get an entity by id
    async fn get_by_id(&self, id: &str) -> Result<Option<Entity>>;

    /// Store a new entity
    async fn create(&self, entity: &Entity, syncd: bool) -> Result<Entity>;

    /// Merge `changes` into an existing entity and stamp `updatedAt`
    async fn update(&self, id: &str, changes: &Map<String, Value>, syncd: bool) -> Result<Entity>;

    /// Remove an entity
    async fn delete(&self, id: &str, syncd: bool) -> Result<()>;
}

/// libSQL implementation of `EntityRepository`, one per entity kind
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
    kind: EntityKind,
}

/// What a write did, for callers composing several writes in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub entity: Option<Entity>,
    pub queued: Option<QueueItem>,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository for `kind` with the given connection
    pub const fn new(conn: &'a Connection, kind: EntityKind) -> Self {
        Self { conn, kind }
    }

    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Number of stored entities
    pub async fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table());
        let mut rows = self.conn.query(&sql, ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Upsert server state by id without queueing
    pub async fn put_synced(&self, entity: &Entity) -> Result<Entity> {
        begin_write(self.conn).await?;
        let result = self.put_synced_in_tx(entity).await;
        finish_write(self.conn, result).await?;
        Ok(entity.clone())
    }

    /// Replace the whole table with `entities` without queueing (bootstrap)
    pub async fn replace_all_synced(&self, entities: &[Entity]) -> Result<usize> {
        begin_write(self.conn).await?;
        let result = self.replace_all_in_tx(entities).await;
        finish_write(self.conn, result).await?;
        Ok(entities.len())
    }

    pub(crate) async fn create_in_tx(&self, entity: &Entity, syncd: bool) -> Result<WriteOutcome> {
        if self.exists(&entity.id).await? {
            return Err(Error::InvalidInput(format!(
                "{} {} already exists",
                self.kind, entity.id
            )));
        }

        self.write_row(entity).await?;
        let queued = if syncd {
            None
        } else {
            Some(
                self.queue()
                    .enqueue_in_tx(
                        ActionType::new(Operation::Create, self.kind),
                        entity.to_value()?,
                    )
                    .await?,
            )
        };
        self.log(&entity.id, Operation::Create).await?;

        Ok(WriteOutcome {
            entity: Some(entity.clone()),
            queued,
        })
    }

    pub(crate) async fn update_in_tx(
        &self,
        id: &str,
        changes: &Map<String, Value>,
        syncd: bool,
    ) -> Result<WriteOutcome> {
        let existing = self
            .load(id)
            .await?
            .ok_or_else(|| Error::not_found(self.kind, id))?;

        let now = now_millis();
        let merged = merge_changes(&existing, changes, now);
        self.write_row(&merged).await?;

        let queued = if syncd {
            None
        } else {
            Some(
                self.queue()
                    .enqueue_in_tx(
                        ActionType::new(Operation::Update, self.kind),
                        update_payload(id, changes, now),
                    )
                    .await?,
            )
        };
        self.log(id, Operation::Update).await?;

        Ok(WriteOutcome {
            entity: Some(merged),
            queued,
        })
    }

    pub(crate) async fn delete_in_tx(&self, id: &str, syncd: bool) -> Result<WriteOutcome> {
        if !self.remove_row(id).await? {
            return Err(Error::not_found(self.kind, id));
        }

        let queued = if syncd {
            None
        } else {
            Some(self.enqueue_delete_in_tx(id).await?)
        };
        self.log(id, Operation::Delete).await?;

        Ok(WriteOutcome {
            entity: None,
            queued,
        })
    }

    /// Queue a delete for an id that may already be gone locally
    pub(crate) async fn enqueue_delete_in_tx(&self, id: &str) -> Result<QueueItem> {
        self.queue()
            .enqueue_in_tx(
                ActionType::new(Operation::Delete, self.kind),
                delete_payload(id),
            )
            .await
    }

    /// Queue a delete stamped with a fresh `updatedAt`
    pub(crate) async fn reissue_delete_in_tx(&self, id: &str) -> Result<QueueItem> {
        self.queue()
            .enqueue_in_tx(
                ActionType::new(Operation::Delete, self.kind),
                reissued_delete_payload(id, now_millis()),
            )
            .await
    }

    /// Upsert server state; returns whether the row was created or replaced
    pub(crate) async fn put_synced_in_tx(&self, entity: &Entity) -> Result<Operation> {
        let operation = if self.exists(&entity.id).await? {
            Operation::Update
        } else {
            Operation::Create
        };
        self.write_row(entity).await?;
        self.log(&entity.id, operation).await?;
        Ok(operation)
    }

    /// Remove server-deleted state without queueing. Missing ids are a no-op.
    pub(crate) async fn remove_synced_in_tx(&self, id: &str) -> Result<bool> {
        let removed = self.remove_row(id).await?;
        if removed {
            self.log(id, Operation::Delete).await?;
        }
        Ok(removed)
    }

    /// Swap the table contents for `entities`; returns the ids that were
    /// dropped because the new set no longer carries them.
    pub(crate) async fn replace_all_in_tx(&self, entities: &[Entity]) -> Result<Vec<String>> {
        let mut previous = self.ids().await?;
        let sql = format!("DELETE FROM {}", self.table());
        self.conn.execute(&sql, ()).await?;
        for entity in entities {
            self.write_row(entity).await?;
            self.log(&entity.id, Operation::Create).await?;
            previous.remove(&entity.id);
        }

        let mut removed = previous.into_iter().collect::<Vec<_>>();
        removed.sort();
        for id in &removed {
            self.log(id, Operation::Delete).await?;
        }
        Ok(removed)
    }

    async fn ids(&self) -> Result<HashSet<String>> {
        let sql = format!("SELECT id FROM {}", self.table());
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    pub(crate) async fn load(&self, id: &str) -> Result<Option<Entity>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?", self.table());
        let mut rows = self.conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entity(&row)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", self.table());
        let mut rows = self.conn.query(&sql, [id]).await?;
        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }

    async fn write_row(&self, entity: &Entity) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, data, updated_at) VALUES (?, ?, ?)",
            self.table()
        );
        self.conn
            .execute(
                &sql,
                libsql::params![
                    entity.id.as_str(),
                    serde_json::to_string(entity)?,
                    entity.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove_row(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table());
        let rows = self.conn.execute(&sql, [id]).await?;
        Ok(rows > 0)
    }

    async fn log(&self, id: &str, operation: Operation) -> Result<()> {
        LibSqlChangeLog::new(self.conn)
            .append(self.kind, id, operation)
            .await
    }

    const fn queue(&self) -> LibSqlQueueRepository<'a> {
        LibSqlQueueRepository::new(self.conn)
    }

    const fn table(&self) -> &'static str {
        self.kind.collection()
    }

    /// Parse an entity from a database row
    fn parse_entity(row: &Row) -> Result<Entity> {
        let data: String = row.get(0)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn get_all(&self) -> Result<Vec<Entity>> {
        let sql = format!(
            "SELECT data FROM {} ORDER BY updated_at DESC, id ASC",
            self.table()
        );
        let mut rows = self.conn.query(&sql, ()).await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(Self::parse_entity(&row)?);
        }
        Ok(entities)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Entity>> {
        self.load(id).await
    }

    async fn create(&self, entity: &Entity, syncd: bool) -> Result<Entity> {
        begin_write(self.conn).await?;
        let result = self.create_in_tx(entity, syncd).await;
        let outcome = finish_write(self.conn, result).await?;
        outcome
            .entity
            .ok_or_else(|| Error::not_found(self.kind, entity.id.clone()))
    }

    async fn update(&self, id: &str, changes: &Map<String, Value>, syncd: bool) -> Result<Entity> {
        begin_write(self.conn).await?;
        let result = self.update_in_tx(id, changes, syncd).await;
        let outcome = finish_write(self.conn, result).await?;
        outcome.entity.ok_or_else(|| Error::not_found(self.kind, id))
    }

    async fn delete(&self, id: &str, syncd: bool) -> Result<()> {
        begin_write(self.conn).await?;
        let result = self.delete_in_tx(id, syncd).await;
        finish_write(self.conn, result).await?;
        Ok(())
    }
}
