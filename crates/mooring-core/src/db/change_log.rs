//! Change-log storage

use libsql::{Connection, Row};

use crate::error::Result;
use crate::models::{ChangeLogEntry, EntityKind, Operation};
use crate::util::{from_millis, now_millis};

/// Append-only access to the `change_log` table
pub struct LibSqlChangeLog<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlChangeLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append one entry. Runs inside whatever transaction the caller holds.
    pub(crate) async fn append(
        &self,
        kind: EntityKind,
        entity_id: &str,
        operation: Operation,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO change_log (entity_id, entity_type, operation, timestamp)
                 VALUES (?, ?, ?, ?)",
                libsql::params![
                    entity_id,
                    kind.as_str(),
                    operation.as_str(),
                    now_millis().timestamp_millis()
                ],
            )
            .await?;
        Ok(())
    }

    /// History of one entity, oldest first
    pub async fn for_entity(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_id, entity_type, operation, timestamp FROM change_log
                 WHERE entity_type = ? AND entity_id = ?
                 ORDER BY id ASC",
                [kind.as_str(), entity_id],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Most recent entries across all entities, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_id, entity_type, operation, timestamp FROM change_log
                 ORDER BY id DESC
                 LIMIT ?",
                [limit],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    fn parse_entry(row: &Row) -> Result<ChangeLogEntry> {
        let entity_type: String = row.get(2)?;
        let operation: String = row.get(3)?;
        Ok(ChangeLogEntry {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            entity_type: entity_type.parse()?,
            operation: operation.parse()?,
            timestamp: from_millis(row.get(4)?),
        })
    }
}
