//! Sync-state repository implementation

use libsql::Connection;

use crate::error::Result;
use crate::models::{SyncScope, SyncStateRecord};
use crate::util::now_millis;

/// libSQL access to the `sync_state` table
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load the record for `scope`, if the scope was ever synced
    pub async fn get(&self, scope: SyncScope) -> Result<Option<SyncStateRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT scope, last_sync FROM sync_state WHERE scope = ?",
                [scope.key()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(SyncStateRecord {
                scope: row.get(0)?,
                last_sync: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    /// Watermark for `scope`
    pub async fn last_sync(&self, scope: SyncScope) -> Result<Option<String>> {
        Ok(self.get(scope).await?.map(|record| record.last_sync))
    }

    /// Create or overwrite the record for `scope`
    pub(crate) async fn set(&self, scope: SyncScope, last_sync: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_state (scope, last_sync, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(scope) DO UPDATE SET
                     last_sync = excluded.last_sync,
                     updated_at = excluded.updated_at",
                libsql::params![scope.key(), last_sync, now_millis().timestamp_millis()],
            )
            .await?;
        Ok(())
    }
}
