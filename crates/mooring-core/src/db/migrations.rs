//! Database migrations

use crate::error::Result;
use crate::models::EntityKind;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;
    if version >= CURRENT_VERSION {
        return Ok(());
    }

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    tracing::info!(from = version, to = CURRENT_VERSION, "Migrated local store schema");
    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute `statements` in one transaction, rolling back on the first failure.
async fn apply(conn: &Connection, version: i32, statements: &[String]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt.as_str(), ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [i64::from(version)])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: entity tables plus queue, change log and sync state
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let mut statements = vec![
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )"
        .to_string(),
    ];

    // One key-value table per registered entity kind
    for kind in EntityKind::ALL {
        let table = kind.collection();
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table}(updated_at DESC)"
        ));
    }

    statements.extend(
        [
            // Pending-operation queue
            "CREATE TABLE IF NOT EXISTS sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                idempotency_key TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                result TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status, created_at, id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_entity ON sync_queue(entity_type, entity_id, status)",
            // Append-only change log
            "CREATE TABLE IF NOT EXISTS change_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                operation TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_change_log_entity ON change_log(entity_type, entity_id)",
            // Last-synced markers
            "CREATE TABLE IF NOT EXISTS sync_state (
                scope TEXT PRIMARY KEY,
                last_sync TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        ]
        .map(str::to_string),
    );

    apply(conn, 1, &statements).await
}

/// Migration to version 2: reject edits to change-log rows
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TRIGGER IF NOT EXISTS change_log_no_update BEFORE UPDATE ON change_log
         BEGIN
             SELECT RAISE(ABORT, 'change_log is append-only');
         END",
        "CREATE TRIGGER IF NOT EXISTS change_log_no_delete BEFORE DELETE ON change_log
         BEGIN
             SELECT RAISE(ABORT, 'change_log is append-only');
         END",
    ]
    .map(str::to_string);

    apply(conn, 2, &statements).await
}
