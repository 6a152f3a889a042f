//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: entities and delete tombstones
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- One row per entity; business fields live in `data` as JSON
        CREATE TABLE IF NOT EXISTS entities (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            user_id TEXT,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_favorite INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            data TEXT NOT NULL,
            sync_status TEXT NOT NULL,
            sync_hash TEXT,
            last_synced_at INTEGER,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            next_retry_at INTEGER,
            last_error TEXT,
            revision INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (kind, id)
        );
        CREATE INDEX IF NOT EXISTS idx_entities_kind_updated ON entities(kind, updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_entities_kind_status ON entities(kind, sync_status);

        CREATE TABLE IF NOT EXISTS tombstones (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            user_id TEXT,
            deleted_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_retry_at INTEGER,
            last_error TEXT,
            PRIMARY KEY (kind, id)
        );

        INSERT INTO schema_version (version) VALUES (1);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated local store to version 1");
    Ok(())
}

/// Migration to version 2: pull high-water marks and LWW conflict log
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_marks (
            kind TEXT PRIMARY KEY,
            high_water_mark INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            local_updated_at INTEGER NOT NULL,
            incoming_updated_at INTEGER NOT NULL,
            winner TEXT NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity ON sync_conflicts(kind, entity_id);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC);

        INSERT INTO schema_version (version) VALUES (2);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated local store to version {CURRENT_VERSION}");
    Ok(())
}
