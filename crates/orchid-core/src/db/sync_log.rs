//! Pull high-water marks and the conflict log

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::models::{ConflictWinner, EntityId, SyncConflict};

use super::local_store::LocalStore;

/// Conflict about to be written to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConflict<'a> {
    pub table: &'a str,
    pub entity_id: EntityId,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub winner: ConflictWinner,
    pub resolved_at: i64,
}

impl LocalStore {
    /// Largest remote `updated_at` pulled for a table.
    pub fn high_water_mark(&self, table: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let mark = conn
                .query_row(
                    "SELECT high_water_mark FROM sync_marks WHERE kind = ?",
                    params![table],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(mark)
        })
    }

    /// Advance a table's high-water mark; never moves it backwards.
    pub fn advance_high_water_mark(&self, table: &str, mark: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_marks (kind, high_water_mark) VALUES (?, ?)
                 ON CONFLICT(kind) DO UPDATE
                 SET high_water_mark = MAX(high_water_mark, excluded.high_water_mark)",
                params![table, mark],
            )?;
            Ok(())
        })
    }

    /// Append a resolved last-writer-wins conflict to the log.
    pub fn record_conflict(&self, conflict: &NewConflict<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sync_conflicts (
                    kind, entity_id, local_updated_at, incoming_updated_at,
                    winner, resolved_at, strategy
                 ) VALUES (?, ?, ?, ?, ?, ?, 'lww')",
                params![
                    conflict.table,
                    conflict.entity_id.as_str(),
                    conflict.local_updated_at,
                    conflict.incoming_updated_at,
                    conflict.winner.as_str(),
                    conflict.resolved_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Keep only the `keep` most recently resolved conflicts. Returns rows removed.
    pub fn prune_conflicts(&self, keep: usize) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sync_conflicts WHERE id NOT IN (
                    SELECT id FROM sync_conflicts
                    ORDER BY resolved_at DESC, id DESC
                    LIMIT ?
                 )",
                params![keep as i64],
            )?;
            Ok(removed)
        })
    }

    /// Most recently resolved conflicts, newest first, optionally for one table.
    pub fn list_conflicts(&self, table: Option<&str>, limit: usize) -> Result<Vec<SyncConflict>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, entity_id, local_updated_at, incoming_updated_at,
                        winner, resolved_at, strategy
                 FROM sync_conflicts
                 WHERE ?1 IS NULL OR kind = ?1
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let conflicts = stmt
                .query_map(params![table, limit as i64], |row| {
                    let winner: String = row.get(5)?;
                    Ok(SyncConflict {
                        id: row.get(0)?,
                        table: row.get(1)?,
                        entity_id: row.get(2)?,
                        local_updated_at: row.get(3)?,
                        incoming_updated_at: row.get(4)?,
                        winner: winner.parse().map_err(|error| {
                            rusqlite::Error::FromSqlConversionFailure(
                                5,
                                rusqlite::types::Type::Text,
                                Box::new(error),
                            )
                        })?,
                        resolved_at: row.get(6)?,
                        strategy: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(conflicts)
        })
    }
}
