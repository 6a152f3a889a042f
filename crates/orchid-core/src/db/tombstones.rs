//! Pending remote deletes

use std::collections::HashSet;

use rusqlite::params;

use crate::error::Result;
use crate::models::EntityId;

use super::local_store::LocalStore;

/// A local deletion waiting for remote acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub table: String,
    pub id: EntityId,
    pub user_id: Option<String>,
    /// Local deletion time (Unix ms)
    pub deleted_at: i64,
    pub attempts: u32,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
}

impl LocalStore {
    /// Tombstones of one table, oldest first.
    pub fn tombstones(&self, table: &str) -> Result<Vec<Tombstone>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, id, user_id, deleted_at, attempts, next_retry_at, last_error
                 FROM tombstones WHERE kind = ? ORDER BY deleted_at ASC",
            )?;
            let rows = stmt
                .query_map(params![table], |row| {
                    let id: String = row.get(1)?;
                    Ok((
                        id,
                        Tombstone {
                            table: row.get(0)?,
                            id: EntityId::default(),
                            user_id: row.get(2)?,
                            deleted_at: row.get(3)?,
                            attempts: row.get(4)?,
                            next_retry_at: row.get(5)?,
                            last_error: row.get(6)?,
                        },
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut tombstones = Vec::with_capacity(rows.len());
            for (id, mut tombstone) in rows {
                match id.parse() {
                    Ok(id) => {
                        tombstone.id = id;
                        tombstones.push(tombstone);
                    }
                    Err(error) => {
                        tracing::warn!("Skipping tombstone with invalid id {id}: {error}");
                    }
                }
            }
            Ok(tombstones)
        })
    }

    /// Ids of entities deleted locally but not yet remotely.
    pub fn tombstone_ids(&self, table: &str) -> Result<HashSet<EntityId>> {
        Ok(self
            .tombstones(table)?
            .into_iter()
            .map(|tombstone| tombstone.id)
            .collect())
    }

    /// Queue a remote delete for an entity that is already gone locally.
    pub fn queue_tombstone(
        &self,
        table: &str,
        id: &EntityId,
        user_id: Option<&str>,
        deleted_at: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tombstones (kind, id, user_id, deleted_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(kind, id) DO NOTHING",
                params![table, id.as_str(), user_id, deleted_at],
            )?;
            Ok(())
        })
    }

    /// Drop a tombstone once the remote delete was acknowledged.
    pub fn remove_tombstone(&self, table: &str, id: &EntityId) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM tombstones WHERE kind = ? AND id = ?",
                params![table, id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// Record a failed remote delete; the tombstone stays queued.
    pub fn mark_tombstone_failed(
        &self,
        table: &str,
        id: &EntityId,
        attempts: u32,
        next_retry_at: Option<i64>,
        error: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tombstones SET attempts = ?, next_retry_at = ?, last_error = ?
                 WHERE kind = ? AND id = ?",
                params![attempts, next_retry_at, error, table, id.as_str()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, EntityKind, Family};

    #[test]
    fn test_delete_with_tombstone_roundtrip() {
        let store = LocalStore::open_in_memory().unwrap();
        let entity = Entity::new(Family {
            name: "Orchidaceae".to_string(),
            description: None,
        })
        .owned_by("user-1");
        store.upsert(&entity).unwrap();

        assert!(store
            .delete_with_tombstone::<Family>(&entity.id, true, 100)
            .unwrap());
        assert!(store.get::<Family>(&entity.id).unwrap().is_none());

        let tombstones = store.tombstones(Family::TABLE).unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].id, entity.id);
        assert_eq!(tombstones[0].user_id.as_deref(), Some("user-1"));
        assert_eq!(tombstones[0].deleted_at, 100);
        assert_eq!(store.statistics::<Family>().unwrap().pending_deletes, 1);

        store
            .mark_tombstone_failed(Family::TABLE, &entity.id, 2, Some(500), "offline")
            .unwrap();
        let tombstones = store.tombstones(Family::TABLE).unwrap();
        assert_eq!(tombstones[0].attempts, 2);
        assert_eq!(tombstones[0].last_error.as_deref(), Some("offline"));

        assert!(store.remove_tombstone(Family::TABLE, &entity.id).unwrap());
        assert!(store.tombstone_ids(Family::TABLE).unwrap().is_empty());
    }

    #[test]
    fn test_delete_without_tombstone() {
        let store = LocalStore::open_in_memory().unwrap();
        let entity = Entity::new(Family {
            name: "Orchidaceae".to_string(),
            description: None,
        });
        store.upsert(&entity).unwrap();

        assert!(store
            .delete_with_tombstone::<Family>(&entity.id, false, 100)
            .unwrap());
        assert!(store.tombstones(Family::TABLE).unwrap().is_empty());

        store
            .queue_tombstone(Family::TABLE, &entity.id, None, 200)
            .unwrap();
        assert_eq!(store.tombstone_ids(Family::TABLE).unwrap().len(), 1);
        assert!(!store
            .delete_with_tombstone::<Family>(&entity.id, true, 100)
            .unwrap());
    }
}
