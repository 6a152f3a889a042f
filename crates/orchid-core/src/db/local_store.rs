//! Local entity store
//!
//! The single source of truth for every read. All operations are synchronous
//! and never touch the network; each write is a single-row statement or a
//! short transaction, so concurrent writers compose per entity.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{
    Entity, EntityFilter, EntityId, EntityKind, EntityStatistics, OwnerFilter, SyncMeta,
    SyncStatus,
};

use super::connection::Database;

const ENTITY_COLUMNS: &str = "id, user_id, is_active, is_favorite, created_at, updated_at, data, \
     sync_status, sync_hash, last_synced_at, sync_attempts, next_retry_at, last_error, revision";

const INSERT_ENTITY: &str = "INSERT INTO entities (
        kind, id, user_id, name, is_active, is_favorite, created_at, updated_at, data,
        sync_status, sync_hash, last_synced_at, sync_attempts, next_retry_at, last_error, revision
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

/// How a full-row write treats an existing row
#[derive(Debug, Clone, Copy)]
enum WriteMode {
    /// Insert or overwrite
    Upsert,
    /// Insert only when no row exists
    InsertIfAbsent,
    /// Overwrite only when the stored revision matches
    ReplaceIfRevision(i64),
}

/// Embedded `SQLite` store holding the offline copy of every entity.
pub struct LocalStore {
    db: Mutex<Database>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (or create) a store at the given filesystem path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&path)?;
        tracing::info!("Opened local store at {}", path.display());
        Ok(Self {
            db: Mutex::new(db),
            path: Some(path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory()?),
            path: None,
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn with_conn<R>(&self, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| Error::Database("local store lock poisoned".to_string()))?;
        f(db.connection_mut())
    }

    /// Fetch an entity by id.
    pub fn get<T: EntityKind>(&self, id: &EntityId) -> Result<Option<Entity<T>>> {
        self.with_conn(|conn| read_entity(conn, id))
    }

    /// List entities matching the filter, newest first.
    pub fn get_all<T: EntityKind>(&self, filter: &EntityFilter) -> Result<Vec<Entity<T>>> {
        let mut clauses = vec!["kind = ?".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(T::TABLE)];

        match &filter.owner {
            OwnerFilter::Any => {}
            OwnerFilter::Shared => clauses.push("user_id IS NULL".to_string()),
            OwnerFilter::User(user_id) => {
                clauses.push("user_id = ?".to_string());
                values.push(Box::new(user_id.clone()));
            }
            OwnerFilter::UserOrShared(user_id) => {
                clauses.push("(user_id = ? OR user_id IS NULL)".to_string());
                values.push(Box::new(user_id.clone()));
            }
        }
        if filter.active_only {
            clauses.push("is_active = 1".to_string());
        }
        if filter.favorites_only {
            clauses.push("is_favorite = 1".to_string());
        }
        if let Some(needle) = filter.name_contains.as_deref().map(str::trim) {
            if !needle.is_empty() {
                clauses.push("name LIKE ? ESCAPE '\\'".to_string());
                values.push(Box::new(format!("%{}%", escape_like(needle))));
            }
        }
        if let Some(status) = filter.status {
            clauses.push("sync_status = ?".to_string());
            values.push(Box::new(status.as_str()));
        }

        let limit = filter.limit.map_or(-1, |limit| limit as i64);
        values.push(Box::new(limit));
        values.push(Box::new(filter.offset as i64));

        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE {} \
             ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
            clauses.join(" AND ")
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let entities = stmt
                .query_map(params_from_iter(values.iter()), parse_entity::<T>)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entities)
        })
    }

    /// Insert or overwrite an entity, returning it as stored.
    pub fn upsert<T: EntityKind>(&self, entity: &Entity<T>) -> Result<Entity<T>> {
        self.with_conn(|conn| {
            write_entity(conn, entity, WriteMode::Upsert)?;
            read_entity(conn, &entity.id)?.ok_or_else(|| Error::not_found(T::TABLE, entity.id))
        })
    }

    /// Remove an entity. Returns whether a row was deleted.
    pub fn delete<T: EntityKind>(&self, id: &EntityId) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM entities WHERE kind = ? AND id = ?",
                params![T::TABLE, id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// Insert an entity only if its id is unknown. Returns whether it was inserted.
    pub fn insert_if_absent<T: EntityKind>(&self, entity: &Entity<T>) -> Result<bool> {
        self.with_conn(|conn| Ok(write_entity(conn, entity, WriteMode::InsertIfAbsent)? > 0))
    }

    /// Atomic read-modify-write of a single entity.
    ///
    /// Returns `None` when the entity does not exist. The stored revision is
    /// bumped so in-flight engine writes based on the old copy are discarded.
    pub fn update_with<T, F>(&self, id: &EntityId, apply: F) -> Result<Option<Entity<T>>>
    where
        T: EntityKind,
        F: FnOnce(&mut Entity<T>) -> Result<()>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let Some(mut entity) = read_entity::<T>(&tx, id)? else {
                return Ok(None);
            };
            let revision = entity.sync.revision;
            apply(&mut entity)?;
            entity.id = *id;
            entity.sync.revision = revision + 1;
            write_entity(&tx, &entity, WriteMode::Upsert)?;
            tx.commit()?;
            Ok(Some(entity))
        })
    }

    /// Overwrite an entity only if nobody wrote it since `expected_revision`.
    pub fn replace_if_revision<T: EntityKind>(
        &self,
        entity: &Entity<T>,
        expected_revision: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = write_entity(
                conn,
                entity,
                WriteMode::ReplaceIfRevision(expected_revision),
            )?;
            Ok(rows > 0)
        })
    }

    /// Delete an entity only if nobody wrote it since `expected_revision`.
    pub fn delete_if_revision<T: EntityKind>(
        &self,
        id: &EntityId,
        expected_revision: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM entities WHERE kind = ? AND id = ? AND revision = ?",
                params![T::TABLE, id.as_str(), expected_revision],
            )?;
            Ok(rows > 0)
        })
    }

    /// Entities whose changes the remote has not acknowledged, oldest first.
    pub fn dirty<T: EntityKind>(&self) -> Result<Vec<Entity<T>>> {
        self.list_where::<T>("sync_status != 'synced'", "updated_at ASC")
    }

    /// Entities in the `Synced` state.
    pub fn synced<T: EntityKind>(&self) -> Result<Vec<Entity<T>>> {
        self.list_where::<T>("sync_status = 'synced'", "updated_at ASC")
    }

    fn list_where<T: EntityKind>(&self, condition: &str, order: &str) -> Result<Vec<Entity<T>>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE kind = ? AND {condition} ORDER BY {order}"
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let entities = stmt
                .query_map(params![T::TABLE], parse_entity::<T>)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entities)
        })
    }

    /// Record a successful push. No-op if the entity changed since `revision`.
    pub fn mark_synced<T: EntityKind>(
        &self,
        id: &EntityId,
        revision: i64,
        hash: &str,
        synced_at: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE entities
                 SET sync_status = 'synced', sync_hash = ?, last_synced_at = ?,
                     sync_attempts = 0, next_retry_at = NULL, last_error = NULL
                 WHERE kind = ? AND id = ? AND revision = ?",
                params![hash, synced_at, T::TABLE, id.as_str(), revision],
            )?;
            Ok(rows > 0)
        })
    }

    /// Record a rejected push. Business fields are left untouched.
    pub fn mark_failed<T: EntityKind>(
        &self,
        id: &EntityId,
        revision: i64,
        attempts: u32,
        next_retry_at: Option<i64>,
        error: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE entities
                 SET sync_status = 'error', sync_attempts = ?, next_retry_at = ?, last_error = ?
                 WHERE kind = ? AND id = ? AND revision = ?",
                params![
                    attempts,
                    next_retry_at,
                    error,
                    T::TABLE,
                    id.as_str(),
                    revision
                ],
            )?;
            Ok(rows > 0)
        })
    }

    /// Record a push that never reached the backend. Status and retry state are kept.
    pub fn mark_deferred<T: EntityKind>(
        &self,
        id: &EntityId,
        revision: i64,
        error: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE entities SET last_error = ?
                 WHERE kind = ? AND id = ? AND revision = ?",
                params![error, T::TABLE, id.as_str(), revision],
            )?;
            Ok(rows > 0)
        })
    }

    /// Record content the remote acknowledged while the entity was edited again.
    ///
    /// Only the sync hash moves; the newer local edit stays dirty. Returns
    /// `false` when the entity no longer exists.
    pub fn record_acknowledged<T: EntityKind>(
        &self,
        id: &EntityId,
        hash: &str,
        synced_at: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE entities SET sync_hash = ?, last_synced_at = ?
                 WHERE kind = ? AND id = ?",
                params![hash, synced_at, T::TABLE, id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// Remove an entity and, when requested, queue a remote delete for it.
    ///
    /// Both happen in one transaction so a crash cannot lose the tombstone.
    pub fn delete_with_tombstone<T: EntityKind>(
        &self,
        id: &EntityId,
        tombstone: bool,
        deleted_at: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let user_id: Option<Option<String>> = tx
                .query_row(
                    "SELECT user_id FROM entities WHERE kind = ? AND id = ?",
                    params![T::TABLE, id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(user_id) = user_id else {
                return Ok(false);
            };

            tx.execute(
                "DELETE FROM entities WHERE kind = ? AND id = ?",
                params![T::TABLE, id.as_str()],
            )?;
            if tombstone {
                tx.execute(
                    "INSERT INTO tombstones (kind, id, user_id, deleted_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT(kind, id) DO UPDATE SET deleted_at = excluded.deleted_at",
                    params![T::TABLE, id.as_str(), user_id, deleted_at],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    /// Sync-state counts for one entity kind.
    pub fn statistics<T: EntityKind>(&self) -> Result<EntityStatistics> {
        self.with_conn(|conn| {
            let mut stats = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_active), 0),
                        COALESCE(SUM(sync_status = 'synced'), 0),
                        COALESCE(SUM(sync_status = 'local'), 0),
                        COALESCE(SUM(sync_status = 'pending'), 0),
                        COALESCE(SUM(sync_status = 'error'), 0)
                 FROM entities WHERE kind = ?",
                params![T::TABLE],
                |row| {
                    Ok(EntityStatistics {
                        total: row.get(0)?,
                        active: row.get(1)?,
                        synced: row.get(2)?,
                        local: row.get(3)?,
                        pending: row.get(4)?,
                        error: row.get(5)?,
                        pending_deletes: 0,
                    })
                },
            )?;
            stats.pending_deletes = conn.query_row(
                "SELECT COUNT(*) FROM tombstones WHERE kind = ?",
                params![T::TABLE],
                |row| row.get(0),
            )?;
            Ok(stats)
        })
    }
}

fn read_entity<T: EntityKind>(conn: &Connection, id: &EntityId) -> Result<Option<Entity<T>>> {
    let entity = conn
        .query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE kind = ? AND id = ?"),
            params![T::TABLE, id.as_str()],
            parse_entity::<T>,
        )
        .optional()?;
    Ok(entity)
}

fn write_entity<T: EntityKind>(
    conn: &Connection,
    entity: &Entity<T>,
    mode: WriteMode,
) -> Result<usize> {
    let data = serde_json::to_string(&entity.data)?;
    let id = entity.id.as_str();
    let meta = &entity.sync;

    let rows = match mode {
        WriteMode::Upsert | WriteMode::InsertIfAbsent => {
            let conflict = if matches!(mode, WriteMode::Upsert) {
                "ON CONFLICT(kind, id) DO UPDATE SET
                    user_id = excluded.user_id, name = excluded.name,
                    is_active = excluded.is_active, is_favorite = excluded.is_favorite,
                    created_at = excluded.created_at, updated_at = excluded.updated_at,
                    data = excluded.data, sync_status = excluded.sync_status,
                    sync_hash = excluded.sync_hash, last_synced_at = excluded.last_synced_at,
                    sync_attempts = excluded.sync_attempts, next_retry_at = excluded.next_retry_at,
                    last_error = excluded.last_error, revision = excluded.revision"
            } else {
                "ON CONFLICT(kind, id) DO NOTHING"
            };
            conn.execute(
                &format!("{INSERT_ENTITY} {conflict}"),
                params![
                    T::TABLE,
                    id,
                    entity.user_id,
                    entity.data.name(),
                    entity.is_active,
                    entity.is_favorite,
                    entity.created_at,
                    entity.updated_at,
                    data,
                    meta.status.as_str(),
                    meta.hash,
                    meta.last_synced_at,
                    meta.attempts,
                    meta.next_retry_at,
                    meta.last_error,
                    meta.revision,
                ],
            )?
        }
        WriteMode::ReplaceIfRevision(expected) => conn.execute(
            "UPDATE entities SET
                user_id = ?1, name = ?2, is_active = ?3, is_favorite = ?4,
                created_at = ?5, updated_at = ?6, data = ?7, sync_status = ?8,
                sync_hash = ?9, last_synced_at = ?10, sync_attempts = ?11,
                next_retry_at = ?12, last_error = ?13, revision = ?14
             WHERE kind = ?15 AND id = ?16 AND revision = ?17",
            params![
                entity.user_id,
                entity.data.name(),
                entity.is_active,
                entity.is_favorite,
                entity.created_at,
                entity.updated_at,
                data,
                meta.status.as_str(),
                meta.hash,
                meta.last_synced_at,
                meta.attempts,
                meta.next_retry_at,
                meta.last_error,
                meta.revision,
                T::TABLE,
                id,
                expected,
            ],
        )?,
    };

    Ok(rows)
}

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

/// Parse an entity from a row selected with `ENTITY_COLUMNS`
fn parse_entity<T: EntityKind>(row: &Row<'_>) -> rusqlite::Result<Entity<T>> {
    let id: String = row.get(0)?;
    let data: String = row.get(6)?;
    let status: String = row.get(7)?;

    Ok(Entity {
        id: id.parse().map_err(|error| conversion_error(0, error))?,
        user_id: row.get(1)?,
        is_active: row.get(2)?,
        is_favorite: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        data: serde_json::from_str(&data).map_err(|error| conversion_error(6, error))?,
        sync: SyncMeta {
            status: status
                .parse::<SyncStatus>()
                .map_err(|error| conversion_error(7, error))?,
            hash: row.get(8)?,
            last_synced_at: row.get(9)?,
            attempts: row.get(10)?,
            next_retry_at: row.get(11)?,
            last_error: row.get(12)?,
            revision: row.get(13)?,
        },
    })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Family, Genus};
    use pretty_assertions::assert_eq;

    fn setup() -> LocalStore {
        LocalStore::open_in_memory().unwrap()
    }

    fn family(name: &str) -> Entity<Family> {
        Entity::new(Family {
            name: name.to_string(),
            description: Some("test".to_string()),
        })
    }

    #[test]
    fn test_upsert_and_get() {
        let store = setup();
        let entity = family("Orchidaceae");

        let stored = store.upsert(&entity).unwrap();
        assert_eq!(stored, entity);

        let fetched = store.get::<Family>(&entity.id).unwrap().unwrap();
        assert_eq!(fetched, entity);
    }

    #[test]
    fn test_kinds_are_partitioned() {
        let store = setup();
        let entity = family("Orchidaceae");
        store.upsert(&entity).unwrap();

        assert!(store.get::<Genus>(&entity.id).unwrap().is_none());
        assert!(store.get_all::<Genus>(&EntityFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let store = setup();
        let entity = family("Orchidaceae");
        store.upsert(&entity).unwrap();

        assert!(store.delete::<Family>(&entity.id).unwrap());
        assert!(!store.delete::<Family>(&entity.id).unwrap());
        assert!(store.get::<Family>(&entity.id).unwrap().is_none());
    }

    #[test]
    fn test_get_all_filters() {
        let store = setup();

        let mut shared = family("Orchidaceae");
        shared.is_favorite = true;
        let mine = family("Bromeliaceae").owned_by("user-1");
        let mut theirs = family("Araceae").owned_by("user-2");
        theirs.is_active = false;

        for entity in [&shared, &mine, &theirs] {
            store.upsert(entity).unwrap();
        }

        let all = store.get_all::<Family>(&EntityFilter::all()).unwrap();
        assert_eq!(all.len(), 3);

        let visible = store
            .get_all::<Family>(
                &EntityFilter::all().owner(OwnerFilter::UserOrShared("user-1".to_string())),
            )
            .unwrap();
        assert_eq!(visible.len(), 2);

        let shared_only = store
            .get_all::<Family>(&EntityFilter::all().owner(OwnerFilter::Shared))
            .unwrap();
        assert_eq!(shared_only.len(), 1);
        assert_eq!(shared_only[0].id, shared.id);

        let active = store
            .get_all::<Family>(&EntityFilter::all().active_only())
            .unwrap();
        assert_eq!(active.len(), 2);

        let favorites = store
            .get_all::<Family>(&EntityFilter::all().favorites_only())
            .unwrap();
        assert_eq!(favorites.len(), 1);

        let named = store
            .get_all::<Family>(&EntityFilter::all().name_contains("ACEAE"))
            .unwrap();
        assert_eq!(named.len(), 3);

        let named = store
            .get_all::<Family>(&EntityFilter::all().name_contains("brom"))
            .unwrap();
        assert_eq!(named.len(), 1);
    }

    #[test]
    fn test_name_filter_escapes_wildcards() {
        let store = setup();
        store.upsert(&family("Orchidaceae")).unwrap();

        let named = store
            .get_all::<Family>(&EntityFilter::all().name_contains("%"))
            .unwrap();
        assert!(named.is_empty());
    }

    #[test]
    fn test_get_all_pages_newest_first() {
        let store = setup();
        let mut older = family("Older");
        older.updated_at -= 1_000;
        let newer = family("Newer");
        store.upsert(&older).unwrap();
        store.upsert(&newer).unwrap();

        let page = store
            .get_all::<Family>(&EntityFilter::all().page(1, 0))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, newer.id);

        let page = store
            .get_all::<Family>(&EntityFilter::all().page(1, 1))
            .unwrap();
        assert_eq!(page[0].id, older.id);
    }

    #[test]
    fn test_update_with_bumps_revision() {
        let store = setup();
        let entity = family("Orchidaceae");
        store.upsert(&entity).unwrap();

        let updated = store
            .update_with::<Family, _>(&entity.id, |entity| {
                entity.data.name = "Orchid family".to_string();
                Ok(())
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.sync.revision, entity.sync.revision + 1);
        assert_eq!(
            store.get::<Family>(&entity.id).unwrap().unwrap().data.name,
            "Orchid family"
        );

        let missing = store
            .update_with::<Family, _>(&EntityId::new(), |_| Ok(()))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_guarded_writes_respect_revision() {
        let store = setup();
        let entity = family("Orchidaceae");
        store.upsert(&entity).unwrap();
        store
            .update_with::<Family, _>(&entity.id, |_| Ok(()))
            .unwrap();

        // Stale revision: ignored
        assert!(!store
            .mark_synced::<Family>(&entity.id, entity.sync.revision, "hash", 1)
            .unwrap());
        assert!(!store
            .replace_if_revision(&entity, entity.sync.revision)
            .unwrap());
        assert!(!store
            .delete_if_revision::<Family>(&entity.id, entity.sync.revision)
            .unwrap());

        // Current revision: applied
        assert!(store
            .mark_synced::<Family>(&entity.id, entity.sync.revision + 1, "hash", 1)
            .unwrap());
        let stored = store.get::<Family>(&entity.id).unwrap().unwrap();
        assert_eq!(stored.sync.status, SyncStatus::Synced);
        assert_eq!(stored.sync.hash.as_deref(), Some("hash"));
    }

    #[test]
    fn test_mark_failed_keeps_fields() {
        let store = setup();
        let entity = family("Orchidaceae");
        store.upsert(&entity).unwrap();

        assert!(store
            .mark_failed::<Family>(&entity.id, 0, 1, Some(42), "permission denied")
            .unwrap());
        let stored = store.get::<Family>(&entity.id).unwrap().unwrap();
        assert_eq!(stored.data, entity.data);
        assert_eq!(stored.sync.status, SyncStatus::Error);
        assert_eq!(stored.sync.attempts, 1);
        assert_eq!(stored.sync.next_retry_at, Some(42));
        assert_eq!(stored.sync.last_error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn test_mark_deferred_keeps_status() {
        let store = setup();
        let entity = family("Orchidaceae");
        store.upsert(&entity).unwrap();

        assert!(store
            .mark_deferred::<Family>(&entity.id, 0, "network is unreachable")
            .unwrap());
        let stored = store.get::<Family>(&entity.id).unwrap().unwrap();
        assert_eq!(stored.sync.status, SyncStatus::Local);
        assert_eq!(stored.sync.attempts, 0);
        assert_eq!(stored.sync.next_retry_at, None);
        assert_eq!(
            stored.sync.last_error.as_deref(),
            Some("network is unreachable")
        );
        assert!(!store
            .mark_deferred::<Family>(&entity.id, 5, "stale")
            .unwrap());
    }

    #[test]
    fn test_record_acknowledged_keeps_entity_dirty() {
        let store = setup();
        let mut entity = family("Orchidaceae");
        entity.sync.status = SyncStatus::Pending;
        store.upsert(&entity).unwrap();

        assert!(store
            .record_acknowledged::<Family>(&entity.id, "hash", 7)
            .unwrap());
        let stored = store.get::<Family>(&entity.id).unwrap().unwrap();
        assert_eq!(stored.sync.status, SyncStatus::Pending);
        assert_eq!(stored.sync.hash.as_deref(), Some("hash"));
        assert_eq!(stored.sync.last_synced_at, Some(7));
        assert_eq!(stored.sync.revision, entity.sync.revision);

        assert!(!store
            .record_acknowledged::<Family>(&EntityId::new(), "hash", 7)
            .unwrap());
    }

    #[test]
    fn test_insert_if_absent() {
        let store = setup();
        let entity = family("Orchidaceae");
        assert!(store.insert_if_absent(&entity).unwrap());

        let mut changed = entity.clone();
        changed.data.name = "Changed".to_string();
        assert!(!store.insert_if_absent(&changed).unwrap());
        assert_eq!(
            store.get::<Family>(&entity.id).unwrap().unwrap().data.name,
            "Orchidaceae"
        );
    }

    #[test]
    fn test_dirty_and_synced_partitions() {
        let store = setup();
        let local = family("Local");
        let mut synced = family("Synced");
        synced.sync = SyncMeta::synced("abc".to_string(), 1);
        store.upsert(&local).unwrap();
        store.upsert(&synced).unwrap();

        let dirty = store.dirty::<Family>().unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id, local.id);

        let clean = store.synced::<Family>().unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].id, synced.id);
    }

    #[test]
    fn test_statistics() {
        let store = setup();
        let mut synced = family("Synced");
        synced.sync = SyncMeta::synced("abc".to_string(), 1);
        let mut pending = family("Pending");
        pending.sync.status = SyncStatus::Pending;
        pending.is_active = false;
        store.upsert(&synced).unwrap();
        store.upsert(&pending).unwrap();
        store.upsert(&family("Local")).unwrap();

        let stats = store.statistics::<Family>().unwrap();
        assert_eq!(
            stats,
            EntityStatistics {
                total: 3,
                active: 2,
                synced: 1,
                local: 1,
                pending: 1,
                error: 0,
                pending_deletes: 0,
            }
        );
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("orchids.db");
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        store.upsert(&family("Orchidaceae")).unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(
            reopened
                .get_all::<Family>(&EntityFilter::all())
                .unwrap()
                .len(),
            1
        );
    }
}
