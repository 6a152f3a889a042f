//! Typed CRUD facade over the local store
//!
//! Every method completes against the local store alone and works offline.
//! Writes queue a debounced background push; sync never blocks a caller.

use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::{
    Entity, EntityFilter, EntityId, EntityKind, EntityStatistics, SyncConflict, SyncMeta,
    SyncStatus,
};
use crate::sync::SyncResult;
use crate::util::now_millis;

use super::events::EntityChange;
use super::sync_service::ServiceCore;

pub struct Repository<T> {
    core: Arc<ServiceCore>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: EntityKind> Repository<T> {
    pub(crate) const fn new(core: Arc<ServiceCore>) -> Self {
        Self {
            core,
            _kind: PhantomData,
        }
    }

    /// Persist a new entity as `Local` and queue it for push.
    pub fn create(&self, mut entity: Entity<T>) -> Result<Entity<T>> {
        entity.data.validate()?;
        let now = now_millis();
        entity.created_at = now;
        entity.updated_at = now;
        entity.sync = SyncMeta::default();

        if !self.core.store.insert_if_absent(&entity)? {
            return Err(Error::InvalidInput(format!(
                "{} {} already exists",
                T::TABLE,
                entity.id
            )));
        }

        tracing::debug!("Created {} {}", T::TABLE, entity.id);
        self.changed(entity.id, EntityChange::Created);
        Ok(entity)
    }

    /// Apply the caller's owner, flags and business fields to the stored entity.
    ///
    /// `created_at` and sync bookkeeping come from the stored copy.
    pub fn update(&self, entity: Entity<T>) -> Result<Entity<T>> {
        entity.data.validate()?;
        let Entity {
            id,
            user_id,
            is_active,
            is_favorite,
            data,
            ..
        } = entity;

        self.modify(&id, |stored| {
            stored.user_id = user_id;
            stored.is_active = is_active;
            stored.is_favorite = is_favorite;
            stored.data = data;
        })
    }

    pub fn set_favorite(&self, id: &EntityId, is_favorite: bool) -> Result<Entity<T>> {
        self.modify(id, |stored| stored.is_favorite = is_favorite)
    }

    pub fn set_active(&self, id: &EntityId, is_active: bool) -> Result<Entity<T>> {
        self.modify(id, |stored| stored.is_active = is_active)
    }

    /// Delete locally and queue the remote delete.
    ///
    /// Entities the remote never saw are dropped without a tombstone.
    pub fn delete(&self, id: &EntityId) -> Result<()> {
        let entity = self
            .core
            .store
            .get::<T>(id)?
            .ok_or_else(|| Error::not_found(T::TABLE, id))?;

        let tombstone = entity.sync.was_synced();
        if !self
            .core
            .store
            .delete_with_tombstone::<T>(id, tombstone, now_millis())?
        {
            return Err(Error::not_found(T::TABLE, id));
        }

        tracing::debug!("Deleted {} {} (tombstone: {})", T::TABLE, id, tombstone);
        self.changed(*id, EntityChange::Deleted);
        Ok(())
    }

    pub fn get_by_id(&self, id: &EntityId) -> Result<Option<Entity<T>>> {
        self.core.store.get(id)
    }

    pub fn get_all(&self, filter: &EntityFilter) -> Result<Vec<Entity<T>>> {
        self.core.store.get_all(filter)
    }

    pub fn get_statistics(&self) -> Result<EntityStatistics> {
        self.core.store.statistics::<T>()
    }

    /// Resolved conflicts for this kind, newest first
    pub fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.core.store.list_conflicts(Some(T::TABLE), limit)
    }

    /// Sync every registered kind now. Returns a skipped result while offline.
    pub async fn force_full_sync(&self) -> SyncResult {
        self.force_full_sync_with(&CancellationToken::new()).await
    }

    pub async fn force_full_sync_with(&self, cancel: &CancellationToken) -> SyncResult {
        self.core.force_full_sync(cancel).await
    }

    fn modify(&self, id: &EntityId, apply: impl FnOnce(&mut Entity<T>)) -> Result<Entity<T>> {
        let updated = self
            .core
            .store
            .update_with::<T, _>(id, |stored| {
                apply(stored);
                stored.data.validate()?;
                stored.touch();
                if stored.sync.status != SyncStatus::Local {
                    stored.sync.status = SyncStatus::Pending;
                }
                stored.sync.attempts = 0;
                stored.sync.next_retry_at = None;
                stored.sync.last_error = None;
                Ok(())
            })?
            .ok_or_else(|| Error::not_found(T::TABLE, id))?;

        tracing::debug!("Updated {} {}", T::TABLE, id);
        self.changed(*id, EntityChange::Updated);
        Ok(updated)
    }

    fn changed(&self, id: EntityId, change: EntityChange) {
        self.core.events.entity_changed(T::TABLE, id, change);
        self.core.local_change();
    }
}
