//! Per-kind push and pull

use std::collections::HashSet;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::db::NewConflict;
use crate::error::Result;
use crate::models::{ConflictWinner, Entity, EntityId, SyncMeta, SyncStatus};
use crate::remote::RemoteSchema;
use crate::services::EntityChange;

use super::engine::CycleContext;
use super::result::CycleMode;

/// Type-erased sync operations for one registered entity kind
#[async_trait]
pub(crate) trait KindSync: Send + Sync {
    fn table(&self) -> &'static str;

    /// Propagate pending local deletions
    async fn push_deletes(&self, cx: &mut CycleContext<'_>) -> Result<()>;

    /// Upsert dirty entities
    async fn push_changes(&self, cx: &mut CycleContext<'_>) -> Result<()>;

    /// Apply remote rows to the local store
    async fn pull(&self, cx: &mut CycleContext<'_>) -> Result<()>;
}

pub(crate) struct KindHandler<T>(PhantomData<fn() -> T>);

impl<T> KindHandler<T> {
    pub(crate) const fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<T: RemoteSchema> KindSync for KindHandler<T> {
    fn table(&self) -> &'static str {
        T::TABLE
    }

    async fn push_deletes(&self, cx: &mut CycleContext<'_>) -> Result<()> {
        for tombstone in cx.store.tombstones(T::TABLE)? {
            if !cx.should_attempt(tombstone.attempts, tombstone.next_retry_at) {
                continue;
            }
            if !cx.may_call_remote() {
                break;
            }

            match cx.remote.delete::<T>(&tombstone.id).await {
                Ok(()) => {
                    cx.store.remove_tombstone(T::TABLE, &tombstone.id)?;
                    cx.result.deleted += 1;
                    cx.result.record_success();
                }
                Err(error) => {
                    let retry = cx
                        .policy
                        .after_failure(tombstone.attempts, error.class(), cx.now);
                    let message = format!("{} delete {}: {error}", T::TABLE, tombstone.id);
                    cx.store.mark_tombstone_failed(
                        T::TABLE,
                        &tombstone.id,
                        retry.attempts,
                        retry.next_retry_at,
                        &message,
                    )?;
                    cx.remote_failed(message, &error);
                }
            }
        }
        Ok(())
    }

    async fn push_changes(&self, cx: &mut CycleContext<'_>) -> Result<()> {
        for entity in cx.store.dirty::<T>()? {
            let hash = entity.content_hash()?;
            if entity.sync.hash.as_deref() == Some(hash.as_str()) {
                // Content the remote already acknowledged
                if cx
                    .store
                    .mark_synced::<T>(&entity.id, entity.sync.revision, &hash, cx.now)?
                {
                    cx.changed(T::TABLE, entity.id, EntityChange::Synced);
                }
                continue;
            }
            if !cx.should_attempt(entity.sync.attempts, entity.sync.next_retry_at) {
                tracing::debug!("Deferring {} {} until its retry is due", T::TABLE, entity.id);
                continue;
            }
            if !cx.may_call_remote() {
                break;
            }

            match cx.remote.upsert(&entity).await {
                Ok(_) => {
                    cx.result.pushed += 1;
                    cx.result.record_success();
                    if cx
                        .store
                        .mark_synced::<T>(&entity.id, entity.sync.revision, &hash, cx.now)?
                    {
                        cx.changed(T::TABLE, entity.id, EntityChange::Synced);
                    } else if cx.store.record_acknowledged::<T>(&entity.id, &hash, cx.now)? {
                        tracing::debug!("{} {} edited during push", T::TABLE, entity.id);
                    } else {
                        // Deleted locally while the upsert was in flight
                        cx.store.queue_tombstone(
                            T::TABLE,
                            &entity.id,
                            entity.user_id.as_deref(),
                            cx.now,
                        )?;
                    }
                }
                Err(error) if error.is_transport() => {
                    let message = format!("{} upsert {}: {error}", T::TABLE, entity.id);
                    cx.store
                        .mark_deferred::<T>(&entity.id, entity.sync.revision, &message)?;
                    cx.remote_failed(message, &error);
                }
                Err(error) => {
                    let retry = cx
                        .policy
                        .after_failure(entity.sync.attempts, error.class(), cx.now);
                    let message = format!("{} upsert {}: {error}", T::TABLE, entity.id);
                    if cx.store.mark_failed::<T>(
                        &entity.id,
                        entity.sync.revision,
                        retry.attempts,
                        retry.next_retry_at,
                        &message,
                    )? {
                        cx.changed(T::TABLE, entity.id, EntityChange::Failed);
                    }
                    cx.remote_failed(message, &error);
                }
            }
        }
        Ok(())
    }

    async fn pull(&self, cx: &mut CycleContext<'_>) -> Result<()> {
        if !cx.may_call_remote() {
            return Ok(());
        }
        let since = if cx.mode == CycleMode::Background && cx.incremental_pull {
            cx.store
                .high_water_mark(T::TABLE)?
                .map(|mark| mark.saturating_sub(cx.pull_overlap))
        } else {
            None
        };

        let rows = match cx.remote.fetch_all::<T>(since).await {
            Ok(rows) => rows,
            Err(error) => {
                cx.remote_failed(format!("{} fetch: {error}", T::TABLE), &error);
                return Ok(());
            }
        };

        let tombstoned = cx.store.tombstone_ids(T::TABLE)?;
        let mut seen = HashSet::with_capacity(rows.len());
        let mut complete = true;
        let mut high_water: Option<i64> = None;

        for row in rows {
            let incoming = match row {
                Ok(incoming) => incoming,
                Err(error) => {
                    complete = false;
                    let message = format!("{} pull: {error}", T::TABLE);
                    tracing::warn!("{message}");
                    cx.result.record_failure(message);
                    continue;
                }
            };
            high_water = high_water.max(Some(incoming.updated_at));
            seen.insert(incoming.id);
            if tombstoned.contains(&incoming.id) {
                tracing::debug!("Skipping {} {}: local delete pending", T::TABLE, incoming.id);
                continue;
            }
            apply_incoming(cx, incoming)?;
        }

        if let Some(mark) = high_water {
            cx.pulled_through(T::TABLE, mark);
        }
        if since.is_none() && complete {
            prune_missing::<T>(cx, &seen)?;
        }
        Ok(())
    }
}

/// Merge one remote row into the local store.
fn apply_incoming<T: RemoteSchema>(cx: &mut CycleContext<'_>, incoming: Entity<T>) -> Result<()> {
    let incoming_hash = incoming.content_hash()?;
    let Some(local) = cx.store.get::<T>(&incoming.id)? else {
        let mut entity = incoming;
        entity.sync = SyncMeta::synced(incoming_hash, cx.now);
        if cx.store.insert_if_absent(&entity)? {
            cx.result.pulled += 1;
            cx.result.record_success();
            cx.changed(T::TABLE, entity.id, EntityChange::Pulled);
        }
        return Ok(());
    };
    let revision = local.sync.revision;

    if local.sync.status == SyncStatus::Synced {
        if local.sync.hash.as_deref() == Some(incoming_hash.as_str()) {
            return Ok(());
        }
        return overwrite(cx, incoming, incoming_hash, revision);
    }

    let local_hash = local.content_hash()?;
    if local_hash == incoming_hash {
        // Both sides converged on the same content
        if cx
            .store
            .mark_synced::<T>(&local.id, revision, &local_hash, cx.now)?
        {
            cx.changed(T::TABLE, local.id, EntityChange::Synced);
        }
        return Ok(());
    }
    if local.sync.hash.as_deref() == Some(incoming_hash.as_str()) {
        // Remote unchanged since the last sync; the local edit is still to be pushed
        return Ok(());
    }

    let winner = if local.updated_at > incoming.updated_at {
        ConflictWinner::Local
    } else {
        ConflictWinner::Remote
    };
    cx.store.record_conflict(&NewConflict {
        table: T::TABLE,
        entity_id: local.id,
        local_updated_at: local.updated_at,
        incoming_updated_at: incoming.updated_at,
        winner,
        resolved_at: cx.now,
    })?;
    cx.result.conflicts += 1;
    tracing::info!(
        "Conflict on {} {} resolved, {} wins (local {}, remote {})",
        T::TABLE,
        local.id,
        winner,
        local.updated_at,
        incoming.updated_at
    );

    match winner {
        ConflictWinner::Local => Ok(()),
        ConflictWinner::Remote => overwrite(cx, incoming, incoming_hash, revision),
    }
}

/// Replace the local copy with a remote row, unless a facade write got there first.
fn overwrite<T: RemoteSchema>(
    cx: &mut CycleContext<'_>,
    incoming: Entity<T>,
    hash: String,
    revision: i64,
) -> Result<()> {
    let mut entity = incoming;
    entity.sync = SyncMeta {
        revision,
        ..SyncMeta::synced(hash, cx.now)
    };
    if cx.store.replace_if_revision(&entity, revision)? {
        cx.result.pulled += 1;
        cx.result.record_success();
        cx.changed(T::TABLE, entity.id, EntityChange::Pulled);
    } else {
        tracing::debug!("{} {} changed locally during pull", T::TABLE, entity.id);
    }
    Ok(())
}

/// Drop synced local copies whose remote row is gone.
fn prune_missing<T: RemoteSchema>(
    cx: &mut CycleContext<'_>,
    seen: &HashSet<EntityId>,
) -> Result<()> {
    for local in cx.store.synced::<T>()? {
        if seen.contains(&local.id) {
            continue;
        }
        if cx
            .store
            .delete_if_revision::<T>(&local.id, local.sync.revision)?
        {
            tracing::info!("{} {} was deleted remotely", T::TABLE, local.id);
            cx.result.deleted += 1;
            cx.result.record_success();
            cx.changed(T::TABLE, local.id, EntityChange::RemovedRemotely);
        }
    }
    Ok(())
}
