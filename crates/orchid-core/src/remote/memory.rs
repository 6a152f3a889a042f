//! In-memory remote store
//!
//! Behaves like the REST backend (table per kind, rows keyed by id, `since`
//! filtering) without a network. Supports offline simulation, per-row
//! failure injection and pausing a write mid-flight.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::models::EntityId;

use super::mapping::timestamp_from_remote;
use super::{RemoteError, RemoteResult, RemoteRow, RemoteStore};

/// Number of remote operations served, by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteCalls {
    pub fetches: usize,
    pub upserts: usize,
    pub deletes: usize,
}

impl RemoteCalls {
    pub const fn total(&self) -> usize {
        self.fetches + self.upserts + self.deletes
    }
}

#[derive(Debug, Default)]
struct Gate {
    entered: Notify,
    released: Notify,
}

/// An upsert paused by [`InMemoryRemoteStore::hold_next_upsert`].
#[derive(Debug, Clone)]
pub struct HeldUpsert {
    gate: Arc<Gate>,
}

impl HeldUpsert {
    /// Wait until the paused upsert has been issued.
    pub async fn entered(&self) {
        self.gate.entered.notified().await;
    }

    /// Let the paused upsert complete.
    pub fn release(&self) {
        self.gate.released.notify_one();
    }
}

/// Remote store backed by process memory
#[derive(Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<HashMap<String, BTreeMap<String, RemoteRow>>>,
    rejections: Mutex<HashMap<String, RemoteError>>,
    held_upsert: Mutex<Option<Arc<Gate>>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject every write to this id with `error` until [`Self::clear_rejections`].
    pub fn reject_id(&self, id: &EntityId, error: RemoteError) {
        lock(&self.rejections).insert(id.as_str(), error);
    }

    pub fn clear_rejections(&self) {
        lock(&self.rejections).clear();
    }

    /// Pause the next upsert before it is applied, until the handle releases it.
    pub fn hold_next_upsert(&self) -> HeldUpsert {
        let gate = Arc::new(Gate::default());
        *lock(&self.held_upsert) = Some(Arc::clone(&gate));
        HeldUpsert { gate }
    }

    /// Write a row directly, as another device would.
    pub fn insert_row(&self, table: &str, row: RemoteRow) {
        let id = row_id(&row).unwrap_or_default();
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
    }

    /// Remove a row directly, as another device would.
    pub fn remove_row(&self, table: &str, id: &EntityId) -> Option<RemoteRow> {
        lock(&self.tables)
            .get_mut(table)
            .and_then(|rows| rows.remove(&id.as_str()))
    }

    pub fn row(&self, table: &str, id: &EntityId) -> Option<RemoteRow> {
        lock(&self.tables)
            .get(table)
            .and_then(|rows| rows.get(&id.as_str()).cloned())
    }

    pub fn rows(&self, table: &str) -> Vec<RemoteRow> {
        lock(&self.tables)
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> RemoteCalls {
        RemoteCalls {
            fetches: self.fetches.load(Ordering::SeqCst),
            upserts: self.upserts.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Transport("network is unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_rejected(&self, id: &str) -> RemoteResult<()> {
        match lock(&self.rejections).get(id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn fetch_all(&self, table: &str, since: Option<i64>) -> RemoteResult<Vec<RemoteRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let tables = lock(&self.tables);
        let mut rows: Vec<(i64, RemoteRow)> = tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .map(|row| (row_updated_at(row), row.clone()))
                    .filter(|(updated_at, _)| !matches!(since, Some(since) if *updated_at < since))
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        rows.sort_by_key(|(updated_at, _)| *updated_at);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn upsert(&self, table: &str, row: RemoteRow) -> RemoteResult<RemoteRow> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let held = lock(&self.held_upsert).take();
        if let Some(gate) = held {
            gate.entered.notify_one();
            gate.released.notified().await;
        }
        self.check_online()?;
        let id = row_id(&row)
            .ok_or_else(|| RemoteError::SchemaMismatch(format!("{table} row without id")))?;
        self.check_rejected(&id)?;

        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .insert(id, row.clone());
        Ok(row)
    }

    async fn delete(&self, table: &str, id: &EntityId) -> RemoteResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let id = id.as_str();
        self.check_rejected(&id)?;

        if let Some(rows) = lock(&self.tables).get_mut(table) {
            rows.remove(&id);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn row_id(row: &RemoteRow) -> Option<String> {
    row.get("id").and_then(Value::as_str).map(str::to_string)
}

fn row_updated_at(row: &RemoteRow) -> i64 {
    row.get("updated_at")
        .and_then(timestamp_from_remote)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(id: &EntityId, updated_at: &str) -> RemoteRow {
        let Value::Object(row) = json!({
            "id": id.as_str(),
            "name": "Orchidaceae",
            "updated_at": updated_at,
        }) else {
            unreachable!()
        };
        row
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_since_filter_is_inclusive_and_ordered() {
        let store = InMemoryRemoteStore::new();
        let newer = EntityId::new();
        let older = EntityId::new();
        store.insert_row("families", row(&newer, "2024-01-01T00:00:02.000Z"));
        store.insert_row("families", row(&older, "2024-01-01T00:00:01.000Z"));

        let all = store.fetch_all("families", None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["id"], json!(older.as_str()));

        let since = 1_704_067_202_000;
        let recent = store.fetch_all("families", Some(since)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0]["id"], json!(newer.as_str()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_and_rejections() {
        let store = InMemoryRemoteStore::new();
        let id = EntityId::new();

        store.set_offline(true);
        let error = store
            .upsert("families", row(&id, "2024-01-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert!(error.is_transport());
        store.set_offline(false);

        store.reject_id(&id, RemoteError::PermissionDenied("rls".to_string()));
        let error = store.delete("families", &id).await.unwrap_err();
        assert_eq!(error, RemoteError::PermissionDenied("rls".to_string()));
        store.clear_rejections();

        store
            .upsert("families", row(&id, "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        assert!(store.row("families", &id).is_some());
        assert_eq!(
            store.calls(),
            RemoteCalls {
                fetches: 0,
                upserts: 2,
                deletes: 1,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_held_upsert_applies_after_release() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let id = EntityId::new();
        let held = store.hold_next_upsert();

        let task = tokio::spawn({
            let store = Arc::clone(&store);
            let row = row(&id, "2024-01-01T00:00:00Z");
            async move { store.upsert("families", row).await }
        });
        held.entered().await;
        assert!(store.row("families", &id).is_none());

        held.release();
        task.await.unwrap().unwrap();
        assert!(store.row("families", &id).is_some());

        // Only the next upsert is held
        store
            .upsert("families", row(&EntityId::new(), "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
    }
}
