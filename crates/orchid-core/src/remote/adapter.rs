//! Typed access to a remote store

use std::sync::Arc;

use crate::models::{Entity, EntityId};

use super::mapping::{from_remote_row, to_remote_row, RemoteSchema};
use super::{RemoteResult, RemoteStore};

/// Maps typed entities onto a [`RemoteStore`].
#[derive(Clone)]
pub struct RemoteAdapter {
    store: Arc<dyn RemoteStore>,
}

impl RemoteAdapter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Fetch rows of `T`'s table, optionally only those updated at or after `since`.
    ///
    /// The outer error means the fetch itself failed. Rows that do not parse
    /// are returned as individual errors so one bad row cannot hide the rest.
    pub async fn fetch_all<T: RemoteSchema>(
        &self,
        since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteResult<Entity<T>>>> {
        let rows = self.store.fetch_all(T::TABLE, since).await?;
        tracing::debug!("Fetched {} rows from {}", rows.len(), T::TABLE);
        Ok(rows.into_iter().map(from_remote_row::<T>).collect())
    }

    /// Upsert an entity, returning the remote's stored representation.
    ///
    /// The write counts as done once the store accepts it. A returned row that
    /// does not parse is logged and yields `None`.
    pub async fn upsert<T: RemoteSchema>(
        &self,
        entity: &Entity<T>,
    ) -> RemoteResult<Option<Entity<T>>> {
        let row = to_remote_row(entity)?;
        let stored = self.store.upsert(T::TABLE, row).await?;
        match from_remote_row(stored) {
            Ok(stored) => Ok(Some(stored)),
            Err(error) => {
                tracing::warn!(
                    "{} {} was stored but its returned row did not parse: {error}",
                    T::TABLE,
                    entity.id
                );
                Ok(None)
            }
        }
    }

    pub async fn delete<T: RemoteSchema>(&self, id: &EntityId) -> RemoteResult<()> {
        self.store.delete(T::TABLE, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Family, Plant};
    use crate::remote::{InMemoryRemoteStore, RemoteError, RemoteResult, RemoteRow, RemoteStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn family(name: &str) -> Entity<Family> {
        Entity::new(Family {
            name: name.to_string(),
            description: None,
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_fetch_delete() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let adapter = RemoteAdapter::new(remote.clone());
        let entity = family("Orchidaceae");

        let stored = adapter.upsert(&entity).await.unwrap().unwrap();
        assert_eq!(stored.data, entity.data);
        assert!(remote.row("families", &entity.id).is_some());

        let fetched = adapter.fetch_all::<Family>(None).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].as_ref().unwrap().id, entity.id);

        adapter.delete::<Family>(&entity.id).await.unwrap();
        assert!(remote.row("families", &entity.id).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_rows_are_reported_individually() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let adapter = RemoteAdapter::new(remote.clone());
        adapter.upsert(&family("Orchidaceae")).await.unwrap();

        let serde_json::Value::Object(bad) = json!({
            "id": "not-a-uuid",
            "name": "Broken",
            "updated_at": 1
        }) else {
            unreachable!()
        };
        remote.insert_row("families", bad);

        let fetched = adapter.fetch_all::<Family>(None).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched.iter().filter(|row| row.is_ok()).count(), 1);
        assert!(fetched
            .iter()
            .any(|row| matches!(row, Err(RemoteError::SchemaMismatch(_)))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_kinds_use_their_own_tables() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let adapter = RemoteAdapter::new(remote.clone());
        adapter.upsert(&family("Orchidaceae")).await.unwrap();

        assert!(adapter.fetch_all::<Plant>(None).await.unwrap().is_empty());
        assert_eq!(remote.rows("families").len(), 1);
    }

    /// Accepts every write but answers with a row missing required columns
    struct TruncatingStore;

    #[async_trait]
    impl RemoteStore for TruncatingStore {
        async fn fetch_all(
            &self,
            _table: &str,
            _since: Option<i64>,
        ) -> RemoteResult<Vec<RemoteRow>> {
            Ok(Vec::new())
        }

        async fn upsert(&self, _table: &str, _row: RemoteRow) -> RemoteResult<RemoteRow> {
            let serde_json::Value::Object(row) = json!({ "name": "Orchidaceae" }) else {
                unreachable!()
            };
            Ok(row)
        }

        async fn delete(&self, _table: &str, _id: &EntityId) -> RemoteResult<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unparsable_upsert_response_still_succeeds() {
        let adapter = RemoteAdapter::new(Arc::new(TruncatingStore));
        let stored = adapter.upsert(&family("Orchidaceae")).await.unwrap();
        assert_eq!(stored, None);
    }
}
