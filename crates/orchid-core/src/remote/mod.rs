//! Remote store boundary
//!
//! The only part of the crate aware of the backend's row representation.
//! [`RemoteStore`] moves untyped JSON rows; [`RemoteAdapter`] maps them to and
//! from typed [`Entity`](crate::models::Entity) records.

mod adapter;
mod error;
mod mapping;
mod memory;
mod supabase;

use async_trait::async_trait;

use crate::models::EntityId;

pub use adapter::RemoteAdapter;
pub use error::{ErrorClass, RemoteError};
pub use mapping::{from_remote_row, to_remote_row, RemoteSchema};
pub use memory::{HeldUpsert, InMemoryRemoteStore, RemoteCalls};
pub use supabase::SupabaseRestStore;

/// A row as the backend returns it: column name to JSON value
pub type RemoteRow = serde_json::Map<String, serde_json::Value>;

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Table-per-kind remote backend with REST-style operations
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every row of `table`, or only rows with `updated_at >= since` (Unix ms)
    async fn fetch_all(&self, table: &str, since: Option<i64>) -> RemoteResult<Vec<RemoteRow>>;

    /// Insert or update a row keyed by its `id`, returning the stored row
    async fn upsert(&self, table: &str, row: RemoteRow) -> RemoteResult<RemoteRow>;

    /// Delete the row with this id. Deleting a missing row succeeds.
    async fn delete(&self, table: &str, id: &EntityId) -> RemoteResult<()>;
}
