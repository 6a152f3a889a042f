//! orchid-core - Local-first data layer for Orchidarium
//!
//! Entity models, an embedded `SQLite` store that serves every read, and a
//! sync engine that reconciles it with a Supabase (PostgREST) backend in the
//! background. Callers use [`services::SyncService`] and the typed
//! [`services::Repository`] it hands out; nothing here blocks on the network.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;


pub use config::{RemoteConfig, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use error::{Error, Result};
pub use models::{Entity, EntityId, EntityKind, SyncStatus};
pub use services::{Repository, StoreEvent, SyncService};
pub use state::SyncPhase;
pub use sync::{SyncResult, SyncTrigger};
