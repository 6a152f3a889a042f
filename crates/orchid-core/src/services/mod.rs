//! Caller-facing services: repositories, the sync service and change events

mod events;
mod repository;
mod sync_service;

pub use events::{EntityChange, EventBus, StoreEvent};
pub use repository::Repository;
pub use sync_service::{SyncService, SyncServiceBuilder};
