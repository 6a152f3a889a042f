//! Local storage layer for Orchidarium

mod connection;
mod local_store;
mod migrations;
mod sync_log;
mod tombstones;

pub use connection::Database;
pub use local_store::LocalStore;
pub use sync_log::NewConflict;
pub use tombstones::Tombstone;
