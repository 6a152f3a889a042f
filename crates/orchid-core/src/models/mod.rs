//! Data models for Orchidarium

mod collection;
mod entity;
mod filter;
mod growing;
mod sync_conflict;
mod taxonomy;

pub use collection::{Event, EventKind, Plant};
pub use entity::{Entity, EntityId, EntityKind, SyncMeta, SyncStatus};
pub use filter::{EntityFilter, EntityStatistics, OwnerFilter};
pub use growing::{Location, Mount, Source, Substrate};
pub use sync_conflict::{ConflictWinner, SyncConflict};
pub use taxonomy::{Family, Genus, Species};
