//! Change notifications for UI layers

use tokio::sync::broadcast;

use crate::models::EntityId;
use crate::state::SyncPhase;
use crate::sync::SyncResult;

const EVENT_CAPACITY: usize = 256;

/// What happened to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityChange {
    Created,
    Updated,
    Deleted,
    /// Push acknowledged; now `Synced`
    Synced,
    /// Push rejected; now `Error`
    Failed,
    /// Overwritten or inserted from the remote
    Pulled,
    /// Deleted on another device
    RemovedRemotely,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    EntityChanged {
        table: &'static str,
        id: EntityId,
        change: EntityChange,
    },
    PhaseChanged(SyncPhase),
    SyncCompleted(SyncResult),
}

/// Broadcast channel shared by repositories and the sync engine.
///
/// Slow subscribers lag and miss events rather than blocking writers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; having none is fine.
    pub fn publish(&self, event: StoreEvent) {
        self.sender.send(event).ok();
    }

    pub(crate) fn entity_changed(&self, table: &'static str, id: EntityId, change: EntityChange) {
        self.publish(StoreEvent::EntityChanged { table, id, change });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
