//! Bidirectional sync between the local store and the remote backend

mod engine;
mod kind;
mod result;
mod retry;
mod worker;

pub use engine::SyncEngine;
pub use result::{CycleMode, SyncResult};
pub use retry::{RetryPolicy, RetryState};
pub use worker::{SyncHandle, SyncTrigger, SyncWorker};

pub(crate) use kind::{KindHandler, KindSync};
