//! Push / pull / reconcile cycle

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::db::LocalStore;
use crate::error::Result;
use crate::models::EntityId;
use crate::remote::{RemoteAdapter, RemoteError};
use crate::services::{EntityChange, EventBus, StoreEvent};
use crate::state::SyncPhase;
use crate::util::now_millis;

use super::kind::KindSync;
use super::result::{CycleMode, SyncResult};
use super::retry::RetryPolicy;

/// Reconciles the local store with the remote, one cycle at a time.
///
/// Cycles are serialized by an internal lock; a cycle requested while another
/// runs waits for it to finish. Kinds are processed in registration order
/// (parents first) and tombstones in reverse order (children first).
pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: RemoteAdapter,
    kinds: Vec<Arc<dyn KindSync>>,
    policy: RetryPolicy,
    incremental_pull: bool,
    pull_overlap: i64,
    conflict_log_limit: usize,
    events: EventBus,
    phase: watch::Sender<SyncPhase>,
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub(crate) fn new(
        store: Arc<LocalStore>,
        remote: RemoteAdapter,
        kinds: Vec<Arc<dyn KindSync>>,
        config: &SyncConfig,
        events: EventBus,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            store,
            remote,
            kinds,
            policy: RetryPolicy::from_config(config),
            incremental_pull: config.incremental_pull,
            pull_overlap: i64::try_from(config.pull_overlap().as_millis()).unwrap_or(i64::MAX),
            conflict_log_limit: config.conflict_log_limit,
            events,
            phase,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Tables of the registered kinds, in push order
    pub fn tables(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|kind| kind.table()).collect()
    }

    /// Run one full push/pull/reconcile cycle.
    ///
    /// Never fails: per-entity errors are counted in the result, and a local
    /// storage failure aborts the cycle with the phase left at `Error`.
    pub async fn run_cycle(&self, mode: CycleMode, cancel: &CancellationToken) -> SyncResult {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();
        tracing::debug!("Starting {:?} sync cycle", mode);

        let mut cx = CycleContext::new(
            &self.store,
            &self.remote,
            self.policy,
            mode,
            self.incremental_pull,
            self.pull_overlap,
            cancel,
        );
        let outcome = self.drive(&mut cx).await;
        let mut result = cx.result;
        result.duration = started.elapsed();

        match outcome {
            Ok(()) => self.set_phase(SyncPhase::Idle),
            Err(error) => {
                tracing::error!("Sync cycle aborted: {error}");
                result.failed += 1;
                result.error_messages.push(format!("local store: {error}"));
                self.set_phase(SyncPhase::Error);
            }
        }

        tracing::info!(
            "Sync cycle finished in {:?}: {} processed, {} ok, {} failed, {} pushed, {} pulled, {} deleted, {} conflicts",
            result.duration,
            result.total_processed,
            result.successful,
            result.failed,
            result.pushed,
            result.pulled,
            result.deleted,
            result.conflicts
        );
        self.events
            .publish(StoreEvent::SyncCompleted(result.clone()));
        result
    }

    async fn drive(&self, cx: &mut CycleContext<'_>) -> Result<()> {
        self.set_phase(SyncPhase::Pushing);
        for kind in self.kinds.iter().rev() {
            kind.push_deletes(cx).await?;
        }
        for kind in &self.kinds {
            kind.push_changes(cx).await?;
        }

        self.set_phase(SyncPhase::Pulling);
        for kind in &self.kinds {
            kind.pull(cx).await?;
        }

        self.set_phase(SyncPhase::Reconciling);
        for (table, mark) in cx.marks.drain(..) {
            self.store.advance_high_water_mark(table, mark)?;
        }
        if cx.result.conflicts > 0 {
            let pruned = self.store.prune_conflicts(self.conflict_log_limit)?;
            if pruned > 0 {
                tracing::debug!("Pruned {} old conflict log entries", pruned);
            }
        }
        for (table, id, change) in cx.changes.drain(..) {
            self.events.entity_changed(table, id, change);
        }
        Ok(())
    }

    fn set_phase(&self, phase: SyncPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            self.events.publish(StoreEvent::PhaseChanged(phase));
        }
    }
}

/// Mutable state of one running cycle, handed to each kind in turn.
pub(crate) struct CycleContext<'a> {
    pub(crate) store: &'a LocalStore,
    pub(crate) remote: &'a RemoteAdapter,
    pub(crate) policy: RetryPolicy,
    pub(crate) mode: CycleMode,
    pub(crate) incremental_pull: bool,
    /// Milliseconds re-read below the high-water mark on incremental pulls
    pub(crate) pull_overlap: i64,
    pub(crate) now: i64,
    pub(crate) result: SyncResult,
    cancel: &'a CancellationToken,
    remote_down: bool,
    marks: Vec<(&'static str, i64)>,
    changes: Vec<(&'static str, EntityId, EntityChange)>,
}

impl<'a> CycleContext<'a> {
    pub(crate) fn new(
        store: &'a LocalStore,
        remote: &'a RemoteAdapter,
        policy: RetryPolicy,
        mode: CycleMode,
        incremental_pull: bool,
        pull_overlap: i64,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            remote,
            policy,
            mode,
            incremental_pull,
            pull_overlap,
            now: now_millis(),
            result: SyncResult::default(),
            cancel,
            remote_down: false,
            marks: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// Whether another remote call may be issued in this cycle.
    pub(crate) fn may_call_remote(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.result.cancelled {
                tracing::info!("Sync cycle cancelled");
            }
            self.result.cancelled = true;
            return false;
        }
        !self.remote_down
    }

    pub(crate) const fn should_attempt(&self, attempts: u32, next_retry_at: Option<i64>) -> bool {
        self.policy
            .should_attempt(self.mode, attempts, next_retry_at, self.now)
    }

    /// Count a failed remote call. Transport failures end remote work for the cycle.
    pub(crate) fn remote_failed(&mut self, message: String, error: &RemoteError) {
        if error.is_transport() {
            if !self.remote_down {
                tracing::warn!("Remote unreachable, deferring remaining work: {error}");
            }
            self.remote_down = true;
        } else {
            tracing::warn!("{message}");
        }
        self.result.record_failure(message);
    }

    pub(crate) fn changed(&mut self, table: &'static str, id: EntityId, change: EntityChange) {
        self.changes.push((table, id, change));
    }

    pub(crate) fn pulled_through(&mut self, table: &'static str, mark: i64) {
        self.marks.push((table, mark));
    }
}
