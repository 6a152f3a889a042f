//! Background sync worker
//!
//! A single task owns all background cycles. Triggers arriving while a cycle
//! runs are drained afterwards and coalesced into one follow-up cycle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;

use super::engine::SyncEngine;
use super::result::CycleMode;

/// Why a background cycle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTrigger {
    /// A repository write; debounced
    LocalChange,
    /// Network or auth came back
    ConnectivityRestored,
    /// Explicit request; runs a full cycle
    Manual,
    /// Periodic timer
    Periodic,
}

/// Cheap handle for queueing triggers to the worker.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    sender: mpsc::UnboundedSender<SyncTrigger>,
}

impl SyncHandle {
    /// Queue a trigger. Never blocks; dropped silently once the worker stopped.
    pub fn trigger(&self, trigger: SyncTrigger) {
        if self.sender.send(trigger).is_err() {
            tracing::debug!("Sync worker stopped, dropping {:?} trigger", trigger);
        }
    }
}

pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    monitor: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    triggers: mpsc::UnboundedReceiver<SyncTrigger>,
    shutdown: CancellationToken,
}

impl SyncWorker {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        monitor: Arc<ConnectivityMonitor>,
        config: SyncConfig,
        shutdown: CancellationToken,
    ) -> (SyncHandle, JoinHandle<()>) {
        let (sender, triggers) = mpsc::unbounded_channel();
        let worker = Self {
            engine,
            monitor,
            config,
            triggers,
            shutdown,
        };
        let task = tokio::spawn(worker.run());
        (SyncHandle { sender }, task)
    }

    async fn run(mut self) {
        let mut connectivity = self.monitor.subscribe();
        let mut was_online = connectivity.borrow_and_update().is_online();
        let mut interval = self.config.sync_interval().map(|period| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        tracing::debug!("Sync worker started");

        loop {
            let trigger = tokio::select! {
                () = self.shutdown.cancelled() => break,
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = connectivity.borrow_and_update().is_online();
                    let restored = online && !was_online;
                    was_online = online;
                    if !restored {
                        continue;
                    }
                    SyncTrigger::ConnectivityRestored
                },
                () = tick(interval.as_mut()) => SyncTrigger::Periodic,
            };

            if trigger == SyncTrigger::LocalChange && !self.debounce().await {
                break;
            }
            let mode = self.coalesce(trigger);

            if !self.monitor.is_online_and_authenticated() {
                tracing::debug!("Offline, deferring {:?} sync", trigger);
                continue;
            }
            self.engine.run_cycle(mode, &self.shutdown).await;
        }

        tracing::debug!("Sync worker stopped");
    }

    /// Wait out the debounce window. Returns `false` on shutdown.
    async fn debounce(&self) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = time::sleep(self.config.debounce()) => true,
        }
    }

    /// Drain queued triggers into the cycle about to run.
    fn coalesce(&mut self, first: SyncTrigger) -> CycleMode {
        let mut mode = mode_for(first);
        let mut drained = 0_usize;
        while let Ok(trigger) = self.triggers.try_recv() {
            drained += 1;
            if mode_for(trigger) == CycleMode::Full {
                mode = CycleMode::Full;
            }
        }
        if drained > 0 {
            tracing::debug!("Coalesced {} queued sync triggers", drained);
        }
        mode
    }
}

const fn mode_for(trigger: SyncTrigger) -> CycleMode {
    match trigger {
        SyncTrigger::Manual => CycleMode::Full,
        SyncTrigger::LocalChange | SyncTrigger::ConnectivityRestored | SyncTrigger::Periodic => {
            CycleMode::Background
        }
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
