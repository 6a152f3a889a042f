//! Dependency container wiring the store, engine, worker and event bus

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{
    EntityKind, Event, Family, Genus, Location, Mount, Plant, Source, Species, Substrate,
};
use crate::remote::{RemoteAdapter, RemoteSchema, RemoteStore};
use crate::state::SyncPhase;
use crate::sync::{
    CycleMode, KindHandler, KindSync, SyncEngine, SyncHandle, SyncResult, SyncTrigger, SyncWorker,
};

use super::events::{EventBus, StoreEvent};
use super::repository::Repository;

/// State shared by the service and every repository it hands out
pub(crate) struct ServiceCore {
    pub(crate) store: Arc<LocalStore>,
    pub(crate) engine: Arc<SyncEngine>,
    pub(crate) monitor: Arc<ConnectivityMonitor>,
    pub(crate) events: EventBus,
    worker: Option<SyncHandle>,
}

impl ServiceCore {
    /// Queue a debounced background push after a local write.
    pub(crate) fn local_change(&self) {
        if let Some(worker) = &self.worker {
            worker.trigger(SyncTrigger::LocalChange);
        }
    }

    pub(crate) async fn force_full_sync(&self, cancel: &CancellationToken) -> SyncResult {
        if !self.monitor.is_online_and_authenticated() {
            tracing::info!("Skipping full sync while offline");
            let result = SyncResult::offline();
            self.events
                .publish(StoreEvent::SyncCompleted(result.clone()));
            return result;
        }
        self.engine.run_cycle(CycleMode::Full, cancel).await
    }
}

/// Builder for [`SyncService`].
pub struct SyncServiceBuilder {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    monitor: Arc<ConnectivityMonitor>,
    config: SyncConfig,
    kinds: Vec<Arc<dyn KindSync>>,
}

impl SyncServiceBuilder {
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an entity kind. Register parents before children; pushes
    /// follow registration order and deletions the reverse.
    #[must_use]
    pub fn register<T: RemoteSchema>(mut self) -> Self {
        if !self.kinds.iter().any(|kind| kind.table() == T::TABLE) {
            self.kinds.push(Arc::new(KindHandler::<T>::new()));
        }
        self
    }

    /// Register every orchid collection kind, parents first.
    #[must_use]
    pub fn register_defaults(self) -> Self {
        self.register::<Family>()
            .register::<Genus>()
            .register::<Species>()
            .register::<Location>()
            .register::<Mount>()
            .register::<Source>()
            .register::<Substrate>()
            .register::<Plant>()
            .register::<Event>()
    }

    /// Build the service. With `auto_sync` enabled this spawns the background
    /// worker and must be called from within a Tokio runtime.
    pub fn build(self) -> Result<SyncService> {
        self.config.validate()?;
        let builder = if self.kinds.is_empty() {
            self.register_defaults()
        } else {
            self
        };

        let events = EventBus::new();
        let engine = Arc::new(SyncEngine::new(
            builder.store.clone(),
            RemoteAdapter::new(builder.remote),
            builder.kinds,
            &builder.config,
            events.clone(),
        ));
        tracing::info!("Sync engine ready for {}", engine.tables().join(", "));

        let shutdown = CancellationToken::new();
        let (worker, task) = if builder.config.auto_sync {
            tokio::runtime::Handle::try_current().map_err(|_| {
                Error::Config(
                    "the sync worker needs a Tokio runtime; disable auto_sync to build outside one"
                        .to_string(),
                )
            })?;
            let (handle, task) = SyncWorker::spawn(
                engine.clone(),
                builder.monitor.clone(),
                builder.config.clone(),
                shutdown.clone(),
            );
            (Some(handle), Some(task))
        } else {
            (None, None)
        };

        Ok(SyncService {
            core: Arc::new(ServiceCore {
                store: builder.store,
                engine,
                monitor: builder.monitor,
                events,
                worker,
            }),
            shutdown,
            task: Mutex::new(task),
        })
    }
}

/// Entry point: typed repositories over a shared store and sync engine.
///
/// No global state; every dependency is passed in through [`SyncService::builder`].
pub struct SyncService {
    core: Arc<ServiceCore>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    pub fn builder(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> SyncServiceBuilder {
        SyncServiceBuilder {
            store,
            remote,
            monitor,
            config: SyncConfig::default(),
            kinds: Vec::new(),
        }
    }

    /// Repository for a registered entity kind.
    pub fn repository<T: EntityKind>(&self) -> Result<Repository<T>> {
        if !self.core.engine.tables().contains(&T::TABLE) {
            return Err(Error::InvalidInput(format!(
                "{} is not registered for sync",
                T::TABLE
            )));
        }
        Ok(Repository::new(self.core.clone()))
    }

    /// Push and pull everything now, bypassing backoff and retry caps.
    pub async fn force_full_sync(&self) -> SyncResult {
        self.core.force_full_sync(&self.shutdown).await
    }

    /// Like [`Self::force_full_sync`], stopping early once `cancel` fires.
    pub async fn force_full_sync_with(&self, cancel: &CancellationToken) -> SyncResult {
        self.core.force_full_sync(cancel).await
    }

    /// Ask the background worker for a full cycle without waiting for it.
    pub fn request_sync(&self) {
        if let Some(worker) = &self.core.worker {
            worker.trigger(SyncTrigger::Manual);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.core.events.subscribe()
    }

    pub fn phase(&self) -> SyncPhase {
        self.core.engine.phase()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.core.engine.watch_phase()
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.core.store
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.core.monitor
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.core.engine
    }

    /// Stop the background worker, letting an in-flight remote call finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::warn!("Sync worker ended abnormally: {error}");
            }
        }
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;

    fn builder() -> SyncServiceBuilder {
        SyncService::builder(
            Arc::new(LocalStore::open_in_memory().unwrap()),
            Arc::new(InMemoryRemoteStore::new()),
            Arc::new(ConnectivityMonitor::online()),
        )
    }

    #[test]
    fn build_registers_all_kinds_parents_first() {
        let service = builder()
            .config(SyncConfig::default().without_auto_sync())
            .build()
            .unwrap();
        assert_eq!(
            service.core.engine.tables(),
            vec![
                "families",
                "genera",
                "species",
                "locations",
                "mounts",
                "sources",
                "substrates",
                "plants",
                "events"
            ]
        );
    }

    #[test]
    fn repository_requires_registration() {
        let service = builder()
            .config(SyncConfig::default().without_auto_sync())
            .register::<Family>()
            .register::<Family>()
            .build()
            .unwrap();
        assert_eq!(service.core.engine.tables(), vec!["families"]);
        assert!(service.repository::<Family>().is_ok());
        assert!(matches!(
            service.repository::<Plant>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn auto_sync_outside_runtime_is_a_config_error() {
        assert!(matches!(builder().build(), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = builder()
            .config(SyncConfig::default().with_max_attempts(0).without_auto_sync())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_stops_worker() {
        let service = builder().build().unwrap();
        service.shutdown().await;
        assert!(service.task.lock().unwrap().is_none());
        // Triggers after shutdown are dropped quietly
        service.request_sync();
    }
}
