// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Routes group requests to the workers of the pool.

use crate::cluster::ClusterCoordinator;
use crate::registry::WorkerRegistry;
use crate::request::GroupRequest;
use crate::worker::{LocalWorkerLink, WorkerThread};
use parex_channel::ParexChannel;
use parex_execution_exports::{ExecutionConfig, ExecutionError, RouterMode, ServicePack};
use parex_logging::parex_trace;
use parex_models::worker_id::WorkerId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// Front of the worker pool, in local or cluster mode
pub(crate) struct Router {
    registry: Arc<WorkerRegistry>,
    /// how long a dispatch waits for a ready worker
    dispatch_wait: Duration,
    local_threads: Mutex<Vec<JoinHandle<()>>>,
    coordinator: Mutex<Option<ClusterCoordinator>>,
}

impl Router {
    /// Build the pool described by `config` and wait until it has capacity
    pub fn start(
        config: &ExecutionConfig,
        service_pack: &Arc<ServicePack>,
    ) -> Result<Arc<Router>, ExecutionError> {
        let router = match config.mode {
            RouterMode::Local => Self::start_local(config, service_pack)?,
            RouterMode::Cluster => Self::start_cluster(config)?,
        };
        Ok(Arc::new(router))
    }

    fn new(registry: Arc<WorkerRegistry>, dispatch_wait: Duration) -> Self {
        Router {
            registry,
            dispatch_wait,
            local_threads: Mutex::new(Vec::new()),
            coordinator: Mutex::new(None),
        }
    }

    fn start_local(
        config: &ExecutionConfig,
        service_pack: &Arc<ServicePack>,
    ) -> Result<Router, ExecutionError> {
        if config.local_worker_count == 0 {
            return Err(ExecutionError::ConfigError(
                "local_worker_count must be at least 1".to_string(),
            ));
        }
        let registry = Arc::new(WorkerRegistry::new());
        let router = Router::new(registry.clone(), config.worker_ready_timeout);
        for index in 0..config.local_worker_count {
            let worker_id = WorkerId::local(index);
            let (mailbox_tx, mailbox_rx) = ParexChannel::new(
                format!("execution_{}", worker_id),
                Some(config.worker_mailbox_size),
            );
            let spawned = registry
                .register(
                    worker_id.clone(),
                    Arc::new(LocalWorkerLink::new(worker_id.clone(), mailbox_tx)),
                )
                .and_then(|registration| {
                    WorkerThread::spawn(
                        worker_id,
                        mailbox_rx,
                        service_pack.clone(),
                        registry.clone(),
                        registration,
                    )
                });
            match spawned {
                Ok(handle) => router.local_threads.lock().push(handle),
                Err(err) => {
                    router.stop();
                    return Err(err);
                }
            }
        }
        if !registry.wait_for_ready_worker(config.worker_ready_timeout) {
            router.stop();
            return Err(ExecutionError::NoAvailableWorker(
                config.worker_ready_timeout,
            ));
        }
        info!(
            "execution pool started with {} local workers",
            config.local_worker_count
        );
        Ok(router)
    }

    fn start_cluster(config: &ExecutionConfig) -> Result<Router, ExecutionError> {
        let registry = Arc::new(WorkerRegistry::new());
        let coordinator = ClusterCoordinator::start(&config.cluster, registry.clone())?;
        let formation_timeout = config.cluster.formation_timeout;
        info!(
            "waiting up to {:?} for cluster workers on {}",
            formation_timeout,
            coordinator.local_addr()
        );
        if !registry.wait_for_ready_worker(formation_timeout) {
            for link in registry.close() {
                link.close();
            }
            coordinator.stop();
            return Err(ExecutionError::ClusterFormationTimeout(formation_timeout));
        }
        let router = Router::new(registry, config.worker_ready_timeout);
        *router.coordinator.lock() = Some(coordinator);
        let (registered, _) = router.worker_counts();
        info!("cluster formed with {} workers", registered);
        Ok(router)
    }

    /// Hand `request` to the next ready worker.
    /// A worker that cannot be reached is removed from the pool.
    pub fn dispatch(&self, request: GroupRequest) -> Result<WorkerId, ExecutionError> {
        let selected = self.registry.select(self.dispatch_wait)?;
        parex_trace!("execution_router.dispatch", {
            "worker": selected.worker_id.to_string(),
            "request_id": request.request_id(),
            "transactions": request.len()
        });
        if let Err(err) = selected.link.submit(request) {
            if let ExecutionError::WorkerUnreachable(..) = err {
                warn!("removing {} from the pool: {}", selected.worker_id, err);
                self.registry.unregister(selected.registration);
            }
            return Err(err);
        }
        Ok(selected.worker_id)
    }

    /// (registered, ready) worker counts
    pub fn worker_counts(&self) -> (usize, usize) {
        self.registry.counts()
    }

    /// Stop the workers once their queued groups are done, and release the listener
    pub fn stop(&self) {
        for link in self.registry.close() {
            link.close();
        }
        if let Some(coordinator) = self.coordinator.lock().take() {
            coordinator.stop();
        }
        for handle in self.local_threads.lock().drain(..) {
            if handle.join().is_err() {
                warn!("an execution worker thread panicked");
            }
        }
    }
}
