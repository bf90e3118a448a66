// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This module implements an execution controller.
//! See `parex-execution-exports/controller_traits.rs` for functional details.

use crate::grouper::Grouper;
use crate::orchestrator::ParallelTransactionExecutor;
use crate::requestor::Requestor;
use crate::router::Router;
use parex_execution_exports::{
    ExecutionConfig, ExecutionController, ExecutionError, ExecutionManager, ExecutionStats,
    ServicePack,
};
use parex_models::{
    address::Address,
    chain::ChainId,
    trace::TransactionTrace,
    transaction::{Transaction, TransactionId},
};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Admission state shared by the controllers and the manager
struct ServiceStatus {
    /// false once the manager started stopping
    accepting: bool,
    /// batch calls currently running
    in_flight: usize,
}

#[derive(Default)]
struct ExecutionCounters {
    executed_batches: AtomicU64,
    failed_batches: AtomicU64,
    dispatched_groups: AtomicU64,
    executed_transactions: AtomicU64,
}

/// Decrements the in-flight count when a batch call returns
struct InFlightGuard<'a> {
    status: &'a (Condvar, Mutex<ServiceStatus>),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let (condvar, lock) = self.status;
        lock.lock().in_flight -= 1;
        condvar.notify_all();
    }
}

/// What a failed batch leaves behind and must undo: the pending changes of its transactions
/// and the nonce bumps of its senders
struct BatchRollback {
    chain_id: ChainId,
    transactions: Vec<TransactionId>,
    nonces: Vec<(Address, u64)>,
}

impl BatchRollback {
    fn capture(service_pack: &ServicePack, transactions: &[Transaction], chain_id: ChainId) -> Self {
        let senders: BTreeSet<Address> = transactions
            .iter()
            .map(|transaction| transaction.content.from)
            .collect();
        let nonces = senders
            .into_iter()
            .filter_map(|sender| {
                service_pack
                    .account_context
                    .account_context(&sender, &chain_id)
                    .ok()
                    .map(|account| (sender, account.nonce))
            })
            .collect();
        BatchRollback {
            chain_id,
            transactions: transactions.iter().map(|transaction| transaction.id).collect(),
            nonces,
        }
    }

    fn apply(self, service_pack: &ServicePack) {
        for transaction_id in &self.transactions {
            if let Err(err) = service_pack.world_state.discard_changes(transaction_id) {
                warn!("could not discard the changes of {}: {}", transaction_id, err);
            }
        }
        for (sender, nonce) in &self.nonces {
            if let Err(err) = service_pack
                .account_context
                .set_nonce(sender, &self.chain_id, *nonce)
            {
                warn!("could not restore the nonce of {}: {}", sender, err);
            }
        }
        debug!(
            "rolled back {} transactions of a failed batch",
            self.transactions.len()
        );
    }
}

#[derive(Clone)]
/// implementation of the execution controller
pub struct ExecutionControllerImpl {
    config: ExecutionConfig,
    service_pack: Arc<ServicePack>,
    grouper: Arc<Grouper>,
    /// pool built on first use, `None` before that and after stop
    router: Arc<Mutex<Option<Arc<Router>>>>,
    status: Arc<(Condvar, Mutex<ServiceStatus>)>,
    counters: Arc<ExecutionCounters>,
}

impl ExecutionControllerImpl {
    fn enter(&self) -> Result<InFlightGuard<'_>, ExecutionError> {
        let mut status = self.status.1.lock();
        if !status.accepting {
            return Err(ExecutionError::ShuttingDown);
        }
        status.in_flight += 1;
        Ok(InFlightGuard {
            status: &self.status,
        })
    }

    /// The worker pool, built if needed. A failed build is retried on the next call.
    fn pool(&self) -> Result<Arc<Router>, ExecutionError> {
        let mut router = self.router.lock();
        if let Some(router) = router.as_ref() {
            return Ok(router.clone());
        }
        info!("initializing the execution pool in {:?} mode", self.config.mode);
        let started = Router::start(&self.config, &self.service_pack)?;
        *router = Some(started.clone());
        Ok(started)
    }

    fn run_batch(
        &self,
        transactions: Vec<Transaction>,
        chain_id: ChainId,
    ) -> Result<Vec<TransactionTrace>, ExecutionError> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let router = self.pool()?;
        let rollback = BatchRollback::capture(&self.service_pack, &transactions, chain_id);
        let executor = ParallelTransactionExecutor::new(
            &self.grouper,
            Requestor::new(router, self.config.dispatch_timeout),
        );
        let batch = match executor.execute(transactions, chain_id) {
            Ok(batch) => batch,
            Err(err) => {
                rollback.apply(&self.service_pack);
                return Err(err);
            }
        };
        self.counters
            .dispatched_groups
            .fetch_add(batch.groups as u64, Ordering::Relaxed);
        self.counters
            .executed_transactions
            .fetch_add(batch.traces.len() as u64, Ordering::Relaxed);
        Ok(batch.traces)
    }
}

impl ExecutionController for ExecutionControllerImpl {
    /// Execute a batch and return one trace per transaction, in submission order.
    /// Blocks until every group answered or one of them failed.
    fn execute_transactions(
        &self,
        transactions: Vec<Transaction>,
        chain_id: ChainId,
    ) -> Result<Vec<TransactionTrace>, ExecutionError> {
        let _guard = self.enter()?;
        let count = transactions.len();
        match self.run_batch(transactions, chain_id) {
            Ok(traces) => {
                self.counters
                    .executed_batches
                    .fetch_add(1, Ordering::Relaxed);
                debug!("executed a batch of {} transactions on {}", count, chain_id);
                Ok(traces)
            }
            Err(err) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                warn!("batch of {} transactions on {} failed: {}", count, chain_id, err);
                Err(err)
            }
        }
    }

    fn initialize_pool(&self) -> Result<(), ExecutionError> {
        let _guard = self.enter()?;
        self.pool().map(|_| ())
    }

    fn get_stats(&self) -> ExecutionStats {
        // the pool lock is held for the whole cluster formation, do not wait for it
        let (registered_workers, ready_workers) = self
            .router
            .try_lock()
            .and_then(|router| router.as_ref().map(|router| router.worker_counts()))
            .unwrap_or_default();
        ExecutionStats {
            registered_workers,
            ready_workers,
            executed_batches: self.counters.executed_batches.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
            dispatched_groups: self.counters.dispatched_groups.load(Ordering::Relaxed),
            executed_transactions: self.counters.executed_transactions.load(Ordering::Relaxed),
        }
    }

    fn clone_box(&self) -> Box<dyn ExecutionController> {
        Box::new(self.clone())
    }
}

/// Execution manager
/// Allows stopping the execution service
pub struct ExecutionManagerImpl {
    controller: ExecutionControllerImpl,
}

impl ExecutionManager for ExecutionManagerImpl {
    /// Refuse new batches, wait for the running ones, then stop the pool
    fn stop(&mut self) {
        info!("stopping execution service...");
        {
            let (condvar, lock) = &*self.controller.status;
            let mut status = lock.lock();
            status.accepting = false;
            while status.in_flight > 0 {
                condvar.wait(&mut status);
            }
        }
        let router = self.controller.router.lock().take();
        if let Some(router) = router {
            router.stop();
        }
        info!("execution service stopped");
    }
}

/// Launches the execution service. The worker pool itself is built by the first batch,
/// or by `initialize_pool`.
///
/// # Arguments
/// * `config`: execution configuration
/// * `service_pack`: collaborators shared by every worker
///
/// # Returns
/// A pair `(execution_manager, execution_controller)` where:
/// * `execution_manager`: allows to stop the service
/// * `execution_controller`: allows sending batches to the service and reading statistics
pub fn start_execution_worker(
    config: ExecutionConfig,
    service_pack: Arc<ServicePack>,
) -> (Box<dyn ExecutionManager>, Box<dyn ExecutionController>) {
    service_pack
        .world_state
        .set_discard_pending_changes(config.discard_pending_changes);
    let controller = ExecutionControllerImpl {
        grouper: Arc::new(Grouper::new(service_pack.resource_oracle.clone())),
        config,
        service_pack,
        router: Arc::new(Mutex::new(None)),
        status: Arc::new((
            Condvar::new(),
            Mutex::new(ServiceStatus {
                accepting: true,
                in_flight: 0,
            }),
        )),
        counters: Arc::new(ExecutionCounters::default()),
    };
    let manager = ExecutionManagerImpl {
        controller: controller.clone(),
    };
    (Box::new(manager), Box::new(controller))
}
