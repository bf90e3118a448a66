// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Registry of the workers a router may dispatch to.
//!
//! Workers register, become ready, and may leave at any time (a closed mailbox, a lost
//! cluster connection). Selection is round-robin over the ready workers and can wait for
//! one to show up.

use crate::request::GroupRequest;
use parex_execution_exports::ExecutionError;
use parex_models::worker_id::WorkerId;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Transport to one worker
pub(crate) trait WorkerLink: Send + Sync {
    /// Hand a group request to the worker. On error the request is dropped.
    fn submit(&self, request: GroupRequest) -> Result<(), ExecutionError>;

    /// Ask the worker to stop once its pending work is done
    fn close(&self);
}

/// Token identifying one registration, unique for the registry lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RegistrationId(u64);

/// A worker chosen for a dispatch
pub(crate) struct SelectedWorker {
    pub registration: RegistrationId,
    pub worker_id: WorkerId,
    pub link: Arc<dyn WorkerLink>,
}

struct WorkerEntry {
    registration: RegistrationId,
    worker_id: WorkerId,
    link: Arc<dyn WorkerLink>,
    ready: bool,
}

#[derive(Default)]
struct RegistryState {
    workers: Vec<WorkerEntry>,
    cursor: usize,
    next_registration: u64,
    closed: bool,
}

impl RegistryState {
    fn next_ready(&mut self) -> Option<SelectedWorker> {
        let count = self.workers.len();
        for offset in 0..count {
            let index = (self.cursor + offset) % count;
            if self.workers[index].ready {
                self.cursor = (index + 1) % count;
                let entry = &self.workers[index];
                return Some(SelectedWorker {
                    registration: entry.registration,
                    worker_id: entry.worker_id.clone(),
                    link: entry.link.clone(),
                });
            }
        }
        None
    }

    fn has_ready(&self) -> bool {
        self.workers.iter().any(|entry| entry.ready)
    }
}

pub(crate) struct WorkerRegistry {
    state: Mutex<RegistryState>,
    changed: Condvar,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        WorkerRegistry {
            state: Mutex::new(RegistryState::default()),
            changed: Condvar::new(),
        }
    }

    /// Add a worker, not ready yet.
    /// Fails if a worker with the same identifier is registered or the registry is closed.
    pub fn register(
        &self,
        worker_id: WorkerId,
        link: Arc<dyn WorkerLink>,
    ) -> Result<RegistrationId, ExecutionError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ExecutionError::ShuttingDown);
        }
        if state.workers.iter().any(|entry| entry.worker_id == worker_id) {
            return Err(ExecutionError::DuplicateWorker(worker_id));
        }
        let registration = RegistrationId(state.next_registration);
        state.next_registration += 1;
        debug!("worker {} registered", worker_id);
        state.workers.push(WorkerEntry {
            registration,
            worker_id,
            link,
            ready: false,
        });
        Ok(registration)
    }

    /// Make a registered worker eligible for dispatch
    pub fn mark_ready(&self, registration: RegistrationId) {
        let mut state = self.state.lock();
        if let Some(entry) = state
            .workers
            .iter_mut()
            .find(|entry| entry.registration == registration)
        {
            entry.ready = true;
        }
        self.changed.notify_all();
    }

    /// Remove a worker. Returns its link if it was still registered.
    pub fn unregister(&self, registration: RegistrationId) -> Option<Arc<dyn WorkerLink>> {
        let mut state = self.state.lock();
        let index = state
            .workers
            .iter()
            .position(|entry| entry.registration == registration)?;
        let entry = state.workers.remove(index);
        if index < state.cursor {
            state.cursor -= 1;
        }
        if state.cursor >= state.workers.len() {
            state.cursor = 0;
        }
        info!("worker {} left the pool", entry.worker_id);
        self.changed.notify_all();
        Some(entry.link)
    }

    /// (registered, ready) worker counts
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        let ready = state.workers.iter().filter(|entry| entry.ready).count();
        (state.workers.len(), ready)
    }

    /// Block until at least one worker is ready. Returns false on timeout or close.
    pub fn wait_for_ready_worker(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.has_ready() {
                return true;
            }
            if state.closed || Instant::now() >= deadline {
                return false;
            }
            self.changed.wait_until(&mut state, deadline);
        }
    }

    /// Pick the next ready worker, round-robin, waiting up to `wait` for one.
    pub fn select(&self, wait: Duration) -> Result<SelectedWorker, ExecutionError> {
        let deadline = Instant::now() + wait;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(ExecutionError::ShuttingDown);
            }
            if let Some(selected) = state.next_ready() {
                return Ok(selected);
            }
            if Instant::now() >= deadline {
                return Err(ExecutionError::NoAvailableWorker(wait));
            }
            self.changed.wait_until(&mut state, deadline);
        }
    }

    /// Refuse new registrations and selections, and return the links of every worker
    pub fn close(&self) -> Vec<Arc<dyn WorkerLink>> {
        let mut state = self.state.lock();
        state.closed = true;
        let links = state.workers.drain(..).map(|entry| entry.link).collect();
        self.changed.notify_all();
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLink {
        submitted: AtomicUsize,
    }

    impl WorkerLink for CountingLink {
        fn submit(&self, _request: GroupRequest) -> Result<(), ExecutionError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) {}
    }

    fn ready_worker(registry: &WorkerRegistry, index: usize) -> RegistrationId {
        let registration = registry
            .register(WorkerId::local(index), Arc::new(CountingLink::default()))
            .unwrap();
        registry.mark_ready(registration);
        registration
    }

    fn selected_ids(registry: &WorkerRegistry, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                registry
                    .select(Duration::ZERO)
                    .unwrap()
                    .worker_id
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_round_robin_skips_workers_not_ready() {
        let registry = WorkerRegistry::new();
        ready_worker(&registry, 0);
        registry
            .register(WorkerId::local(1), Arc::new(CountingLink::default()))
            .unwrap();
        ready_worker(&registry, 2);
        assert_eq!(registry.counts(), (3, 2));
        assert_eq!(
            selected_ids(&registry, 4),
            vec!["worker0", "worker2", "worker0", "worker2"]
        );
    }

    #[test]
    fn test_duplicate_worker_is_rejected() {
        let registry = WorkerRegistry::new();
        ready_worker(&registry, 0);
        let result = registry.register(WorkerId::local(0), Arc::new(CountingLink::default()));
        assert!(matches!(result, Err(ExecutionError::DuplicateWorker(_))));
    }

    #[test]
    fn test_unregistered_worker_is_not_selected() {
        let registry = WorkerRegistry::new();
        let first = ready_worker(&registry, 0);
        ready_worker(&registry, 1);
        assert!(registry.unregister(first).is_some());
        assert!(registry.unregister(first).is_none());
        assert_eq!(selected_ids(&registry, 2), vec!["worker1", "worker1"]);
        // the identifier is free again
        ready_worker(&registry, 0);
        assert_eq!(registry.counts(), (2, 2));
    }

    #[test]
    fn test_select_times_out_without_ready_worker() {
        let registry = WorkerRegistry::new();
        registry
            .register(WorkerId::local(0), Arc::new(CountingLink::default()))
            .unwrap();
        let started = Instant::now();
        let result = registry.select(Duration::from_millis(50));
        assert!(matches!(result, Err(ExecutionError::NoAvailableWorker(_))));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!registry.wait_for_ready_worker(Duration::from_millis(10)));
    }

    #[test]
    fn test_select_waits_for_worker_to_become_ready() {
        let registry = Arc::new(WorkerRegistry::new());
        let registration = registry
            .register(WorkerId::local(0), Arc::new(CountingLink::default()))
            .unwrap();
        let marker = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                registry.mark_ready(registration);
            })
        };
        let selected = registry.select(Duration::from_secs(5)).unwrap();
        assert_eq!(selected.registration, registration);
        marker.join().unwrap();
    }

    #[test]
    fn test_close_wakes_waiters_and_returns_links() {
        let registry = Arc::new(WorkerRegistry::new());
        registry
            .register(WorkerId::local(0), Arc::new(CountingLink::default()))
            .unwrap();
        let waiter = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.select(Duration::from_secs(30)))
        };
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(registry.close().len(), 1);
        assert!(matches!(
            waiter.join().unwrap(),
            Err(ExecutionError::ShuttingDown)
        ));
        let result = registry.register(WorkerId::local(1), Arc::new(CountingLink::default()));
        assert!(matches!(result, Err(ExecutionError::ShuttingDown)));
    }
}
