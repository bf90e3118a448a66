// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Fans the groups of one batch out to the router and gathers their traces.

use crate::grouper::Group;
use crate::request::{GroupRequest, GroupResult};
use crate::router::Router;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parex_execution_exports::ExecutionError;
use parex_models::{chain::ChainId, trace::TransactionTrace, worker_id::WorkerId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Short-lived requester owned by a single batch call
pub(crate) struct Requestor {
    router: Arc<Router>,
    dispatch_timeout: Option<Duration>,
}

struct PendingGroup {
    worker_id: WorkerId,
    expected: usize,
    response_rx: Receiver<GroupResult>,
}

impl Requestor {
    pub fn new(router: Arc<Router>, dispatch_timeout: Option<Duration>) -> Self {
        Requestor {
            router,
            dispatch_timeout,
        }
    }

    /// Dispatch every group, then wait for all of them.
    /// Returns the traces of each group, in the order of `groups`.
    ///
    /// On failure, the groups already dispatched are still awaited (up to the deadline)
    /// so that none of them is still running when the error is returned.
    pub fn execute_groups(
        &self,
        groups: &[Group],
        chain_id: ChainId,
    ) -> Result<Vec<Vec<TransactionTrace>>, ExecutionError> {
        let deadline = self
            .dispatch_timeout
            .map(|timeout| Instant::now() + timeout);
        let mut first_error = None;
        let mut pending = Vec::with_capacity(groups.len());
        for group in groups {
            let (request, response_rx) = GroupRequest::new(chain_id, group.transactions.clone());
            match self.router.dispatch(request) {
                Ok(worker_id) => pending.push(PendingGroup {
                    worker_id,
                    expected: group.transactions.len(),
                    response_rx,
                }),
                Err(err) => {
                    first_error = Some(err);
                    break;
                }
            }
        }
        debug!("dispatched {} of {} groups", pending.len(), groups.len());
        let mut traces = Vec::with_capacity(pending.len());
        for group in pending {
            match self.collect(group, deadline) {
                Ok(group_traces) => traces.push(group_traces),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(traces),
        }
    }

    fn collect(
        &self,
        group: PendingGroup,
        deadline: Option<Instant>,
    ) -> Result<Vec<TransactionTrace>, ExecutionError> {
        let received = match deadline {
            Some(deadline) => group.response_rx.recv_deadline(deadline),
            None => group
                .response_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        let traces = match received {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ExecutionError::DispatchTimeout(
                    group.worker_id,
                    self.dispatch_timeout.unwrap_or_default(),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ExecutionError::WorkerCrashed(group.worker_id))
            }
        };
        if traces.len() != group.expected {
            return Err(ExecutionError::TraceCountMismatch(
                group.worker_id,
                traces.len(),
                group.expected,
            ));
        }
        Ok(traces)
    }
}
