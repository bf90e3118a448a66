// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! this file defines all possible execution error categories

use displaydoc::Display;
use parex_models::chain::ChainId;
use parex_models::worker_id::WorkerId;
use std::time::Duration;
use thiserror::Error;

/// Result of the execution service
pub type ExecutionResult<T, E = ExecutionError> = core::result::Result<T, E>;

/// Errors of the execution service.
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ExecutionError {
    /// Configuration error: {0}
    ConfigError(String),
    /// no capacity: no worker joined the cluster within {0:?}
    ClusterFormationTimeout(Duration),
    /// no capacity: no worker became ready within {0:?}
    NoAvailableWorker(Duration),
    /// worker {0} is unreachable: {1}
    WorkerUnreachable(WorkerId, String),
    /// worker {0} stopped before answering
    WorkerCrashed(WorkerId),
    /// worker {0} did not answer within {1:?}
    DispatchTimeout(WorkerId, Duration),
    /// group execution aborted: {0}
    GroupAborted(String),
    /// worker {0} returned {1} traces for a group of {2} transactions
    TraceCountMismatch(WorkerId, usize, usize),
    /// no trace produced for the transaction at index {0}
    MissingTrace(usize),
    /// the execution service is shutting down
    ShuttingDown,
    /// a worker named {0} is already registered
    DuplicateWorker(WorkerId),
    /// cluster protocol error: {0}
    ProtocolError(String),
    /// IO error: {0}
    IoError(#[from] std::io::Error),
}

/// Errors reported by the collaborators of a worker.
/// They are process-fatal for the group being executed.
#[non_exhaustive]
#[derive(Display, Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// unknown chain {0}
    UnknownChain(ChainId),
    /// state backend unavailable: {0}
    StateUnavailable(String),
    /// fatal error: {0}
    Fatal(String),
}
