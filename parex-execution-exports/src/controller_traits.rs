// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This module exports generic traits representing interfaces for interacting with the execution service

use crate::error::ExecutionError;
use crate::types::ExecutionStats;
use parex_models::{chain::ChainId, trace::TransactionTrace, transaction::Transaction};

/// interface that communicates with the execution service
pub trait ExecutionController: Send + Sync {
    /// Execute a batch of transactions against `chain_id`.
    ///
    /// Blocks until every group of the batch returned.
    /// The trace at index `i` belongs to the transaction at index `i`.
    /// Any group failure fails the whole batch, and the batch then leaves no pending state
    /// change nor nonce bump behind. Groups still running past a dispatch timeout are not
    /// covered: they may stage their changes after the batch failed.
    fn execute_transactions(
        &self,
        transactions: Vec<Transaction>,
        chain_id: ChainId,
    ) -> Result<Vec<TransactionTrace>, ExecutionError>;

    /// Build the worker pool now instead of on the first batch.
    /// In cluster mode this waits for the first worker to register.
    fn initialize_pool(&self) -> Result<(), ExecutionError>;

    /// Get the counters of the service
    fn get_stats(&self) -> ExecutionStats;

    /// Returns a boxed clone of self.
    /// Useful to allow cloning `Box<dyn ExecutionController>`.
    fn clone_box(&self) -> Box<dyn ExecutionController>;
}

/// Allow cloning `Box<dyn ExecutionController>`
/// Uses `ExecutionController::clone_box` internally
impl Clone for Box<dyn ExecutionController> {
    fn clone(&self) -> Box<dyn ExecutionController> {
        self.clone_box()
    }
}

/// Execution manager used to stop the execution service
pub trait ExecutionManager {
    /// Stop accepting batches, let in-flight batches finish, then release the workers
    fn stop(&mut self);
}
