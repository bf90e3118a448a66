// Copyright (c) 2022 MASSA LABS <info@massa.net>

use serde::Serialize;

/// Counters of the execution service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    /// workers currently registered in the router
    pub registered_workers: usize,
    /// registered workers ready to receive groups
    pub ready_workers: usize,
    /// batches executed successfully
    pub executed_batches: u64,
    /// batches that failed
    pub failed_batches: u64,
    /// groups dispatched to workers
    pub dispatched_groups: u64,
    /// transactions with a returned trace
    pub executed_transactions: u64,
}

impl std::fmt::Display for ExecutionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Workers: {} registered, {} ready",
            self.registered_workers, self.ready_workers
        )?;
        writeln!(
            f,
            "Batches: {} executed, {} failed",
            self.executed_batches, self.failed_batches
        )?;
        write!(
            f,
            "Groups dispatched: {}, transactions executed: {}",
            self.dispatched_groups, self.executed_transactions
        )
    }
}
