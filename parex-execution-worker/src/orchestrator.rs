// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::grouper::Grouper;
use crate::requestor::Requestor;
use parex_execution_exports::ExecutionError;
use parex_logging::parex_trace;
use parex_models::{chain::ChainId, trace::TransactionTrace, transaction::Transaction};

/// Traces of a batch in submission order
pub(crate) struct ExecutedBatch {
    pub traces: Vec<TransactionTrace>,
    /// number of groups the batch was split into
    pub groups: usize,
}

/// Executes one batch: group, fan out, and put the traces back in submission order
pub(crate) struct ParallelTransactionExecutor<'a> {
    grouper: &'a Grouper,
    requestor: Requestor,
}

impl<'a> ParallelTransactionExecutor<'a> {
    pub fn new(grouper: &'a Grouper, requestor: Requestor) -> Self {
        ParallelTransactionExecutor { grouper, requestor }
    }

    pub fn execute(
        &self,
        transactions: Vec<Transaction>,
        chain_id: ChainId,
    ) -> Result<ExecutedBatch, ExecutionError> {
        if transactions.is_empty() {
            return Ok(ExecutedBatch {
                traces: Vec::new(),
                groups: 0,
            });
        }
        let groups = self.grouper.group(&transactions);
        parex_trace!("execution_orchestrator.batch_grouped", {
            "chain": chain_id.to_string(),
            "transactions": transactions.len(),
            "groups": groups.len()
        });
        let group_traces = self.requestor.execute_groups(&groups, chain_id)?;

        let mut slots: Vec<Option<TransactionTrace>> = vec![None; transactions.len()];
        for (group, traces) in groups.iter().zip(group_traces) {
            for (&index, trace) in group.indices.iter().zip(traces) {
                slots[index] = Some(trace);
            }
        }
        let traces = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(ExecutionError::MissingTrace(index)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExecutedBatch {
            traces,
            groups: groups.len(),
        })
    }
}
