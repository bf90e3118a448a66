// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Sequential execution of a group, and the in-process worker threads running it.

use crate::registry::{RegistrationId, WorkerLink, WorkerRegistry};
use crate::request::GroupRequest;
use parex_channel::{receiver::ParexReceiver, sender::ParexSender};
use parex_execution_exports::{ExecutionError, ServiceError, ServicePack};
use parex_logging::parex_trace;
use parex_models::{
    chain::ChainId, trace::TransactionTrace, transaction::Transaction, worker_id::WorkerId,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Execute the transactions of a group one after the other.
///
/// A transaction failing inside the contract still yields a trace and does not stop the
/// group: its changes are discarded if the world state discards pending changes.
/// Any collaborator error aborts the whole group.
pub(crate) fn execute_group(
    service_pack: &ServicePack,
    chain_id: &ChainId,
    transactions: &[Transaction],
) -> Result<Vec<TransactionTrace>, ExecutionError> {
    let chain_context = service_pack
        .chain_context
        .chain_context(chain_id)
        .map_err(|err| ExecutionError::GroupAborted(format!("chain context: {}", err)))?;
    let discard_failed = service_pack.world_state.discards_pending_changes();
    let mut traces = Vec::with_capacity(transactions.len());
    for transaction in transactions {
        let abort = |err: ServiceError| {
            ExecutionError::GroupAborted(format!("transaction {}: {}", transaction.id, err))
        };
        let trace = service_pack
            .smart_contract
            .execute(transaction, &chain_context)
            .map_err(abort)?;
        if trace.is_successful() {
            service_pack
                .world_state
                .stage_changes(&transaction.id, &trace.state_changes)
                .map_err(abort)?;
        } else {
            debug!(
                "transaction {} failed: {:?}",
                transaction.id, trace.status
            );
            if discard_failed {
                service_pack
                    .world_state
                    .discard_changes(&transaction.id)
                    .map_err(abort)?;
            }
        }
        let sender = &transaction.content.from;
        let account = service_pack
            .account_context
            .account_context(sender, chain_id)
            .map_err(abort)?;
        service_pack
            .account_context
            .set_nonce(sender, chain_id, account.nonce.saturating_add(1))
            .map_err(abort)?;
        traces.push(trace);
    }
    Ok(traces)
}

/// Messages of a worker mailbox
pub(crate) enum WorkerCommand {
    Execute(GroupRequest),
    Stop,
}

/// Link to an in-process worker through its mailbox
pub(crate) struct LocalWorkerLink {
    worker_id: WorkerId,
    mailbox: ParexSender<WorkerCommand>,
}

impl LocalWorkerLink {
    pub fn new(worker_id: WorkerId, mailbox: ParexSender<WorkerCommand>) -> Self {
        LocalWorkerLink { worker_id, mailbox }
    }
}

impl WorkerLink for LocalWorkerLink {
    fn submit(&self, request: GroupRequest) -> Result<(), ExecutionError> {
        self.mailbox
            .send(WorkerCommand::Execute(request))
            .map_err(|_| {
                ExecutionError::WorkerUnreachable(
                    self.worker_id.clone(),
                    format!("mailbox {} is closed", self.mailbox.name()),
                )
            })
    }

    fn close(&self) {
        // queued groups are executed before the stop command
        let _ = self.mailbox.send(WorkerCommand::Stop);
    }
}

/// An in-process worker: executes the groups of its mailbox in arrival order
pub(crate) struct WorkerThread {
    worker_id: WorkerId,
    mailbox: ParexReceiver<WorkerCommand>,
    service_pack: Arc<ServicePack>,
    registry: Arc<WorkerRegistry>,
    registration: RegistrationId,
}

impl WorkerThread {
    pub fn spawn(
        worker_id: WorkerId,
        mailbox: ParexReceiver<WorkerCommand>,
        service_pack: Arc<ServicePack>,
        registry: Arc<WorkerRegistry>,
        registration: RegistrationId,
    ) -> Result<JoinHandle<()>, ExecutionError> {
        let worker = WorkerThread {
            worker_id,
            mailbox,
            service_pack,
            registry,
            registration,
        };
        let handle = std::thread::Builder::new()
            .name(format!("execution-{}", worker.worker_id))
            .spawn(move || worker.run())?;
        Ok(handle)
    }

    fn run(self) {
        self.registry.mark_ready(self.registration);
        debug!("execution {} ready", self.worker_id);
        loop {
            match self.mailbox.recv() {
                Ok(WorkerCommand::Execute(request)) => {
                    let (call, responder) = request.into_parts();
                    parex_trace!("execution_worker.group_received", {
                        "worker": self.worker_id.to_string(),
                        "request_id": call.request_id,
                        "transactions": call.transactions.len()
                    });
                    let result =
                        execute_group(&self.service_pack, &call.chain_id, &call.transactions);
                    if let Err(err) = &result {
                        warn!("{} failed request {}: {}", self.worker_id, call.request_id, err);
                    }
                    responder.respond(result);
                }
                Ok(WorkerCommand::Stop) | Err(_) => break,
            }
        }
        debug!("execution {} stopped", self.worker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_execution_exports::memory::{
        MemoryAccounts, StaticChainContexts, StaticFunctionMetadata,
    };
    use parex_execution_exports::test_exports::{call, contract_address, TestServices};
    use parex_execution_exports::{
        AccountContextProvider, MockSmartContractExecutor, MockWorldState, ServiceError,
    };
    use parex_models::resource::ResourcePath;
    use parex_models::trace::{ExecutionStatus, StateChange};

    fn pack_with(executor: MockSmartContractExecutor, world_state: MockWorldState) -> ServicePack {
        ServicePack::new(
            Arc::new(StaticChainContexts::new().with_chain(ChainId::from_name("parex-test"))),
            Arc::new(executor),
            Arc::new(StaticFunctionMetadata::new()),
            Arc::new(world_state),
            Arc::new(MemoryAccounts::new()),
        )
    }

    #[test]
    fn test_group_executes_in_order_and_stages_changes() {
        let services = TestServices::new();
        let batch = vec![
            call("alice", "store", "set:k", 7u64.to_le_bytes().to_vec()),
            services.declared_call("alice", "store", "increment:k"),
            services.declared_call("alice", "store", "get:k"),
        ];
        let traces = execute_group(&services.service_pack, &services.chain_id, &batch).unwrap();
        assert_eq!(traces.len(), 3);
        for (trace, transaction) in traces.iter().zip(&batch) {
            assert_eq!(trace.transaction_id, transaction.id);
            assert!(trace.is_successful());
        }
        assert_eq!(traces[2].return_value, 8u64.to_le_bytes().to_vec());
        assert_eq!(
            services.world_state.pending_transactions(),
            vec![batch[0].id, batch[1].id]
        );
        let account = services
            .accounts
            .account_context(&contract_address("alice"), &services.chain_id)
            .unwrap();
        assert_eq!(account.nonce, 3);
    }

    #[test]
    fn test_failed_transaction_does_not_stop_group() {
        let services = TestServices::new();
        let batch = vec![
            services.declared_call("alice", "store", "fail:k"),
            services.declared_call("alice", "store", "unknown-op"),
            services.declared_call("alice", "store", "set:k"),
        ];
        let traces = execute_group(&services.service_pack, &services.chain_id, &batch).unwrap();
        assert!(matches!(traces[0].status, ExecutionStatus::ContractError(_)));
        assert!(matches!(
            traces[1].status,
            ExecutionStatus::InvalidInstruction(_)
        ));
        assert!(traces[2].is_successful());
        assert_eq!(
            services.world_state.pending_transactions(),
            vec![batch[2].id]
        );
    }

    #[test]
    fn test_fatal_error_aborts_group() {
        let services = TestServices::new();
        let batch = vec![
            services.declared_call("alice", "store", "set:k"),
            services.declared_call("alice", "store", "abort"),
            services.declared_call("alice", "store", "set:j"),
        ];
        let result = execute_group(&services.service_pack, &services.chain_id, &batch);
        assert!(matches!(result, Err(ExecutionError::GroupAborted(_))));
    }

    #[test]
    fn test_unknown_chain_aborts_group() {
        let services = TestServices::new();
        let batch = vec![services.declared_call("alice", "store", "set:k")];
        let result = execute_group(
            &services.service_pack,
            &ChainId::from_name("elsewhere"),
            &batch,
        );
        assert!(matches!(result, Err(ExecutionError::GroupAborted(_))));
    }

    #[test]
    fn test_discard_policy_controls_failed_changes() {
        let chain_id = ChainId::from_name("parex-test");
        let transaction = call("alice", "store", "fail:k", Vec::new());
        for discard in [true, false] {
            let mut executor = MockSmartContractExecutor::new();
            executor.expect_execute().returning(|transaction, _| {
                Ok(TransactionTrace::failed(
                    transaction.id,
                    ExecutionStatus::ContractError("refused".to_string()),
                ))
            });
            let mut world_state = MockWorldState::new();
            world_state
                .expect_discards_pending_changes()
                .return_const(discard);
            world_state
                .expect_discard_changes()
                .times(usize::from(discard))
                .returning(|_| Ok(()));
            world_state.expect_stage_changes().never();
            let service_pack = pack_with(executor, world_state);
            let traces =
                execute_group(&service_pack, &chain_id, &[transaction.clone()]).unwrap();
            assert!(!traces[0].is_successful());
        }
    }

    #[test]
    fn test_staging_failure_aborts_group() {
        let mut executor = MockSmartContractExecutor::new();
        executor.expect_execute().returning(|transaction, _| {
            Ok(TransactionTrace::executed(
                transaction.id,
                Vec::new(),
                vec![StateChange {
                    path: ResourcePath::new(transaction.content.to, "k"),
                    value: Some(vec![1]),
                }],
            ))
        });
        let mut world_state = MockWorldState::new();
        world_state
            .expect_discards_pending_changes()
            .return_const(true);
        world_state
            .expect_stage_changes()
            .returning(|_, _| Err(ServiceError::StateUnavailable("disk full".to_string())));
        let service_pack = pack_with(executor, world_state);
        let transaction = call("alice", "store", "set:k", Vec::new());
        let result = execute_group(
            &service_pack,
            &ChainId::from_name("parex-test"),
            &[transaction],
        );
        assert!(matches!(result, Err(ExecutionError::GroupAborted(_))));
    }
}
