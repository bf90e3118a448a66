// Copyright (c) 2022 MASSA LABS <info@massa.net>

use parex_execution_exports::memory::{
    KeyValueContract, MemoryAccounts, MemoryWorldState, StaticChainContexts,
    StaticFunctionMetadata,
};
use parex_execution_exports::test_exports::TestServices;
use parex_execution_exports::{
    ClusterConfig, ExecutionConfig, ExecutionController, ExecutionStats, MockSmartContractExecutor,
    RouterMode, ServicePack, SmartContractExecutor,
};
use parex_models::{chain::ChainId, trace::TransactionTrace, transaction::Transaction};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn local_config(workers: usize) -> ExecutionConfig {
    ExecutionConfig {
        local_worker_count: workers,
        ..Default::default()
    }
}

/// Coordinator config listening on `port`
pub fn cluster_config(port: u16) -> ExecutionConfig {
    ExecutionConfig {
        mode: RouterMode::Cluster,
        worker_ready_timeout: Duration::from_millis(300),
        cluster: ClusterConfig {
            port,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Worker node config joining the coordinator on `port` of localhost
pub fn worker_node_config(node_name: &str, port: u16, workers: usize) -> ExecutionConfig {
    let mut config = cluster_config(port);
    config.local_worker_count = workers;
    config.cluster.node_name = node_name.to_string();
    config
}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("no free port on localhost")
}

/// Register the key-value metadata of every transaction of `batch`
pub fn declare(services: &TestServices, batch: &[Transaction]) {
    for transaction in batch {
        let content = &transaction.content;
        if let Some(metadata) = KeyValueContract::describe(&content.to, &content.method) {
            services
                .metadata
                .register(content.to, content.method.clone(), metadata);
        }
    }
}

/// Service pack whose contract executor is `executor` and where no function is declared
pub fn service_pack_with(executor: Arc<dyn SmartContractExecutor>) -> Arc<ServicePack> {
    Arc::new(ServicePack::new(
        Arc::new(StaticChainContexts::new().with_chain(test_chain())),
        executor,
        Arc::new(StaticFunctionMetadata::new()),
        Arc::new(MemoryWorldState::new()),
        Arc::new(MemoryAccounts::new()),
    ))
}

/// Executor answering every call after `delay`
pub fn slow_executor(delay: Duration) -> Arc<dyn SmartContractExecutor> {
    let mut executor = MockSmartContractExecutor::new();
    executor.expect_execute().returning(move |transaction, _| {
        std::thread::sleep(delay);
        Ok(TransactionTrace::executed(
            transaction.id,
            Vec::new(),
            Vec::new(),
        ))
    });
    Arc::new(executor)
}

pub fn test_chain() -> ChainId {
    ChainId::from_name("parex-test")
}

pub fn assert_trace_order(batch: &[Transaction], traces: &[TransactionTrace]) {
    let expected: Vec<_> = batch.iter().map(|transaction| transaction.id).collect();
    let actual: Vec<_> = traces.iter().map(|trace| trace.transaction_id).collect();
    assert_eq!(actual, expected);
}

/// Poll the statistics of `controller` until `condition` holds or `timeout` elapses
pub fn wait_for_stats(
    controller: &dyn ExecutionController,
    timeout: Duration,
    condition: impl Fn(&ExecutionStats) -> bool,
) -> ExecutionStats {
    let deadline = Instant::now() + timeout;
    loop {
        let stats = controller.get_stats();
        if condition(&stats) || Instant::now() >= deadline {
            return stats;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
