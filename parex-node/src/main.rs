// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Parex node: runs the parallel execution service over in-memory collaborators.
//!
//! Without `--worker` the node coordinates the worker pool (local threads or, in cluster
//! mode, remote worker nodes) and optionally executes a batch file.
//! With `--worker` it hosts workers joining the configured coordinator.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

use crate::batch::BatchFile;
use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::Parser;
use parex_execution_exports::memory::{
    KeyValueContract, MemoryAccounts, MemoryWorldState, StaticChainContexts,
    StaticFunctionMetadata,
};
use parex_execution_exports::{ExecutionController, ExecutionManager, ServicePack};
use parex_execution_worker::{start_execution_worker, start_worker_node};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

mod batch;
mod settings;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Host workers for a remote coordinator instead of coordinating
    #[arg(long)]
    worker: bool,
    /// JSON batch to execute once the pool is ready
    #[arg(long, value_name = "FILE")]
    batch: Option<PathBuf>,
    /// Configuration file overriding base_config/config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// In-memory collaborators of the node
struct NodeServices {
    service_pack: Arc<ServicePack>,
    world_state: Arc<MemoryWorldState>,
    chains: Arc<StaticChainContexts>,
    metadata: Arc<StaticFunctionMetadata>,
}

impl NodeServices {
    fn new() -> Self {
        let world_state = Arc::new(MemoryWorldState::new());
        let chains = Arc::new(StaticChainContexts::new());
        let metadata = Arc::new(StaticFunctionMetadata::new());
        let service_pack = Arc::new(ServicePack::new(
            chains.clone(),
            Arc::new(KeyValueContract::new(world_state.clone())),
            metadata.clone(),
            world_state.clone(),
            Arc::new(MemoryAccounts::new()),
        ));
        NodeServices {
            service_pack,
            world_state,
            chains,
            metadata,
        }
    }
}

fn level_filter(level: usize) -> LevelFilter {
    match level {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Block until ctrl-c
fn wait_for_interrupt() -> Result<()> {
    let stop_cv = Arc::new((Mutex::new(false), Condvar::new()));
    let handler_cv = stop_cv.clone();
    ctrlc::set_handler(move || {
        let (stopped, condvar) = &*handler_cv;
        *stopped.lock() = true;
        condvar.notify_all();
    })
    .context("could not install the interrupt handler")?;
    let (stopped, condvar) = &*stop_cv;
    let mut stopped = stopped.lock();
    while !*stopped {
        condvar.wait(&mut stopped);
    }
    info!("interrupt signal received");
    Ok(())
}

fn run_batch(
    controller: &dyn ExecutionController,
    services: &NodeServices,
    batch: &BatchFile,
) -> Result<()> {
    services.chains.add_chain(batch.chain_id());
    batch.declare(&services.metadata);
    let traces = controller.execute_transactions(batch.transactions()?, batch.chain_id())?;
    services.world_state.commit();
    println!("{}", serde_json::to_string_pretty(&traces)?);
    info!("{:?}", controller.get_stats());
    Ok(())
}

fn run_coordinator(settings: Settings, batch: Option<BatchFile>) -> Result<()> {
    let services = NodeServices::new();
    let (mut manager, controller) =
        start_execution_worker(settings.execution, services.service_pack.clone());
    let outcome = controller
        .initialize_pool()
        .context("could not build the worker pool")
        .and_then(|_| match &batch {
            Some(batch) => run_batch(controller.as_ref(), &services, batch),
            None => wait_for_interrupt(),
        });
    manager.stop();
    outcome
}

fn run_worker_node(settings: Settings) -> Result<()> {
    let services = NodeServices::new();
    let mut manager = start_worker_node(settings.execution, services.service_pack.clone())?;
    let outcome = wait_for_interrupt();
    manager.stop();
    outcome
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("could not load settings")?;

    use tracing_subscriber::prelude::*;
    let tracing_layer =
        tracing_subscriber::fmt::layer().with_filter(level_filter(settings.logging.level));
    tracing_subscriber::registry().with(tracing_layer).init();

    if args.worker {
        if args.batch.is_some() {
            warn!("--batch is ignored by worker nodes");
        }
        info!(
            "starting worker node {}",
            settings.execution.cluster.node_name
        );
        return run_worker_node(settings);
    }
    let batch = args.batch.as_deref().map(BatchFile::read).transpose()?;
    info!("starting node in {:?} mode", settings.execution.mode);
    run_coordinator(settings, batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_execution_exports::test_exports::call;
    use parex_execution_exports::ExecutionConfig;
    use parex_models::chain::ChainId;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(0), LevelFilter::ERROR);
        assert_eq!(level_filter(2), LevelFilter::INFO);
        assert_eq!(level_filter(9), LevelFilter::TRACE);
    }

    #[test]
    fn test_node_executes_a_batch_file() {
        let batch: BatchFile = serde_json::from_str(
            r#"{
                "chain": "parex-demo",
                "transactions": [
                    { "from": "alice", "to": "store", "method": "set:a", "params": [5] },
                    { "from": "bob", "to": "store", "method": "get:a" }
                ]
            }"#,
        )
        .unwrap();
        let services = NodeServices::new();
        let (mut manager, controller) =
            start_execution_worker(ExecutionConfig::default(), services.service_pack.clone());
        run_batch(controller.as_ref(), &services, &batch).unwrap();
        assert_eq!(services.world_state.snapshot().len(), 1);

        // unknown chains abort the batch
        let result = controller.execute_transactions(
            vec![call("alice", "store", "set:a", Vec::new())],
            ChainId::from_name("elsewhere"),
        );
        assert!(result.is_err());
        manager.stop();
    }
}
