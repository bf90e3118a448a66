// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Worker-node side of cluster mode: hosts workers that join a remote coordinator.

use crate::cluster::binder;
use crate::cluster::messages::{
    CoordinatorMessage, CoordinatorMessageDeserializer, WorkerMessage, WorkerMessageSerializer,
};
use crate::cluster::CLUSTER_PROTOCOL_VERSION;
use crate::worker::execute_group;
use parex_execution_exports::{
    ClusterConfig, ExecutionConfig, ExecutionError, ExecutionManager, ServicePack,
};
use parex_logging::parex_trace;
use parex_models::worker_id::WorkerId;
use parking_lot::Mutex;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Start `local_worker_count` workers named `<node_name>/worker<i>`, each connecting to
/// the coordinator seeds and reconnecting until the returned manager is stopped.
pub fn start_worker_node(
    config: ExecutionConfig,
    service_pack: Arc<ServicePack>,
) -> Result<Box<dyn ExecutionManager>, ExecutionError> {
    if config.local_worker_count == 0 {
        return Err(ExecutionError::ConfigError(
            "local_worker_count must be at least 1".to_string(),
        ));
    }
    service_pack
        .world_state
        .set_discard_pending_changes(config.discard_pending_changes);
    let seeds = config.cluster.seed_addresses();
    let stopping = Arc::new(AtomicBool::new(false));
    let mut manager = WorkerNodeManager {
        stopping: stopping.clone(),
        connections: Vec::new(),
        threads: Vec::new(),
    };
    for index in 0..config.local_worker_count {
        let connection = Arc::new(Mutex::new(None));
        let worker = ClusterWorker {
            worker_id: WorkerId::remote(&config.cluster.node_name, index),
            seeds: seeds.clone(),
            config: config.cluster.clone(),
            service_pack: service_pack.clone(),
            stopping: stopping.clone(),
            connection: connection.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name(format!("cluster-{}", worker.worker_id))
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                manager.connections.push(connection);
                manager.threads.push(handle);
            }
            Err(err) => {
                manager.stop();
                return Err(err.into());
            }
        }
    }
    info!(
        "worker node {} started {} workers, coordinator seeds: {:?}",
        config.cluster.node_name, config.local_worker_count, seeds
    );
    Ok(Box::new(manager))
}

/// Stops the workers of a worker node
pub struct WorkerNodeManager {
    stopping: Arc<AtomicBool>,
    connections: Vec<Arc<Mutex<Option<TcpStream>>>>,
    threads: Vec<JoinHandle<()>>,
}

impl ExecutionManager for WorkerNodeManager {
    fn stop(&mut self) {
        info!("stopping worker node...");
        self.stopping.store(true, Ordering::Release);
        for connection in &self.connections {
            if let Some(stream) = connection.lock().as_ref() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("a cluster worker thread panicked");
            }
        }
        info!("worker node stopped");
    }
}

struct ClusterWorker {
    worker_id: WorkerId,
    seeds: Vec<SocketAddr>,
    config: ClusterConfig,
    service_pack: Arc<ServicePack>,
    stopping: Arc<AtomicBool>,
    /// current connection, shut down by the manager to unblock reads
    connection: Arc<Mutex<Option<TcpStream>>>,
}

impl ClusterWorker {
    fn run(self) {
        for seed in self.seeds.iter().cycle() {
            if self.stopping.load(Ordering::Acquire) {
                break;
            }
            match self.serve(*seed) {
                Ok(()) => info!("{} released by coordinator {}", self.worker_id, seed),
                Err(err) => debug!("{} lost coordinator {}: {}", self.worker_id, seed, err),
            }
            *self.connection.lock() = None;
            if self.stopping.load(Ordering::Acquire) {
                break;
            }
            std::thread::sleep(self.config.connect_retry_interval);
        }
        debug!("cluster {} stopped", self.worker_id);
    }

    /// Connect to `seed`, register, and execute groups until the connection ends
    fn serve(&self, seed: SocketAddr) -> Result<(), ExecutionError> {
        let stream = TcpStream::connect_timeout(&seed, self.config.handshake_timeout)?;
        stream.set_nodelay(true)?;
        *self.connection.lock() = Some(stream.try_clone()?);
        // the manager may have shut connections down before this one was stored
        if self.stopping.load(Ordering::Acquire) {
            return Ok(());
        }
        let (mut reader, mut writer) = binder::split::<CoordinatorMessage, WorkerMessage, _, _>(
            stream,
            CoordinatorMessageDeserializer::new(),
            WorkerMessageSerializer::new(),
            self.config.max_message_size,
        )?;

        writer.send(&WorkerMessage::Register {
            worker_id: self.worker_id.clone(),
            protocol_version: CLUSTER_PROTOCOL_VERSION,
        })?;
        reader.set_timeout(Some(self.config.handshake_timeout))?;
        match reader.next()? {
            CoordinatorMessage::Registered => {}
            CoordinatorMessage::Rejected { reason } => {
                return Err(ExecutionError::ProtocolError(format!(
                    "registration refused: {}",
                    reason
                )))
            }
            other => {
                return Err(ExecutionError::ProtocolError(format!(
                    "expected a registration answer, got {:?}",
                    other
                )))
            }
        }
        reader.set_timeout(None)?;
        info!("{} registered with coordinator {}", self.worker_id, seed);

        loop {
            match reader.next()? {
                CoordinatorMessage::ExecuteGroup {
                    request_id,
                    chain_id,
                    transactions,
                } => {
                    parex_trace!("execution_worker.group_received", {
                        "worker": self.worker_id.to_string(),
                        "request_id": request_id,
                        "transactions": transactions.len()
                    });
                    let result = execute_group(&self.service_pack, &chain_id, &transactions)
                        .map_err(|err| {
                            warn!("{} failed request {}: {}", self.worker_id, request_id, err);
                            err.to_string()
                        });
                    writer.send(&WorkerMessage::GroupResult { request_id, result })?;
                }
                CoordinatorMessage::Shutdown => return Ok(()),
                CoordinatorMessage::Registered | CoordinatorMessage::Rejected { .. } => {
                    return Err(ExecutionError::ProtocolError(
                        "unexpected registration message".to_string(),
                    ))
                }
            }
        }
    }
}
