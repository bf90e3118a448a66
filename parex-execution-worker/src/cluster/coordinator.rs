// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Coordinator side of cluster mode: accepts worker connections and registers them.

use crate::cluster::binder;
use crate::cluster::listener::{ClusterListener, ClusterListenerStopHandle, PollEvent};
use crate::cluster::messages::{
    CoordinatorMessage, CoordinatorMessageSerializer, WorkerMessage, WorkerMessageDeserializer,
};
use crate::cluster::remote_link::RemoteWorkerLink;
use crate::cluster::CLUSTER_PROTOCOL_VERSION;
use crate::registry::WorkerRegistry;
use parex_execution_exports::{ClusterConfig, ExecutionError};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) struct ClusterCoordinator {
    stop_handle: ClusterListenerStopHandle,
    local_addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl ClusterCoordinator {
    /// Listen for workers and register them into `registry`
    pub fn start(
        config: &ClusterConfig,
        registry: Arc<WorkerRegistry>,
    ) -> Result<Self, ExecutionError> {
        let (stop_handle, mut listener) = ClusterListener::create(&config.bind_address())?;
        let local_addr = listener.local_addr()?;
        let config = config.clone();
        let thread = std::thread::Builder::new()
            .name("cluster-coordinator".into())
            .spawn(move || {
                let mut connections: Vec<JoinHandle<()>> = Vec::new();
                loop {
                    match listener.poll() {
                        Ok(PollEvent::NewConnections(accepted)) => {
                            connections.retain(|handle| !handle.is_finished());
                            for (stream, remote_addr) in accepted {
                                connections.extend(accept_worker(
                                    stream,
                                    remote_addr,
                                    &config,
                                    &registry,
                                ));
                            }
                        }
                        Ok(PollEvent::Stop) => break,
                        Err(err) => {
                            warn!("cluster listener failed: {}", err);
                            break;
                        }
                    }
                }
                debug!("cluster coordinator stopped listening");
                for handle in connections {
                    if handle.join().is_err() {
                        warn!("a cluster connection thread panicked");
                    }
                }
            })?;
        Ok(ClusterCoordinator {
            stop_handle,
            local_addr,
            thread,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting workers and wait for every connection thread.
    /// Registered connections must have been closed through their links beforehand;
    /// a connection still in its handshake ends within `handshake_timeout`.
    pub fn stop(self) {
        if let Err(err) = self.stop_handle.stop() {
            warn!("could not wake the cluster listener: {}", err);
        }
        if self.thread.join().is_err() {
            warn!("the cluster coordinator thread panicked");
        }
    }
}

fn accept_worker(
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: &ClusterConfig,
    registry: &Arc<WorkerRegistry>,
) -> Option<JoinHandle<()>> {
    let config = config.clone();
    let registry = registry.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("cluster-link-{}", remote_addr))
        .spawn(move || {
            if let Err(err) = serve_worker(stream, remote_addr, &config, &registry) {
                debug!("cluster connection from {} closed: {}", remote_addr, err);
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!("could not serve the connection from {}: {}", remote_addr, err);
            None
        }
    }
}

/// Handshake, registration, then read results until the connection drops
fn serve_worker(
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: &ClusterConfig,
    registry: &WorkerRegistry,
) -> Result<(), ExecutionError> {
    let (mut reader, writer) = binder::split::<WorkerMessage, CoordinatorMessage, _, _>(
        stream,
        WorkerMessageDeserializer::new(),
        CoordinatorMessageSerializer::new(),
        config.max_message_size,
    )?;
    reader.set_timeout(Some(config.handshake_timeout))?;
    let first = reader.next()?;
    reader.set_timeout(None)?;

    let (worker_id, protocol_version) = match first {
        WorkerMessage::Register {
            worker_id,
            protocol_version,
        } => (worker_id, protocol_version),
        WorkerMessage::GroupResult { .. } => {
            return Err(ExecutionError::ProtocolError(
                "expected a registration".to_string(),
            ))
        }
    };
    let link = Arc::new(RemoteWorkerLink::new(worker_id.clone(), writer));
    if protocol_version != CLUSTER_PROTOCOL_VERSION {
        let reason = format!("unsupported protocol version {}", protocol_version);
        link.reject(reason.clone());
        return Err(ExecutionError::ProtocolError(reason));
    }
    let registration = match registry.register(worker_id.clone(), link.clone()) {
        Ok(registration) => registration,
        Err(err) => {
            link.reject(err.to_string());
            return Err(err);
        }
    };
    if let Err(err) = link.send(&CoordinatorMessage::Registered) {
        registry.unregister(registration);
        return Err(err);
    }
    registry.mark_ready(registration);
    info!("cluster worker {} joined from {}", worker_id, remote_addr);

    let outcome = link.read_results(&mut reader);
    registry.unregister(registration);
    link.fail_pending("connection lost");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Read;
    use std::time::{Duration, Instant};

    #[test]
    #[serial]
    fn test_stop_waits_for_pending_handshakes() {
        let config = ClusterConfig {
            handshake_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let registry = Arc::new(WorkerRegistry::new());
        let coordinator = ClusterCoordinator::start(&config, registry.clone()).unwrap();

        // connects but never registers
        let mut silent = TcpStream::connect(coordinator.local_addr()).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        registry.close();
        let started = Instant::now();
        coordinator.stop();
        assert!(started.elapsed() >= Duration::from_millis(100));

        // the connection thread is gone, so is its end of the socket
        silent
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut buffer = [0u8; 16];
        assert_eq!(silent.read(&mut buffer).unwrap(), 0);
        assert_eq!(registry.counts(), (0, 0));
    }
}
