// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! This file defines the configuration of the execution service.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Topology of the worker pool, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// fixed set of in-process workers
    Local,
    /// workers hosted by remote worker nodes that register over the network
    Cluster,
}

/// Cluster mode configuration
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// name of this node, prefixes the identities of the workers it hosts
    pub node_name: String,
    /// host the coordinator listens on
    pub host: IpAddr,
    /// port the coordinator listens on
    pub port: u16,
    /// coordinators a worker node connects to, defaults to `host:port` when empty
    #[serde(default)]
    pub seeds: Vec<SocketAddr>,
    /// maximum wait for the first worker to register
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub formation_timeout: Duration,
    /// maximum duration of the registration handshake
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub handshake_timeout: Duration,
    /// delay between two connection attempts of a worker node
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub connect_retry_interval: Duration,
    /// maximum size of a cluster message, in bytes
    pub max_message_size: u32,
}

impl ClusterConfig {
    /// Address the coordinator binds
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Coordinators a worker node connects to
    pub fn seed_addresses(&self) -> Vec<SocketAddr> {
        if self.seeds.is_empty() {
            vec![self.bind_address()]
        } else {
            self.seeds.clone()
        }
    }
}

/// Execution service configuration
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// worker pool topology
    pub mode: RouterMode,
    /// number of in-process workers (local mode) or of hosted workers (worker node)
    pub local_worker_count: usize,
    /// capacity of each local worker mailbox
    pub worker_mailbox_size: usize,
    /// maximum wait for a ready worker when starting local workers or dispatching
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub worker_ready_timeout: Duration,
    /// maximum wait for the results of a batch, unbounded when absent
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    pub dispatch_timeout: Option<Duration>,
    /// discard the pending state changes of failed transactions immediately
    pub discard_pending_changes: bool,
    /// cluster mode configuration
    pub cluster: ClusterConfig,
}
