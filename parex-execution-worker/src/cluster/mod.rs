// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Cluster mode: remote workers connect to the coordinator over TCP, register under
//! their worker identifier, then execute the groups they are sent.

mod binder;
mod coordinator;
mod listener;
mod messages;
mod remote_link;
mod worker_node;

pub(crate) use coordinator::ClusterCoordinator;
pub use worker_node::{start_worker_node, WorkerNodeManager};

/// Version of the cluster protocol spoken by this build
pub(crate) const CLUSTER_PROTOCOL_VERSION: u32 = 1;
