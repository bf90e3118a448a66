// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! The execution worker runs transaction batches in parallel while never running two
//! conflicting transactions at the same time:
//!
//! * the grouper asks the resource oracle which state paths each transaction touches and
//!   partitions the batch into groups with pairwise disjoint resources
//! * a per-call requestor sends every group to the router and gathers the replies
//! * the router hands each group to one ready worker, round-robin
//! * a worker executes the transactions of its group sequentially and returns their traces
//! * the traces are put back in submission order
//!
//! The worker pool is built lazily on the first batch (or by `initialize_pool`), either as
//! a fixed set of in-process worker threads (local mode) or as a directory of remote
//! workers that register over TCP (cluster mode). `start_worker_node` runs the remote side.
//!
//! # Architecture
//!
//! ## controller.rs
//! Implements `ExecutionController` and `ExecutionManager`: lazy pool initialization,
//! statistics and drain on stop.
//!
//! ## orchestrator.rs
//! Groups a batch, fans the groups out and rebuilds the submission order.
//!
//! ## grouper.rs
//! Partitions a batch into conflict-free groups (connected components of the conflict graph).
//!
//! ## requestor.rs
//! Dispatches the groups of one batch and correlates the replies.
//!
//! ## router.rs and registry.rs
//! Worker selection over a registry of workers that may join or leave at any time.
//!
//! ## worker.rs
//! Sequential execution of a group and the in-process worker threads.
//!
//! ## cluster
//! Wire protocol, listener, coordinator side and worker-node side of cluster mode.

mod cluster;
mod controller;
mod grouper;
mod orchestrator;
mod registry;
mod request;
mod requestor;
mod router;
mod worker;

pub use cluster::{start_worker_node, WorkerNodeManager};
pub use controller::{start_execution_worker, ExecutionControllerImpl, ExecutionManagerImpl};

#[cfg(test)]
mod tests;
