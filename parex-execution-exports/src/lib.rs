// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # Overview
//!
//! This crate provides all the facilities to interact with a running parallel execution
//! service (parex-execution-worker crate), which partitions transaction batches into
//! conflict-free groups and executes them concurrently on a pool of workers.
//!
//! # Usage
//!
//! When the execution service is started, an instance of `ExecutionManager` is returned
//! (see `start_execution_worker` in parex-execution-worker), as well as an instance of
//! `ExecutionController`.
//!
//! The non-clonable `ExecutionManager` drains and stops the service.
//!
//! The clonable `ExecutionController` executes transaction batches and returns one trace
//! per transaction, in submission order.
//!
//! # Architecture
//!
//! ## config.rs
//! Contains configuration parameters for the execution service and its cluster mode.
//!
//! ## controller_traits.rs
//! Defines the `ExecutionManager` and `ExecutionController` traits.
//!
//! ## error.rs
//! Defines error types for the crate.
//!
//! ## services.rs
//! Defines the collaborator interfaces a worker relies on: chain context, contract
//! execution, function metadata, world state and account context.
//!
//! ## service_pack.rs
//! Bundles the collaborators into the immutable `ServicePack` shared by every worker.
//!
//! ## resource_oracle.rs
//! Answers which state resources a transaction may touch.
//!
//! ## memory.rs
//! In-memory implementations of the collaborators.
//!
//! ## types.rs
//! Defines useful shared structures.
//!
//! ## Test exports
//!
//! When the crate feature `test-exports` is enabled, tooling useful for testing purposes is exported.
//! See test_exports/mod.rs for details.

mod config;
mod controller_traits;
mod error;
pub mod memory;
mod resource_oracle;
mod service_pack;
mod services;
mod types;

pub use config::{ClusterConfig, ExecutionConfig, RouterMode};
pub use controller_traits::{ExecutionController, ExecutionManager};
pub use error::{ExecutionError, ExecutionResult, ServiceError};
pub use resource_oracle::ResourceOracle;
pub use service_pack::ServicePack;
pub use services::{
    AccountContextProvider, ChainContextProvider, FunctionMetadataProvider, SmartContractExecutor,
    WorldState,
};
pub use types::ExecutionStats;

#[cfg(any(test, feature = "test-exports"))]
pub use services::{
    MockAccountContextProvider, MockChainContextProvider, MockFunctionMetadataProvider,
    MockSmartContractExecutor, MockWorldState,
};

#[cfg(any(test, feature = "test-exports"))]
pub mod test_exports;
