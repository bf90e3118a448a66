// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Domain types shared by the execution crates: transactions, the state resources they
//! touch, the traces they produce and the identities used to route them.

#![warn(missing_docs)]

pub use error::ModelsError;

#[macro_use]
mod macros;

/// account context
pub mod account;
/// addresses of accounts and contracts
pub mod address;
/// chain identity and context
pub mod chain;
/// size limits used by the binary formats
pub mod config;
/// models error
pub mod error;
/// state resources and access sets
pub mod resource;
/// execution results
pub mod trace;
/// transactions
pub mod transaction;
/// worker identities
pub mod worker_id;
