// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Interfaces of the collaborators a worker calls while executing a group.

use crate::error::ServiceError;
use parex_models::{
    account::AccountContext,
    address::Address,
    chain::{ChainContext, ChainId},
    resource::{FunctionMetadata, ResourcePath},
    trace::{StateChange, TransactionTrace},
    transaction::{Transaction, TransactionId},
};

/// Access to chain-level context
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait ChainContextProvider: Send + Sync {
    /// Context of the chain `chain_id`
    fn chain_context(&self, chain_id: &ChainId) -> Result<ChainContext, ServiceError>;
}

/// Contract execution capability.
///
/// A contract failure is reported inside the returned trace.
/// An `Err` means the executor itself cannot go on.
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait SmartContractExecutor: Send + Sync {
    /// Execute one transaction against the given chain context
    fn execute(
        &self,
        transaction: &Transaction,
        chain_context: &ChainContext,
    ) -> Result<TransactionTrace, ServiceError>;
}

/// Metadata of contract functions
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait FunctionMetadataProvider: Send + Sync {
    /// Resources declared for `method` of `contract`, if known
    fn function_metadata(&self, contract: &Address, method: &str) -> Option<FunctionMetadata>;
}

/// Keyed state backend with per-transaction pending changes
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait WorldState: Send + Sync {
    /// Latest value of `path`, pending changes included
    fn get(&self, path: &ResourcePath) -> Result<Option<Vec<u8>>, ServiceError>;

    /// Record the changes of a successful transaction as pending
    fn stage_changes(
        &self,
        transaction_id: &TransactionId,
        changes: &[StateChange],
    ) -> Result<(), ServiceError>;

    /// Drop every pending change of a transaction
    fn discard_changes(&self, transaction_id: &TransactionId) -> Result<(), ServiceError>;

    /// Whether the pending changes of failed transactions are discarded immediately
    fn discards_pending_changes(&self) -> bool;

    /// Process-wide switch of the discard policy
    fn set_discard_pending_changes(&self, enabled: bool);
}

/// Access to account-level context
#[cfg_attr(any(test, feature = "test-exports"), mockall::automock)]
pub trait AccountContextProvider: Send + Sync {
    /// Context of `address` on `chain_id`
    fn account_context(
        &self,
        address: &Address,
        chain_id: &ChainId,
    ) -> Result<AccountContext, ServiceError>;

    /// Update the nonce of `address` on `chain_id`
    fn set_nonce(&self, address: &Address, chain_id: &ChainId, nonce: u64)
        -> Result<(), ServiceError>;
}
