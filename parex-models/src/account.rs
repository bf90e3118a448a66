// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::address::Address;
use crate::chain::ChainId;
use serde::{Deserialize, Serialize};

/// Per-chain state of an account as seen by the execution core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// account address
    pub address: Address,
    /// chain the account lives on
    pub chain_id: ChainId,
    /// number of transactions already executed from this account
    pub nonce: u64,
}
