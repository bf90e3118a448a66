// Copyright (c) 2022 MASSA LABS <info@massa.net>

use parex_hash::Hash;
use serde::{Deserialize, Serialize};

hash_based_id!(
    /// Identifier of the chain whose state a batch executes against
    ChainId,
    ChainIdSerializer,
    ChainIdDeserializer,
    'C'
);

impl ChainId {
    /// Chain identifier derived from a human readable chain name
    pub fn from_name(name: &str) -> Self {
        ChainId::derive(name.as_bytes())
    }
}

/// Chain-level information handed to the contract executor for every transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    /// chain the context belongs to
    pub chain_id: ChainId,
    /// height of the last block of the chain
    pub height: u64,
    /// hash of the last block of the chain
    pub last_block_hash: Hash,
}
