// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::memory::{
    KeyValueContract, MemoryAccounts, MemoryWorldState, StaticChainContexts, StaticFunctionMetadata,
};
use crate::ServicePack;
use parex_models::{
    address::Address,
    chain::ChainId,
    resource::{FunctionMetadata, ResourcePath},
    transaction::{Transaction, TransactionContent},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// gives every test transaction a distinct id
static NEXT_NONCE: AtomicU64 = AtomicU64::new(0);

/// Service pack over in-memory collaborators, with handles on each of them
pub struct TestServices {
    /// the pack handed to the execution service
    pub service_pack: Arc<ServicePack>,
    /// world state of the pack
    pub world_state: Arc<MemoryWorldState>,
    /// account nonces of the pack
    pub accounts: Arc<MemoryAccounts>,
    /// metadata table of the pack
    pub metadata: Arc<StaticFunctionMetadata>,
    /// the only chain known by the pack
    pub chain_id: ChainId,
}

impl TestServices {
    /// Fresh in-memory services executing `KeyValueContract`s
    pub fn new() -> Self {
        let chain_id = ChainId::from_name("parex-test");
        let world_state = Arc::new(MemoryWorldState::new());
        let accounts = Arc::new(MemoryAccounts::new());
        let metadata = Arc::new(StaticFunctionMetadata::new());
        let service_pack = Arc::new(ServicePack::new(
            Arc::new(StaticChainContexts::new().with_chain(chain_id)),
            Arc::new(KeyValueContract::new(world_state.clone())),
            metadata.clone(),
            world_state.clone(),
            accounts.clone(),
        ));
        TestServices {
            service_pack,
            world_state,
            accounts,
            metadata,
            chain_id,
        }
    }

    /// Transaction calling a key-value contract, with its metadata declared
    pub fn declared_call(&self, sender: &str, contract: &str, method: &str) -> Transaction {
        let contract_address = contract_address(contract);
        if let Some(metadata) = KeyValueContract::describe(&contract_address, method) {
            self.metadata.register(contract_address, method, metadata);
        }
        call(sender, contract, method, Vec::new())
    }

    /// Transaction writing `key` of `contract`, with its metadata declared
    pub fn write_call(&self, sender: &str, contract: &str, key: &str) -> Transaction {
        let contract_address = contract_address(contract);
        let method = format!("set:{}", key);
        let mut metadata = FunctionMetadata::default();
        metadata
            .writes
            .insert(ResourcePath::new(contract_address, key));
        self.metadata.register(contract_address, method.clone(), metadata);
        call(sender, contract, &method, key.as_bytes().to_vec())
    }
}

impl Default for TestServices {
    fn default() -> Self {
        Self::new()
    }
}

/// Address of a test account or contract
pub fn contract_address(name: &str) -> Address {
    Address::derive(name.as_bytes())
}

/// Transaction from `sender` calling `method` on `contract`, without declaring metadata.
/// Each call gets a fresh nonce.
pub fn call(sender: &str, contract: &str, method: &str, params: Vec<u8>) -> Transaction {
    Transaction::new(TransactionContent {
        from: contract_address(sender),
        to: contract_address(contract),
        method: method.to_string(),
        params,
        nonce: NEXT_NONCE.fetch_add(1, Ordering::Relaxed),
    })
    .expect("test transaction content must serialize")
}
