// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! In-memory collaborators: a world state with per-transaction pending changes,
//! account and chain registries, a static metadata table and a key-value contract.

use crate::error::ServiceError;
use crate::services::{
    AccountContextProvider, ChainContextProvider, FunctionMetadataProvider, SmartContractExecutor,
    WorldState,
};
use parex_hash::Hash;
use parex_models::{
    account::AccountContext,
    address::Address,
    chain::{ChainContext, ChainId},
    resource::{FunctionMetadata, ResourcePath},
    trace::{ExecutionStatus, StateChange, TransactionTrace},
    transaction::{Transaction, TransactionId},
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// World state keeping committed values and the pending changes of executed transactions
#[derive(Default)]
pub struct MemoryWorldState {
    committed: RwLock<BTreeMap<ResourcePath, Vec<u8>>>,
    pending: Mutex<Vec<(TransactionId, Vec<StateChange>)>>,
    discard_pending_changes: AtomicBool,
}

impl MemoryWorldState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// State initialized with committed values
    pub fn with_values(values: impl IntoIterator<Item = (ResourcePath, Vec<u8>)>) -> Self {
        MemoryWorldState {
            committed: RwLock::new(values.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Apply every pending change in staging order. Returns the number of committed transactions.
    pub fn commit(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut committed = self.committed.write();
        for (_, changes) in &pending {
            for change in changes {
                match &change.value {
                    Some(value) => committed.insert(change.path.clone(), value.clone()),
                    None => committed.remove(&change.path),
                };
            }
        }
        pending.len()
    }

    /// Transactions with staged changes, in staging order
    pub fn pending_transactions(&self) -> Vec<TransactionId> {
        self.pending.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Committed values with the pending changes applied on top
    pub fn snapshot(&self) -> BTreeMap<ResourcePath, Vec<u8>> {
        let mut values = self.committed.read().clone();
        for (_, changes) in self.pending.lock().iter() {
            for change in changes {
                match &change.value {
                    Some(value) => values.insert(change.path.clone(), value.clone()),
                    None => values.remove(&change.path),
                };
            }
        }
        values
    }
}

impl WorldState for MemoryWorldState {
    fn get(&self, path: &ResourcePath) -> Result<Option<Vec<u8>>, ServiceError> {
        {
            let pending = self.pending.lock();
            let latest = pending
                .iter()
                .rev()
                .flat_map(|(_, changes)| changes.iter().rev())
                .find(|change| &change.path == path);
            if let Some(change) = latest {
                return Ok(change.value.clone());
            }
        }
        Ok(self.committed.read().get(path).cloned())
    }

    fn stage_changes(
        &self,
        transaction_id: &TransactionId,
        changes: &[StateChange],
    ) -> Result<(), ServiceError> {
        if !changes.is_empty() {
            self.pending
                .lock()
                .push((*transaction_id, changes.to_vec()));
        }
        Ok(())
    }

    fn discard_changes(&self, transaction_id: &TransactionId) -> Result<(), ServiceError> {
        self.pending.lock().retain(|(id, _)| id != transaction_id);
        Ok(())
    }

    fn discards_pending_changes(&self) -> bool {
        self.discard_pending_changes.load(Ordering::Acquire)
    }

    fn set_discard_pending_changes(&self, enabled: bool) {
        self.discard_pending_changes.store(enabled, Ordering::Release);
    }
}

/// Account nonces per chain
#[derive(Default)]
pub struct MemoryAccounts {
    nonces: RwLock<HashMap<(Address, ChainId), u64>>,
}

impl MemoryAccounts {
    /// No account known, every nonce starts at 0
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountContextProvider for MemoryAccounts {
    fn account_context(
        &self,
        address: &Address,
        chain_id: &ChainId,
    ) -> Result<AccountContext, ServiceError> {
        let nonce = self
            .nonces
            .read()
            .get(&(*address, *chain_id))
            .copied()
            .unwrap_or_default();
        Ok(AccountContext {
            address: *address,
            chain_id: *chain_id,
            nonce,
        })
    }

    fn set_nonce(
        &self,
        address: &Address,
        chain_id: &ChainId,
        nonce: u64,
    ) -> Result<(), ServiceError> {
        self.nonces.write().insert((*address, *chain_id), nonce);
        Ok(())
    }
}

/// Known chains and their contexts
#[derive(Default)]
pub struct StaticChainContexts {
    contexts: RwLock<HashMap<ChainId, ChainContext>>,
}

impl StaticChainContexts {
    /// No chain known
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain at height 0
    pub fn with_chain(self, chain_id: ChainId) -> Self {
        self.add_chain(chain_id);
        self
    }

    /// Register a chain at height 0, keeping its context if already known
    pub fn add_chain(&self, chain_id: ChainId) {
        self.contexts
            .write()
            .entry(chain_id)
            .or_insert_with(|| ChainContext {
                chain_id,
                height: 0,
                last_block_hash: Hash::compute_from(chain_id.get_hash().to_bytes()),
            });
    }

    /// Register or replace the context of a chain
    pub fn insert(&self, context: ChainContext) {
        self.contexts.write().insert(context.chain_id, context);
    }
}

impl ChainContextProvider for StaticChainContexts {
    fn chain_context(&self, chain_id: &ChainId) -> Result<ChainContext, ServiceError> {
        self.contexts
            .read()
            .get(chain_id)
            .cloned()
            .ok_or(ServiceError::UnknownChain(*chain_id))
    }
}

/// Table of declared function metadata
#[derive(Default)]
pub struct StaticFunctionMetadata {
    entries: RwLock<HashMap<(Address, String), FunctionMetadata>>,
}

impl StaticFunctionMetadata {
    /// Empty table: every function is unknown
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the resources of `method` on `contract`
    pub fn register(&self, contract: Address, method: impl Into<String>, metadata: FunctionMetadata) {
        self.entries
            .write()
            .insert((contract, method.into()), metadata);
    }
}

impl FunctionMetadataProvider for StaticFunctionMetadata {
    fn function_metadata(&self, contract: &Address, method: &str) -> Option<FunctionMetadata> {
        self.entries
            .read()
            .get(&(*contract, method.to_string()))
            .cloned()
    }
}

/// Contract storing byte values under keys of its own state.
///
/// Methods are `<operation>:<key>`:
/// * `set:<key>` stores the parameters
/// * `get:<key>` returns the stored value
/// * `delete:<key>` removes the value
/// * `increment:<key>` adds one to a little-endian `u64` and returns it
/// * `fail:<key>` raises a contract error
///
/// `abort` makes the executor itself fail.
pub struct KeyValueContract {
    world_state: Arc<dyn WorldState>,
}

impl KeyValueContract {
    /// Contract reading its values from `world_state`
    pub fn new(world_state: Arc<dyn WorldState>) -> Self {
        KeyValueContract { world_state }
    }

    /// Resources touched by `method` of a key-value contract deployed at `contract`
    pub fn describe(contract: &Address, method: &str) -> Option<FunctionMetadata> {
        let (operation, key) = method.split_once(':')?;
        let path = ResourcePath::new(*contract, key);
        let mut metadata = FunctionMetadata::default();
        match operation {
            "get" => {
                metadata.reads.insert(path);
            }
            "set" | "delete" | "increment" | "fail" => {
                metadata.writes.insert(path);
            }
            _ => return None,
        }
        Some(metadata)
    }

    fn read_counter(&self, path: &ResourcePath) -> Result<Result<u64, String>, ServiceError> {
        Ok(match self.world_state.get(path)? {
            None => Ok(0),
            Some(bytes) => bytes
                .as_slice()
                .try_into()
                .map(u64::from_le_bytes)
                .map_err(|_| format!("value of {} is not a counter", path)),
        })
    }
}

impl SmartContractExecutor for KeyValueContract {
    fn execute(
        &self,
        transaction: &Transaction,
        _chain_context: &ChainContext,
    ) -> Result<TransactionTrace, ServiceError> {
        let content = &transaction.content;
        if content.method == "abort" {
            return Err(ServiceError::Fatal(format!(
                "execution of {} aborted",
                transaction.id
            )));
        }
        let Some((operation, key)) = content.method.split_once(':') else {
            return Ok(TransactionTrace::failed(
                transaction.id,
                ExecutionStatus::InvalidInstruction(format!("unknown method {}", content.method)),
            ));
        };
        let path = ResourcePath::new(content.to, key);
        let mut trace = match operation {
            "set" => TransactionTrace::executed(
                transaction.id,
                Vec::new(),
                vec![StateChange {
                    path,
                    value: Some(content.params.clone()),
                }],
            ),
            "get" => TransactionTrace::executed(
                transaction.id,
                self.world_state.get(&path)?.unwrap_or_default(),
                Vec::new(),
            ),
            "delete" => TransactionTrace::executed(
                transaction.id,
                Vec::new(),
                vec![StateChange { path, value: None }],
            ),
            "increment" => match self.read_counter(&path)? {
                Err(reason) => {
                    TransactionTrace::failed(transaction.id, ExecutionStatus::ContractError(reason))
                }
                Ok(current) => match current.checked_add(1) {
                    None => TransactionTrace::failed(
                        transaction.id,
                        ExecutionStatus::OutOfResources(format!("counter {} overflowed", path)),
                    ),
                    Some(next) => {
                        let bytes = next.to_le_bytes().to_vec();
                        TransactionTrace::executed(
                            transaction.id,
                            bytes.clone(),
                            vec![StateChange {
                                path,
                                value: Some(bytes),
                            }],
                        )
                    }
                },
            },
            "fail" => TransactionTrace::failed(
                transaction.id,
                ExecutionStatus::ContractError(format!("{} refused the call", path)),
            ),
            _ => TransactionTrace::failed(
                transaction.id,
                ExecutionStatus::InvalidInstruction(format!("unknown method {}", content.method)),
            ),
        };
        trace.logs.push(format!("{} {}", content.method, content.to));
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_models::transaction::TransactionContent;

    fn transaction(method: &str, params: Vec<u8>) -> Transaction {
        Transaction::new(TransactionContent {
            from: Address::derive(b"alice"),
            to: Address::derive(b"store"),
            method: method.to_string(),
            params,
            nonce: 0,
        })
        .unwrap()
    }

    fn context() -> ChainContext {
        ChainContext {
            chain_id: ChainId::from_name("test"),
            height: 0,
            last_block_hash: Hash::compute_from(b"genesis"),
        }
    }

    #[test]
    fn test_pending_changes_shadow_committed_values() {
        let path = ResourcePath::new(Address::derive(b"store"), "k");
        let state = MemoryWorldState::with_values([(path.clone(), vec![1])]);
        let first = TransactionId::derive(b"first");
        let second = TransactionId::derive(b"second");

        state
            .stage_changes(
                &first,
                &[StateChange {
                    path: path.clone(),
                    value: Some(vec![2]),
                }],
            )
            .unwrap();
        state
            .stage_changes(
                &second,
                &[StateChange {
                    path: path.clone(),
                    value: None,
                }],
            )
            .unwrap();
        assert_eq!(state.get(&path).unwrap(), None);

        state.discard_changes(&second).unwrap();
        assert_eq!(state.get(&path).unwrap(), Some(vec![2]));
        assert_eq!(state.pending_transactions(), vec![first]);

        assert_eq!(state.commit(), 1);
        assert!(state.pending_transactions().is_empty());
        assert_eq!(state.get(&path).unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_key_value_contract_counts() {
        let state = Arc::new(MemoryWorldState::new());
        let contract = KeyValueContract::new(state.clone());

        let first = contract
            .execute(&transaction("increment:total", Vec::new()), &context())
            .unwrap();
        assert!(first.is_successful());
        state
            .stage_changes(&first.transaction_id, &first.state_changes)
            .unwrap();
        let second = contract
            .execute(&transaction("increment:total", vec![0]), &context())
            .unwrap();
        assert_eq!(second.return_value, 2u64.to_le_bytes().to_vec());
    }

    #[test]
    fn test_key_value_contract_failures() {
        let contract = KeyValueContract::new(Arc::new(MemoryWorldState::new()));
        let refused = contract
            .execute(&transaction("fail:total", Vec::new()), &context())
            .unwrap();
        assert!(matches!(refused.status, ExecutionStatus::ContractError(_)));
        let unknown = contract
            .execute(&transaction("transfer", Vec::new()), &context())
            .unwrap();
        assert!(matches!(
            unknown.status,
            ExecutionStatus::InvalidInstruction(_)
        ));
        assert!(matches!(
            contract.execute(&transaction("abort", Vec::new()), &context()),
            Err(ServiceError::Fatal(_))
        ));
    }

    #[test]
    fn test_describe_key_value_methods() {
        let store = Address::derive(b"store");
        let get = KeyValueContract::describe(&store, "get:k").unwrap();
        assert!(get.reads.contains(&ResourcePath::new(store, "k")));
        assert!(get.writes.is_empty());
        let set = KeyValueContract::describe(&store, "set:k").unwrap();
        assert!(set.writes.contains(&ResourcePath::new(store, "k")));
        assert!(KeyValueContract::describe(&store, "abort").is_none());
    }
}
