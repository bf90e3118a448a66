// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! JSON batch files executed by the node.
//!
//! ```json
//! {
//!   "chain": "parex-demo",
//!   "metadata": [{ "contract": "store", "method": "swap:a", "reads": ["b"], "writes": ["a"] }],
//!   "transactions": [{ "from": "alice", "to": "store", "method": "set:a", "params": [1] }]
//! }
//! ```
//!
//! Accounts and contracts are given by name, their addresses are derived from it.
//! Key-value contract methods are declared automatically, `metadata` entries take precedence.

use anyhow::{Context, Result};
use parex_execution_exports::memory::{KeyValueContract, StaticFunctionMetadata};
use parex_models::{
    address::Address,
    chain::ChainId,
    resource::{FunctionMetadata, ResourcePath},
    transaction::{Transaction, TransactionContent},
};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct BatchFile {
    /// chain name
    pub chain: String,
    #[serde(default)]
    pub metadata: Vec<DeclaredFunction>,
    pub transactions: Vec<BatchTransaction>,
}

/// Resources of a contract function, keys relative to the contract
#[derive(Debug, Deserialize)]
pub struct DeclaredFunction {
    pub contract: String,
    pub method: String,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchTransaction {
    pub from: String,
    pub to: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<u8>,
    #[serde(default)]
    pub nonce: u64,
}

/// Address of a named account or contract
pub fn named_address(name: &str) -> Address {
    Address::derive(name.as_bytes())
}

impl BatchFile {
    pub fn read(path: &Path) -> Result<BatchFile> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read batch file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid batch file {}", path.display()))
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId::from_name(&self.chain)
    }

    /// Register the metadata of every called function into `table`
    pub fn declare(&self, table: &StaticFunctionMetadata) {
        for transaction in &self.transactions {
            let contract = named_address(&transaction.to);
            if let Some(metadata) = KeyValueContract::describe(&contract, &transaction.method) {
                table.register(contract, transaction.method.clone(), metadata);
            }
        }
        for declared in &self.metadata {
            let contract = named_address(&declared.contract);
            let mut metadata = FunctionMetadata::default();
            for key in &declared.reads {
                metadata.reads.insert(ResourcePath::new(contract, key.as_str()));
            }
            for key in &declared.writes {
                metadata.writes.insert(ResourcePath::new(contract, key.as_str()));
            }
            table.register(contract, declared.method.clone(), metadata);
        }
    }

    /// Build the transactions, in file order
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.transactions
            .iter()
            .map(|transaction| {
                Transaction::new(TransactionContent {
                    from: named_address(&transaction.from),
                    to: named_address(&transaction.to),
                    method: transaction.method.clone(),
                    params: transaction.params.clone(),
                    nonce: transaction.nonce,
                })
                .with_context(|| format!("invalid transaction {}", transaction.method))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parex_execution_exports::FunctionMetadataProvider;

    const BATCH: &str = r#"{
        "chain": "parex-demo",
        "metadata": [{ "contract": "store", "method": "swap", "reads": ["b"], "writes": ["a"] }],
        "transactions": [
            { "from": "alice", "to": "store", "method": "set:a", "params": [1, 2] },
            { "from": "bob", "to": "store", "method": "swap" },
            { "from": "bob", "to": "store", "method": "mystery" }
        ]
    }"#;

    #[test]
    fn test_batch_file_declares_metadata() {
        let batch: BatchFile = serde_json::from_str(BATCH).unwrap();
        let table = StaticFunctionMetadata::new();
        batch.declare(&table);

        let store = named_address("store");
        let set = table.function_metadata(&store, "set:a").unwrap();
        assert!(set.writes.contains(&ResourcePath::new(store, "a")));
        let swap = table.function_metadata(&store, "swap").unwrap();
        assert!(swap.reads.contains(&ResourcePath::new(store, "b")));
        assert!(swap.writes.contains(&ResourcePath::new(store, "a")));
        assert!(table.function_metadata(&store, "mystery").is_none());
    }

    #[test]
    fn test_batch_file_builds_transactions_in_order() {
        let batch: BatchFile = serde_json::from_str(BATCH).unwrap();
        assert_eq!(batch.chain_id(), ChainId::from_name("parex-demo"));
        let transactions = batch.transactions().unwrap();
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].content.from, named_address("alice"));
        assert_eq!(transactions[0].content.params, vec![1, 2]);
        assert_eq!(transactions[1].content.method, "swap");
        assert_ne!(transactions[1].id, transactions[2].id);
    }

    #[test]
    fn test_batch_file_requires_transactions() {
        assert!(serde_json::from_str::<BatchFile>(r#"{ "chain": "parex-demo" }"#).is_err());
    }
}
