// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::services::FunctionMetadataProvider;
use parex_models::{
    resource::{AccessSet, ResourcePath, ResourceUsage},
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::debug;

/// Answers which state resources a transaction may touch.
///
/// Unknown functions are reported as touching the whole state.
#[derive(Clone)]
pub struct ResourceOracle {
    metadata: Arc<dyn FunctionMetadataProvider>,
}

impl ResourceOracle {
    /// Oracle backed by a function metadata provider
    pub fn new(metadata: Arc<dyn FunctionMetadataProvider>) -> Self {
        ResourceOracle { metadata }
    }

    /// Resources touched by `transaction`, including the nonce of its sender
    pub fn resources_of(&self, transaction: &Transaction) -> ResourceUsage {
        let content = &transaction.content;
        match self
            .metadata
            .function_metadata(&content.to, &content.method)
        {
            Some(metadata) => {
                let mut access = AccessSet::from(&metadata);
                access.add_write(ResourcePath::account(content.from));
                ResourceUsage::Paths(access)
            }
            None => {
                debug!(
                    "no metadata for {}::{} in transaction {}, assuming whole state",
                    content.to, content.method, transaction.id
                );
                ResourceUsage::WholeState
            }
        }
    }
}
