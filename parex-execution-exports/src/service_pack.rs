// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::resource_oracle::ResourceOracle;
use crate::services::{
    AccountContextProvider, ChainContextProvider, FunctionMetadataProvider, SmartContractExecutor,
    WorldState,
};
use std::sync::Arc;

/// Dependencies shared by every worker of a process.
///
/// Built once at startup and handed to workers behind an `Arc`, never mutated afterwards.
#[derive(Clone)]
pub struct ServicePack {
    /// chain context access
    pub chain_context: Arc<dyn ChainContextProvider>,
    /// contract execution
    pub smart_contract: Arc<dyn SmartContractExecutor>,
    /// resource detection
    pub resource_oracle: ResourceOracle,
    /// world state access
    pub world_state: Arc<dyn WorldState>,
    /// account context access
    pub account_context: Arc<dyn AccountContextProvider>,
}

impl ServicePack {
    /// Bundle the collaborators, building the resource oracle on top of `function_metadata`
    pub fn new(
        chain_context: Arc<dyn ChainContextProvider>,
        smart_contract: Arc<dyn SmartContractExecutor>,
        function_metadata: Arc<dyn FunctionMetadataProvider>,
        world_state: Arc<dyn WorldState>,
        account_context: Arc<dyn AccountContextProvider>,
    ) -> Self {
        ServicePack {
            chain_context,
            smart_contract,
            resource_oracle: ResourceOracle::new(function_metadata),
            world_state,
            account_context,
        }
    }
}
