//! Fantom passthrough over the generic EVM adapter.

use std::time::Duration;
use tracing::info;

use chainbook_core::traits::ChainError;

use super::EvmClient;

pub const FANTOM_MAINNET: u64 = 250;
pub const FANTOM_TESTNET: u64 = 4002;

fn network_params(id: u64) -> Result<(&'static str, bool), ChainError> {
    match id {
        FANTOM_MAINNET => Ok(("livenet", false)),
        FANTOM_TESTNET => Ok(("testnet", true)),
        other => Err(ChainError::UnknownNetwork(other)),
    }
}

pub struct FantomClient {
    evm: EvmClient,
}

impl FantomClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        Ok(FantomClient { evm: EvmClient::new(url, timeout)? })
    }

    /// Resolve the network from `net_version`; unknown ids are fatal.
    pub async fn initialize(&self) -> Result<(), ChainError> {
        let id = self.evm.rpc.network_id().await?;
        let (network, testnet) = network_params(id)?;
        self.evm.set_network(network, testnet);
        info!(network, "chain initialized");
        Ok(())
    }

    pub fn network(&self) -> String {
        self.evm.network()
    }

    pub fn is_testnet(&self) -> bool {
        self.evm.is_testnet()
    }

    pub async fn get_block_hash(&self, height: u32) -> Result<String, ChainError> {
        self.evm.get_block_hash(height).await
    }
}
