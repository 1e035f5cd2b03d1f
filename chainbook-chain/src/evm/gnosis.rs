//! Gnosis passthrough over the generic EVM adapter.

use std::time::Duration;
use tracing::info;

use chainbook_core::traits::ChainError;

use super::EvmClient;

pub const GNOSIS_MAINNET: u64 = 100;

fn network_params(id: u64) -> Result<(&'static str, bool), ChainError> {
    match id {
        GNOSIS_MAINNET => Ok(("livenet", false)),
        other => Err(ChainError::UnknownNetwork(other)),
    }
}

pub struct GnosisClient {
    evm: EvmClient,
}

impl GnosisClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        Ok(GnosisClient { evm: EvmClient::new(url, timeout)? })
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_dispatch() {
        assert_eq!(network_params(100).unwrap(), ("livenet", false));
        assert_eq!(network_params(4002), Err(ChainError::UnknownNetwork(4002)));
    }
}
