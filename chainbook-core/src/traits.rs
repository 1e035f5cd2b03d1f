//! Chain facade and parser traits implemented per chain.
//!
//! The facade is a capability set: block access, tx access, balances, token
//! info, mempool (may be empty), fee estimation and raw-tx broadcast. Chains
//! that do not support a capability keep the default implementation.

use async_trait::async_trait;
use num_bigint::BigInt;
use thiserror::Error;

use crate::{
    address::AddressError,
    models::{
        blockchain::{Account, Block, BlockHeader, BlockInfo, ChainInfo, Tx, TxOutput},
        token::{InternalTransfer, TokenTransfer, Trc10Token, Trc20Token},
        AddressDescriptor, ChainKind,
    },
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Block not found")]
    BlockNotFound,
    #[error("Tx not found")]
    TxNotFound,
    #[error("Address missing")]
    AddressMissing,
    #[error("Txid missing")]
    TxidMissing,
    #[error("TRC 10 token not found")]
    Trc10TokenNotFound,
    #[error("TRC 20 token not found")]
    Trc20TokenNotFound,
    #[error("Contract not found")]
    ContractNotFound,
    #[error("Empty response from server")]
    EmptyResponse,
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("[{status}] {body}")]
    Status { status: String, body: String },
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("Unknown network id {0}")]
    UnknownNetwork(u64),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error("Failed to decode: {0}")]
    DecodeError(String),
}

/// Notifications pushed by a chain client to downstream watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    NewBlock,
    NewTx,
}

/// Callback invoked by the best-block notifier.
pub type PushHandler = std::sync::Arc<dyn Fn(NotificationType) + Send + Sync>;

/// Uniform interface the indexer consumes, implemented by each chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Connects to the backend and resolves network parameters.
    async fn initialize(&self) -> Result<(), ChainError>;

    fn chain_kind(&self) -> ChainKind;

    fn network(&self) -> String;

    fn is_testnet(&self) -> bool;

    async fn get_chain_info(&self) -> Result<ChainInfo, ChainError>;

    async fn get_best_block_hash(&self) -> Result<String, ChainError>;

    async fn get_best_block_height(&self) -> Result<u32, ChainError>;

    async fn get_block_hash(&self, height: u32) -> Result<String, ChainError>;

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, ChainError>;

    /// Full block with converted transactions; the indexer's hot path.
    /// Height is the authoritative key, the hash is informational.
    async fn get_block(&self, hash: &str, height: u32) -> Result<Block, ChainError>;

    async fn get_block_info(&self, hash: &str) -> Result<BlockInfo, ChainError>;

    async fn get_transaction(&self, txid: &str) -> Result<Tx, ChainError>;

    /// Backend-specific form of a transaction for the verbose API.
    async fn get_transaction_specific(&self, tx: &Tx) -> Result<serde_json::Value, ChainError>;

    async fn get_mempool_transactions(&self) -> Result<Vec<String>, ChainError> {
        Ok(Vec::new())
    }

    async fn estimate_fee(&self, _blocks: u32) -> Result<BigInt, ChainError> {
        Ok(BigInt::from(0))
    }

    async fn estimate_smart_fee(
        &self,
        blocks: u32,
        _conservative: bool,
    ) -> Result<BigInt, ChainError> {
        self.estimate_fee(blocks).await
    }

    async fn send_raw_transaction(&self, _hex: &str) -> Result<String, ChainError> {
        Err(ChainError::Unsupported("Send transactions".to_string()))
    }

    async fn trc10_token_info(&self, _desc: &AddressDescriptor) -> Result<Trc10Token, ChainError> {
        Err(ChainError::Unsupported("TRC 10 token info".to_string()))
    }

    async fn trc10_balance(
        &self,
        _addr: &AddressDescriptor,
        _token: &AddressDescriptor,
    ) -> Result<BigInt, ChainError> {
        Err(ChainError::Unsupported("TRC 10 balance".to_string()))
    }

    async fn trc20_token_info(
        &self,
        _contract: &AddressDescriptor,
    ) -> Result<Trc20Token, ChainError> {
        Err(ChainError::Unsupported("TRC 20 token info".to_string()))
    }

    async fn trc20_balance(
        &self,
        _addr: &AddressDescriptor,
        _contract: &AddressDescriptor,
    ) -> Result<BigInt, ChainError> {
        Err(ChainError::Unsupported("TRC 20 balance".to_string()))
    }

    async fn get_account(&self, _addr: &AddressDescriptor) -> Result<Account, ChainError> {
        Err(ChainError::Unsupported("Account lookup".to_string()))
    }

    async fn get_account_balance(
        &self,
        _addr: &str,
        _block_hash: &str,
        _block_height: u64,
    ) -> Result<i64, ChainError> {
        Err(ChainError::Unsupported("Account balance".to_string()))
    }
}

/// Serialization of canonical transactions to and from byte buffers, plus
/// the per-chain transfer extractors the index writer runs on each tx.
pub trait ChainParser: Send + Sync {
    /// Length of a packed txid in bytes.
    fn packed_txid_len(&self) -> usize;

    fn block_addresses_to_keep(&self) -> u32;

    fn amount_decimal_point(&self) -> u32;

    fn pack_txid(&self, txid: &str) -> Result<Vec<u8>, ChainError>;

    fn unpack_txid(&self, buf: &[u8]) -> Result<String, ChainError>;

    fn addr_desc_from_address(&self, address: &str) -> Result<AddressDescriptor, ChainError>;

    /// Descriptor of the single output address; `AddressMissing` otherwise.
    fn addr_desc_from_vout(&self, output: &TxOutput) -> Result<AddressDescriptor, ChainError>;

    fn addresses_from_addr_desc(
        &self,
        desc: &AddressDescriptor,
    ) -> Result<Vec<String>, ChainError>;

    fn pack_tx(&self, tx: &Tx) -> Result<Vec<u8>, ChainError>;

    /// Deserializes a packed transaction and returns it with its height.
    fn unpack_tx(&self, buf: &[u8]) -> Result<(Tx, u32), ChainError>;

    fn trc10_transfers(&self, tx: &Tx) -> Result<Vec<TokenTransfer>, ChainError>;

    fn trc20_transfers(&self, tx: &Tx) -> Result<Vec<TokenTransfer>, ChainError>;

    fn internal_transfers(&self, tx: &Tx) -> Result<Vec<InternalTransfer>, ChainError>;
}
