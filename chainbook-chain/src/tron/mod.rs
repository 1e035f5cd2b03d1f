//! Tron chain facade.
//!
//! Owns the RPC client, the parser and the best-block notifier. Indexing is
//! driven through [`ChainClient::get_block`]; everything else serves queries.

pub mod parser;
pub mod raw;
pub mod rpc;

use async_trait::async_trait;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use chainbook_core::{
    models::{
        blockchain::{
            Account, Block, BlockHeader, BlockInfo, ChainInfo, Tx,
        },
        token::{Trc10Token, Trc20Token},
        AddressDescriptor, ChainKind,
    },
    traits::{ChainClient, ChainError, NotificationType, PushHandler},
};

use parser::TronParser;
use rpc::{ClientConfig, TronRpcClient};

fn default_rpc_timeout() -> u64 {
    25
}

/// Chain configuration loaded from the JSON config file. The file is
/// re-read by the notifier, so `stop_at_block` can advance at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub coin_name: String,
    pub coin_shortcut: String,
    #[serde(rename = "tron_rpc_url")]
    pub tron_rpc: String,
    #[serde(rename = "solidity_rpc_url")]
    pub solidity_rpc: String,
    #[serde(rename = "rpc_timeout", default = "default_rpc_timeout")]
    pub rpc_timeout: u64,
    #[serde(default)]
    pub block_addresses_to_keep: u32,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default)]
    pub stop_at_block: u32,
}

impl Configuration {
    pub fn from_json(raw: &str) -> Result<Self, ChainError> {
        let mut config: Configuration = serde_json::from_str(raw)
            .map_err(|e| ChainError::InvalidConfiguration(e.to_string()))?;
        // keep at least 100 block->addresses mappings to allow rollback
        if config.block_addresses_to_keep < 100 {
            config.block_addresses_to_keep = 100;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ChainError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChainError::InvalidConfiguration(e.to_string()))?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BestBlock {
    height: u32,
    time: i64,
}

pub struct TronClient {
    rpc: TronRpcClient,
    parser: Arc<TronParser>,
    chain_config: Mutex<Configuration>,
    config_path: Option<PathBuf>,
    network: Mutex<String>,
    testnet: bool,
    best_block: Mutex<BestBlock>,
    push_handler: PushHandler,
    chan_new_block: mpsc::Sender<u32>,
    shutdown: watch::Sender<bool>,
    trc20_tokens: Mutex<HashMap<String, Trc20Token>>,
}

impl TronClient {
    /// Builds the client and starts the best-block consumer task. The config
    /// watcher starts too when a config path is given; both stop on
    /// [`TronClient::shutdown`].
    pub fn new(
        config: Configuration,
        config_path: Option<PathBuf>,
        push_handler: PushHandler,
    ) -> Result<Arc<Self>, ChainError> {
        let rpc = TronRpcClient::new(ClientConfig {
            tron_node_rpc: config.tron_rpc.clone(),
            solidity_node_rpc: config.solidity_rpc.clone(),
            testnet: config.testnet,
            timeout: Duration::from_secs(config.rpc_timeout),
        })?;

        let parser = Arc::new(TronParser::new(config.block_addresses_to_keep, config.testnet));

        let (chan_new_block, new_block_rx) = mpsc::channel(16);
        let (shutdown, _) = watch::channel(false);

        let client = Arc::new(TronClient {
            rpc,
            parser,
            testnet: config.testnet,
            chain_config: Mutex::new(config),
            config_path,
            network: Mutex::new(String::new()),
            best_block: Mutex::new(BestBlock::default()),
            push_handler,
            chan_new_block,
            shutdown,
            trc20_tokens: Mutex::new(HashMap::new()),
        });

        client.spawn_new_block_consumer(new_block_rx);
        client.spawn_config_watcher();

        Ok(client)
    }

    pub fn parser(&self) -> Arc<TronParser> {
        self.parser.clone()
    }

    pub fn coin_name(&self) -> String {
        self.chain_config
            .lock()
            .expect("chain config lock")
            .coin_name
            .clone()
    }

    /// Stops the notifier tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_new_block_consumer(self: &Arc<Self>, mut rx: mpsc::Receiver<u32>) {
        let client = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    height = rx.recv() => {
                        let Some(height) = height else { break };
                        debug!(height, "new block header");
                        {
                            let mut best = client.best_block.lock().expect("best block lock");
                            if height > best.height {
                                best.height = height;
                                best.time = unix_now();
                            }
                        }
                        (client.push_handler)(NotificationType::NewBlock);
                    }
                }
            }
        });
    }

    /// Ticks once per second, re-reads the configuration file and publishes
    /// advances of `stop_at_block` to the new-block channel.
    fn spawn_config_watcher(self: &Arc<Self>) {
        let Some(path) = self.config_path.clone() else { return };
        let client = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let new_config = match Configuration::from_file(&path) {
                            Ok(c) => c,
                            Err(err) => {
                                warn!(%err, "error reading config file");
                                continue;
                            }
                        };
                        let advanced = {
                            let mut config = client.chain_config.lock().expect("chain config lock");
                            if config.stop_at_block != new_config.stop_at_block {
                                let advanced = (new_config.stop_at_block > config.stop_at_block)
                                    .then_some(new_config.stop_at_block);
                                *config = new_config;
                                advanced
                            } else {
                                None
                            }
                        };
                        if let Some(height) = advanced {
                            info!(stop_at_block = height, "stop trigger advanced");
                            let _ = client.chan_new_block.send(height).await;
                        }
                    }
                }
            }
        });
    }

    async fn compute_confirmations(&self, height: u64) -> Result<i64, ChainError> {
        let best = self.get_best_block_height().await?;
        // a tx in the best block has one confirmation
        Ok(best as i64 - height as i64 + 1)
    }

    async fn tron_header_to_block_header(
        &self,
        block: &chainbook_core::models::blockchain::TronBlock,
    ) -> Result<BlockHeader, ChainError> {
        let confirmations = self.compute_confirmations(block.height).await?;
        Ok(BlockHeader {
            hash: block.hash.clone(),
            prev: block.prev_hash.clone(),
            height: block.height as u32,
            confirmations,
            time: block.time,
            size: 0,
        })
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn is_numeric(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

#[async_trait]
impl ChainClient for TronClient {
    async fn initialize(&self) -> Result<(), ChainError> {
        let network = if self.testnet { "testnet" } else { "livenet" };
        *self.network.lock().expect("network lock") = network.to_string();
        info!(network, "chain initialized");
        Ok(())
    }

    fn chain_kind(&self) -> ChainKind {
        ChainKind::Tron
    }

    fn network(&self) -> String {
        self.network
            .lock()
            .expect("network lock")
            .clone()
    }

    fn is_testnet(&self) -> bool {
        self.testnet
    }

    async fn get_chain_info(&self) -> Result<ChainInfo, ChainError> {
        let ni = self.rpc.get_node_info().await?;
        Ok(ChainInfo {
            blocks: ni.best_block_number,
            best_block_hash: ni.best_block_hash,
            difficulty: "0".to_string(),
            version: ni.version,
            protocol_version: ni.protocol_version,
            chain: self.network(),
            additional: ni.additional,
        })
    }

    async fn get_best_block_hash(&self) -> Result<String, ChainError> {
        let height = self.get_best_block_height().await?;
        self.get_block_hash(height).await
    }

    /// `stop_at_block` pins the best height when set; otherwise the node's
    /// tip advances the monotonic best-block scalar.
    async fn get_best_block_height(&self) -> Result<u32, ChainError> {
        let stop_at_block = self
            .chain_config
            .lock()
            .expect("chain config lock")
            .stop_at_block;
        if stop_at_block > 0 {
            return Ok(stop_at_block);
        }

        let ni = self.rpc.get_node_info().await?;
        let height = ni.best_block_number as u32;
        let mut best = self.best_block.lock().expect("best block lock");
        if height > best.height {
            best.height = height;
            best.time = unix_now();
        }
        Ok(best.height)
    }

    async fn get_block_hash(&self, height: u32) -> Result<String, ChainError> {
        let block = self.rpc.get_block_by_num(height).await?;
        Ok(block.hash)
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeader, ChainError> {
        let block = self.rpc.get_block_by_id(hash).await?;
        self.tron_header_to_block_header(&block).await
    }

    async fn get_block(&self, hash: &str, height: u32) -> Result<Block, ChainError> {
        let best = self.get_best_block_height().await?;
        if height > best {
            return Err(ChainError::BlockNotFound);
        }

        let mut block = self.rpc.get_block_by_num(height).await?;
        let header = self.tron_header_to_block_header(&block).await?;

        // one batch call for the whole block, merged into txs by txid
        let mut infos = if block.txs.is_empty() {
            HashMap::new()
        } else {
            self.rpc
                .get_transaction_info_by_block_num(block.height)
                .await?
        };

        let mut txs = Vec::with_capacity(block.txs.len());
        for tx in block.txs.iter_mut() {
            if let Some(info) = infos.remove(&tx.txid) {
                tx.info = Some(info);
            }
            let converted = self
                .parser
                .tron_tx_to_tx(tx, header.time, header.confirmations.max(0) as u32)
                .map_err(|e| {
                    warn!(hash = %block.hash, height, txid = %tx.txid, %e, "tx conversion failed");
                    e
                })?;
            txs.push(converted);
        }

        Ok(Block { header, txs })
    }

    async fn get_block_info(&self, hash: &str) -> Result<BlockInfo, ChainError> {
        let block = self.rpc.get_block_by_id(hash).await?;
        let header = self.tron_header_to_block_header(&block).await?;

        Ok(BlockInfo {
            header,
            txids: block
                .txs
                .iter()
                .map(|tx| tx.txid.clone())
                .collect(),
            merkle_root: block.merkle_root,
            nonce: "0".to_string(),
            difficulty: "0".to_string(),
        })
    }

    async fn get_transaction(&self, txid: &str) -> Result<Tx, ChainError> {
        let tx = self
            .rpc
            .get_transaction_by_id(txid)
            .await
            .map_err(|_| ChainError::TxNotFound)?;
        let confirmations = self
            .compute_confirmations(tx.block_height)
            .await?;
        self.parser
            .tron_tx_to_tx(&tx, tx.block_time, confirmations.max(0) as u32)
    }

    async fn get_transaction_specific(&self, tx: &Tx) -> Result<serde_json::Value, ChainError> {
        serde_json::to_value(&tx.tron).map_err(|e| ChainError::DecodeError(e.to_string()))
    }

    /// TRC10 metadata; numeric descriptors resolve by asset id, the rest by
    /// asset name.
    async fn trc10_token_info(&self, desc: &AddressDescriptor) -> Result<Trc10Token, ChainError> {
        let descriptor = String::from_utf8(desc.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;

        let ai = if is_numeric(&descriptor) {
            self.rpc
                .get_asset_info_by_id(&descriptor)
                .await?
        } else {
            self.rpc
                .get_asset_info_by_name(&descriptor)
                .await?
        };

        if ai.id.is_empty() && ai.name.is_empty() {
            return Err(ChainError::Trc10TokenNotFound);
        }

        Ok(Trc10Token {
            contract: ai.id,
            name: ai.name,
            symbol: ai.abbr,
            decimals: ai.precision,
        })
    }

    async fn trc10_balance(
        &self,
        addr: &AddressDescriptor,
        token: &AddressDescriptor,
    ) -> Result<BigInt, ChainError> {
        let address = String::from_utf8(addr.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;
        let token = String::from_utf8(token.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;
        self.rpc
            .get_trc10_balance(&address, &token)
            .await
    }

    async fn trc20_token_info(
        &self,
        contract: &AddressDescriptor,
    ) -> Result<Trc20Token, ChainError> {
        let address = String::from_utf8(contract.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;

        if let Some(token) = self
            .trc20_tokens
            .lock()
            .expect("trc20 token lock")
            .get(&address)
        {
            return Ok(token.clone());
        }

        let ci = self.rpc.get_contract_info(&address).await?;
        let token = Trc20Token {
            contract: ci.contract_address,
            name: ci.name,
            symbol: ci.symbol,
            decimals: ci.decimals,
        };

        self.trc20_tokens
            .lock()
            .expect("trc20 token lock")
            .insert(address, token.clone());

        Ok(token)
    }

    async fn trc20_balance(
        &self,
        addr: &AddressDescriptor,
        contract: &AddressDescriptor,
    ) -> Result<BigInt, ChainError> {
        let address = String::from_utf8(addr.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;
        let contract = String::from_utf8(contract.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;
        self.rpc
            .get_trc20_balance(&address, &contract)
            .await
    }

    async fn get_account(&self, addr: &AddressDescriptor) -> Result<Account, ChainError> {
        let address = String::from_utf8(addr.to_vec())
            .map_err(|e| ChainError::DecodeError(e.to_string()))?;
        let (mut account, exists) = self.rpc.get_trx_account(&address).await?;
        if !exists {
            return Err(ChainError::AddressMissing);
        }
        account.address = raw::encode_address_from_hex(&account.address_hex, self.testnet)?;
        Ok(account)
    }

    async fn get_account_balance(
        &self,
        addr: &str,
        block_hash: &str,
        block_height: u64,
    ) -> Result<i64, ChainError> {
        self.rpc
            .get_account_balance(addr, block_hash, block_height)
            .await
    }
}
