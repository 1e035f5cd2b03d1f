//! Canonical block and transaction entities.
//!
//! Constructed by the node RPC adapter (network sourced) or by the parser
//! (disk sourced); value types, never mutated after construction except for
//! the late-attached [`TransactionInfo`].

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Address, ContractCallType, ContractType, Protocol, Txid};
use crate::serde_primitives::bigint_string;

/// Aggregate node health data reported by `getnodeinfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalChainInfo {
    pub active_connections: u32,
    pub total_memory: i64,
    pub free_memory: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInfo {
    pub best_block_number: u64,
    pub best_block_hash: String,
    pub version: String,
    pub protocol_version: String,
    pub additional: AdditionalChainInfo,
}

/// Chain-level summary returned by the facade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainInfo {
    pub blocks: u64,
    pub best_block_hash: String,
    pub difficulty: String,
    pub version: String,
    pub protocol_version: String,
    pub chain: String,
    pub additional: AdditionalChainInfo,
}

/// A Tron block as decoded from the node, with its transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TronBlock {
    pub hash: String,
    pub prev_hash: String,
    pub height: u64,
    pub version: u64,
    /// Unix seconds; the node reports milliseconds.
    pub time: i64,
    pub merkle_root: String,
    pub txs: Vec<TronTransaction>,
}

/// One transaction of a Tron block, stamped with its block coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TronTransaction {
    pub txid: Txid,
    pub block_hash: String,
    pub block_height: u64,
    pub block_time: i64,
    pub ret: Vec<ExecutionResult>,
    pub contract: Vec<Contract>,
    /// Attached after a follow-up RPC; the only late-bound field.
    pub info: Option<TransactionInfo>,
}

/// Per-contract execution outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ret: String,
    pub fee: i64,
    pub contract_ret: String,
}

/// One contract call inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub txid: Txid,
    pub block_hash: String,
    pub block_height: u64,
    pub block_time: i64,
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    pub contract_call_type: ContractCallType,
    pub from: Address,
    pub to: Address,
    #[serde(with = "bigint_string")]
    pub amount: BigInt,
    /// TRC20 contract address, or the ASCII TRC10 asset descriptor.
    pub contract_address: String,
    pub contract_ret: String,
    pub protocol: Protocol,
}

impl Default for Contract {
    fn default() -> Self {
        Contract {
            txid: String::new(),
            block_hash: String::new(),
            block_height: 0,
            block_time: 0,
            contract_type: ContractType::Other(String::new()),
            contract_call_type: ContractCallType::Unknown,
            from: String::new(),
            to: String::new(),
            amount: BigInt::from(0),
            contract_address: String::new(),
            contract_ret: String::new(),
            protocol: Protocol::None,
        }
    }
}

/// On-chain computed transaction data fetched via `gettransactioninfobyid`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub txid: Txid,
    #[serde(with = "bigint_string")]
    pub fee: BigInt,
    pub block_number: u64,
    pub block_timestamp: i64,
    pub contract_address: String,
    pub receipt: Receipt,
    pub log: Vec<EventLog>,
    pub internal_transactions: Vec<InternalTransaction>,
    pub asset_issue_id: String,
}

impl Default for Receipt {
    fn default() -> Self {
        Receipt {
            energy_fee: BigInt::from(0),
            origin_energy_usage: BigInt::from(0),
            energy_usage_total: BigInt::from(0),
            net_fee: BigInt::from(0),
            net_usage: BigInt::from(0),
            result: String::new(),
        }
    }
}

/// Energy and bandwidth usage of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(with = "bigint_string")]
    pub energy_fee: BigInt,
    #[serde(with = "bigint_string")]
    pub origin_energy_usage: BigInt,
    #[serde(with = "bigint_string")]
    pub energy_usage_total: BigInt,
    #[serde(with = "bigint_string")]
    pub net_fee: BigInt,
    #[serde(with = "bigint_string")]
    pub net_usage: BigInt,
    pub result: String,
}

/// Smart contract event log; addresses already in canonical form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub address: Address,
    pub topics: Vec<String>,
    pub data: String,
}

/// Contract-induced value movement reported by the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalTransaction {
    pub hash: String,
    pub caller_address: Address,
    pub transfer_to_address: Address,
    pub note: String,
    pub call_values: Vec<BigInt>,
}

/// A Tron account as returned by `getaccount`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    /// Canonical base58check form, attached by the facade.
    pub address: Address,
    pub address_hex: String,
    pub name: String,
    pub balance: i64,
    pub free_net_usage: i64,
    /// Legacy asset map, keyed by asset name.
    pub asset: HashMap<String, BigInt>,
    /// Current asset map, keyed by asset id.
    pub asset_v2: HashMap<String, BigInt>,
}

/// TRC10 asset metadata; `name` and `abbr` arrive hex encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetInfo {
    pub id: String,
    pub owner_address: Address,
    pub name: String,
    pub abbr: String,
    pub precision: u32,
}

/// Smart contract metadata assembled from `getcontract` and constant calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractInfo {
    pub contract_address: String,
    pub origin_address_hex: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub bytecode: String,
    pub abi: String,
    pub consume_user_resource_percent: u64,
}

/// Result of a `triggerconstantcontract`/`triggersmartcontract` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantCallResult {
    pub txid: String,
    pub constant_result: Vec<String>,
    pub result: CallReturn,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallReturn {
    pub result: bool,
    pub code: i64,
    /// Hex decoded to ASCII by the adapter.
    pub message: String,
}

/// Canonical block header attached by the facade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockHeader {
    pub hash: String,
    pub prev: String,
    pub height: u32,
    pub confirmations: i64,
    pub time: i64,
    pub size: u64,
}

/// Header plus txid list, for the block-info query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    pub header: BlockHeader,
    pub txids: Vec<Txid>,
    pub merkle_root: String,
    pub nonce: String,
    pub difficulty: String,
}

/// Canonical transaction: at most one pseudo-input and one pseudo-output.
///
/// Multi-contract transactions record only the first contract; the embedded
/// [`TronTransaction`] keeps the full decoded payload for the extractors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub txid: Txid,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub block_time: i64,
    pub time: i64,
    pub confirmations: u32,
    pub tron: TronTransaction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub n: u32,
    #[serde(with = "bigint_string")]
    pub value_sat: BigInt,
    pub addresses: Vec<Address>,
}

impl Default for TxOutput {
    fn default() -> Self {
        TxOutput { n: 0, value_sat: BigInt::from(0), addresses: Vec::new() }
    }
}

/// Canonical block: header plus converted transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Tx>,
}
