//! Low level Tron node client.
//!
//! Every call is a POST of a JSON body against one of two base URLs: the
//! full node (unconfirmed tip access) or the solidity node (confirmed data,
//! asset queries). The client does not retry; the facade owns retry policy.

use num_bigint::BigInt;
use regex::Regex;
use serde_json::{json, Value};
use std::{collections::HashMap, time::Duration};
use tracing::debug;

use chainbook_core::{
    models::blockchain::{
        Account, AssetInfo, ConstantCallResult, ContractInfo, NodeInfo, TransactionInfo, TronBlock,
        TronTransaction,
    },
    traits::ChainError,
};

use super::raw;

const SOLIDITY_TYPE_ADDRESS: &str = "address";
const SOLIDITY_TYPE_UINT256: &str = "uint256";
const TRC20_BALANCE_OF_METHOD: &str = "balanceOf(address)";

/// A typed parameter of a constant contract call.
pub enum SolidityParam {
    Address(String),
    Uint256(BigInt),
}

impl SolidityParam {
    fn type_name(&self) -> &'static str {
        match self {
            SolidityParam::Address(_) => SOLIDITY_TYPE_ADDRESS,
            SolidityParam::Uint256(_) => SOLIDITY_TYPE_UINT256,
        }
    }
}

/// Encode call parameters into the node's hex calldata format: addresses as
/// 42 hex chars behind 22 zero characters, integers as full 32 byte words.
pub fn make_transaction_parameter(
    method_id: &str,
    params: &[SolidityParam],
) -> Result<String, ChainError> {
    let mut data = method_id.to_string();
    for param in params {
        match param {
            SolidityParam::Address(addr) => {
                let addr = addr
                    .to_lowercase()
                    .trim_start_matches("0x")
                    .to_string();
                if addr.len() != 42 {
                    return Err(ChainError::InvalidResponse(format!(
                        "length of {} parameter error",
                        param.type_name()
                    )));
                }
                data.push_str(&"0".repeat(22));
                data.push_str(&addr);
            }
            SolidityParam::Uint256(value) => {
                let word = format!("{:x}", value);
                if word.len() > 64 {
                    return Err(ChainError::InvalidResponse("integer overflow".to_string()));
                }
                data.push_str(&"0".repeat(64 - word.len()));
                data.push_str(&word);
            }
        }
    }
    Ok(data)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tron_node_rpc: String,
    pub solidity_node_rpc: String,
    pub testnet: bool,
    pub timeout: Duration,
}

/// Tron RPC client speaking JSON over HTTP against the two node URLs.
pub struct TronRpcClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl TronRpcClient {
    pub fn new(config: ClientConfig) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::Http(e.to_string()))?;
        Ok(TronRpcClient { config, client })
    }

    pub fn is_testnet(&self) -> bool {
        self.config.testnet
    }

    async fn call(&self, url: &str, param: &Value) -> Result<Value, ChainError> {
        debug!(%url, "node call");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(param)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            return Err(ChainError::Status { status: status.to_string(), body });
        }

        serde_json::from_str(&body).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    async fn checked_call(&self, url: &str, param: &Value) -> Result<Value, ChainError> {
        let res = self.call(url, param).await?;

        if let Some(err) = res.get("Error").and_then(Value::as_str) {
            if !err.is_empty() {
                return Err(ChainError::InvalidResponse(err.to_string()));
            }
        }

        if res.as_object().is_some_and(|o| o.is_empty()) {
            return Err(ChainError::EmptyResponse);
        }

        Ok(res)
    }

    /// POST against the full node.
    pub async fn tron_call(&self, path: &str, param: Value) -> Result<Value, ChainError> {
        let url = format!("{}{}", self.config.tron_node_rpc, path);
        self.checked_call(&url, &param).await
    }

    /// POST against the solidity (confirmed only) node.
    pub async fn solidity_call(&self, path: &str, param: Value) -> Result<Value, ChainError> {
        let url = format!("{}{}", self.config.solidity_node_rpc, path);
        self.checked_call(&url, &param).await
    }

    pub async fn get_node_info(&self) -> Result<NodeInfo, ChainError> {
        let res = self
            .tron_call("/wallet/getnodeinfo", json!({}))
            .await?;
        parse_node_info(&res)
    }

    pub async fn get_now_block(&self) -> Result<TronBlock, ChainError> {
        let res = self
            .tron_call("/wallet/getnowblock", json!({}))
            .await?;
        let block = raw::parse_block(&res, self.config.testnet)?;
        if block.hash.is_empty() {
            return Err(ChainError::BlockNotFound);
        }
        Ok(block)
    }

    pub async fn get_block_by_num(&self, num: u32) -> Result<TronBlock, ChainError> {
        let res = self
            .tron_call("/wallet/getblockbynum", json!({ "num": num }))
            .await?;
        let block = raw::parse_block(&res, self.config.testnet)?;
        if block.hash.is_empty() {
            return Err(ChainError::BlockNotFound);
        }
        Ok(block)
    }

    pub async fn get_block_by_id(&self, block_id: &str) -> Result<TronBlock, ChainError> {
        let res = self
            .tron_call("/wallet/getblockbyid", json!({ "value": block_id }))
            .await?;
        let block = raw::parse_block(&res, self.config.testnet)?;
        if block.hash.is_empty() {
            return Err(ChainError::BlockNotFound);
        }
        Ok(block)
    }

    /// Fetches the transaction, its on-chain info and the enclosing block so
    /// the block coordinates can be stamped on the result.
    pub async fn get_transaction_by_id(&self, txid: &str) -> Result<TronTransaction, ChainError> {
        let res = self
            .tron_call("/wallet/gettransactionbyid", json!({ "value": txid }))
            .await?;

        let info = self.get_transaction_info_by_id(txid).await?;
        let block = self
            .get_block_by_num(info.block_number as u32)
            .await?;

        let mut tx = raw::parse_transaction(
            &res,
            &block.hash,
            block.height,
            block.time,
            self.config.testnet,
        )?;
        tx.info = Some(info);
        Ok(tx)
    }

    pub async fn get_transaction_info_by_id(
        &self,
        txid: &str,
    ) -> Result<TransactionInfo, ChainError> {
        let res = self
            .tron_call("/wallet/gettransactioninfobyid", json!({ "value": txid }))
            .await?;
        raw::parse_transaction_info(&res, self.config.testnet)
    }

    /// Batch fetch of transaction infos for a whole block, keyed by txid.
    pub async fn get_transaction_info_by_block_num(
        &self,
        num: u64,
    ) -> Result<HashMap<String, TransactionInfo>, ChainError> {
        let res = self
            .tron_call("/wallet/gettransactioninfobyblocknum", json!({ "num": num }))
            .await?;

        let mut infos = HashMap::new();
        if let Some(items) = res.as_array() {
            for item in items {
                let txid = raw::json_str(item, "id");
                let info = raw::parse_transaction_info(item, self.config.testnet)?;
                infos.insert(txid, info);
            }
        }
        Ok(infos)
    }

    pub async fn get_account_balance(
        &self,
        address: &str,
        block_hash: &str,
        block_height: u64,
    ) -> Result<i64, ChainError> {
        let params = json!({
            "account_identifier": { "address": address },
            "block_identifier": { "hash": block_hash, "number": block_height },
            "visible": false,
        });
        let res = self
            .tron_call("/wallet/getaccountbalance", params)
            .await?;
        Ok(raw::json_i64(&res, "balance"))
    }

    async fn trigger_constant_contract(
        &self,
        contract_address_hex: &str,
        function_selector: &str,
        owner_address_hex: &str,
    ) -> Result<ConstantCallResult, ChainError> {
        let res = self
            .tron_call(
                "/wallet/triggerconstantcontract",
                json!({
                    "contract_address": contract_address_hex,
                    "function_selector": function_selector,
                    "owner_address": owner_address_hex,
                }),
            )
            .await?;
        Ok(raw::parse_constant_call_result(&res))
    }

    /// Invoke a (constant) smart contract method with explicit calldata.
    pub async fn trigger_smart_contract(
        &self,
        contract_address_hex: &str,
        function_selector: &str,
        parameter: &str,
        fee_limit: u64,
        call_value: u64,
        owner_address_hex: &str,
    ) -> Result<ConstantCallResult, ChainError> {
        let res = self
            .tron_call(
                "/wallet/triggersmartcontract",
                json!({
                    "contract_address": contract_address_hex,
                    "function_selector": function_selector,
                    "parameter": parameter,
                    "fee_limit": fee_limit,
                    "call_value": call_value,
                    "owner_address": owner_address_hex,
                }),
            )
            .await?;
        Ok(raw::parse_constant_call_result(&res))
    }

    /// Contract metadata: the on-chain record supplemented by `decimals()`,
    /// `symbol()` and, when the record carries no name, `name()` calls.
    pub async fn get_contract_info(&self, contract_address: &str) -> Result<ContractInfo, ChainError> {
        let (value, _) = raw::decode_address_to_hex(contract_address, self.config.testnet)?;
        debug!(contract = contract_address, hex = %value, "contract info lookup");

        let res = match self
            .tron_call("/wallet/getcontract", json!({ "value": value }))
            .await
        {
            Err(ChainError::EmptyResponse) => return Err(ChainError::ContractNotFound),
            other => other?,
        };

        let mut ci = raw::parse_contract_info(&res, self.config.testnet)?;

        let decimals = self
            .trigger_constant_contract(&value, "decimals()", &ci.origin_address_hex)
            .await?;
        if let Some(word) = decimals.constant_result.first() {
            ci.decimals = raw::parse_abi_uint(word) as u32;
        }

        let symbol = self
            .trigger_constant_contract(&value, "symbol()", &ci.origin_address_hex)
            .await?;
        if let Some(word) = symbol.constant_result.first() {
            if !word.is_empty() {
                ci.symbol = raw::parse_abi_string(word)?;
            }
        }

        if ci.name.is_empty() {
            let name = self
                .trigger_constant_contract(&value, "name()", &ci.origin_address_hex)
                .await?;
            if let Some(word) = name.constant_result.first() {
                if !word.is_empty() {
                    ci.name = raw::parse_abi_string(word)?;
                }
            }
        }

        Ok(ci)
    }

    /// TRC20 balance of `address` via a constant `balanceOf(address)` call.
    pub async fn get_trc20_balance(
        &self,
        address: &str,
        contract_address: &str,
    ) -> Result<BigInt, ChainError> {
        let (from, _) = raw::decode_address_to_hex(address, self.config.testnet)?;
        let (caddr, _) = raw::decode_address_to_hex(contract_address, self.config.testnet)?;

        let param =
            make_transaction_parameter("", &[SolidityParam::Address(from.clone())])?;

        let call = self
            .trigger_smart_contract(&caddr, TRC20_BALANCE_OF_METHOD, &param, 0, 0, &from)
            .await?;

        match call.constant_result.first() {
            Some(word) => raw::hex_to_bigint(word),
            None => Err(ChainError::InvalidResponse(call.result.message)),
        }
    }

    /// TRC10 balance read from the account's asset maps, `assetV2` preferred.
    pub async fn get_trc10_balance(
        &self,
        address: &str,
        token_id: &str,
    ) -> Result<BigInt, ChainError> {
        let (account, _) = self.get_trx_account(address).await?;

        if let Some(balance) = account.asset_v2.get(token_id) {
            return Ok(balance.clone());
        }
        if let Some(balance) = account.asset.get(token_id) {
            return Ok(balance.clone());
        }
        Ok(BigInt::from(0))
    }

    /// Account lookup; an empty address in the response means "not found",
    /// which is not an error.
    pub async fn get_trx_account(&self, address: &str) -> Result<(Account, bool), ChainError> {
        let hex_address = raw::convert_addr_to_hex(address)?;
        let res = self
            .tron_call("/wallet/getaccount", json!({ "address": hex_address }))
            .await?;
        let account = raw::parse_account(&res);
        let exists = !account.address_hex.is_empty();
        Ok((account, exists))
    }

    pub async fn get_asset_info_by_id(&self, id: &str) -> Result<AssetInfo, ChainError> {
        let res = self
            .solidity_call("/walletsolidity/getassetissuebyid", json!({ "value": id }))
            .await?;
        Ok(raw::parse_asset_info(&res, self.config.testnet))
    }

    pub async fn get_asset_info_by_name(&self, name: &str) -> Result<AssetInfo, ChainError> {
        let res = self
            .solidity_call(
                "/walletsolidity/getassetissuebyname",
                json!({ "value": hex::encode(name.as_bytes()) }),
            )
            .await?;
        Ok(raw::parse_asset_info(&res, self.config.testnet))
    }
}

/// Extract the best block from `getnodeinfo`. The `Num:…,ID:…` shape of the
/// `block` field is the node's accepted contract, brittle as it is.
pub fn parse_node_info(res: &Value) -> Result<NodeInfo, ChainError> {
    let re = Regex::new(r"Num:(\d+),ID:(.*)").expect("static regex");
    let block_field = raw::json_str(res, "block");
    let captures = re
        .captures(&block_field)
        .ok_or_else(|| ChainError::InvalidResponse(format!("unexpected block field {block_field:?}")))?;

    let best_block_number = captures[1]
        .parse::<u64>()
        .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

    let config_node = &res["configNodeInfo"];
    let machine = &res["machineInfo"];

    Ok(NodeInfo {
        best_block_number,
        best_block_hash: captures[2].to_string(),
        version: raw::json_str(config_node, "codeVersion"),
        protocol_version: raw::json_str(config_node, "p2pVersion"),
        additional: chainbook_core::models::blockchain::AdditionalChainInfo {
            active_connections: raw::json_u64(res, "activeConnectCount") as u32,
            total_memory: raw::json_i64(machine, "jvmTotalMemory"),
            free_memory: raw::json_i64(machine, "jvmFreeMemory"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_node_info() {
        let res = json!({
            "block": "Num:58382435,ID:00000000037af0e3deadbeef",
            "configNodeInfo": { "codeVersion": "4.7.1", "p2pVersion": "11111" },
            "machineInfo": { "jvmTotalMemory": 123456, "jvmFreeMemory": 654 },
            "activeConnectCount": 17,
        });
        let ni = parse_node_info(&res).unwrap();
        assert_eq!(ni.best_block_number, 58382435);
        assert_eq!(ni.best_block_hash, "00000000037af0e3deadbeef");
        assert_eq!(ni.version, "4.7.1");
        assert_eq!(ni.protocol_version, "11111");
        assert_eq!(ni.additional.active_connections, 17);
        assert_eq!(ni.additional.total_memory, 123456);
        assert_eq!(ni.additional.free_memory, 654);
    }

    #[test]
    fn test_parse_node_info_rejects_unexpected_block_field() {
        let res = json!({ "block": "height 17" });
        assert!(matches!(parse_node_info(&res), Err(ChainError::InvalidResponse(_))));
    }

    #[test]
    fn test_make_transaction_parameter_address() {
        let param = make_transaction_parameter(
            "",
            &[SolidityParam::Address(
                "41a614f803b6fd780986a42c78ec9c7f77e6ded13c".to_string(),
            )],
        )
        .unwrap();
        assert_eq!(param.len(), 64);
        assert_eq!(&param[..22], "0".repeat(22));
        assert!(param.ends_with("a614f803b6fd780986a42c78ec9c7f77e6ded13c"));
    }

    #[test]
    fn test_make_transaction_parameter_uint() {
        let param =
            make_transaction_parameter("a9059cbb", &[SolidityParam::Uint256(BigInt::from(100))])
                .unwrap();
        assert_eq!(param.len(), 8 + 64);
        assert!(param.starts_with("a9059cbb"));
        assert!(param.ends_with("64"));
    }

    #[test]
    fn test_make_transaction_parameter_rejects_short_address() {
        let res =
            make_transaction_parameter("", &[SolidityParam::Address("41a614".to_string())]);
        assert!(res.is_err());
    }
}
