//! Decoding of raw node JSON into the canonical model.
//!
//! All hex-form addresses are re-encoded to base58check here, so entities
//! leave this module in canonical form only.

use num_bigint::BigInt;
use serde_json::Value;
use std::str::FromStr;

use chainbook_core::{
    address::{decode_address, encode_address, TRON_MAINNET, TRON_TESTNET},
    models::{
        blockchain::{
            Account, AssetInfo, CallReturn, ConstantCallResult, Contract, ContractInfo, EventLog,
            ExecutionResult, InternalTransaction, Receipt, TransactionInfo, TronBlock,
            TronTransaction,
        },
        ContractCallType, ContractType, Protocol,
    },
    traits::ChainError,
};

use super::parser::parse_transfer_call;

pub(crate) fn json_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn json_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_default()
}

pub(crate) fn json_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_default()
}

/// Amounts arrive as JSON numbers or decimal strings.
pub(crate) fn json_bigint(value: &Value, key: &str) -> BigInt {
    match value.get(key) {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                BigInt::from(i)
            } else if let Some(u) = n.as_u64() {
                BigInt::from(u)
            } else {
                BigInt::from(0)
            }
        }
        Some(Value::String(s)) => BigInt::from_str(s).unwrap_or_else(|_| BigInt::from(0)),
        _ => BigInt::from(0),
    }
}

/// Parse a hex string (optionally `0x` prefixed, empty means zero) into a
/// big integer.
pub fn hex_to_bigint(value: &str) -> Result<BigInt, ChainError> {
    let value = value.trim_start_matches("0x");
    if value.is_empty() {
        return Ok(BigInt::from(0));
    }
    BigInt::parse_bytes(value.as_bytes(), 16)
        .ok_or_else(|| ChainError::DecodeError(format!("not a hex integer: {value:?}")))
}

/// Decode a 32 byte right-aligned ABI word as an unsigned integer.
pub fn parse_abi_uint(word: &str) -> u64 {
    u64::from_str_radix(word.trim_start_matches("0x"), 16).unwrap_or_default()
}

/// Decode a string returned in the last 32 byte word of a constant call,
/// trimming the NUL padding.
pub fn parse_abi_string(result: &str) -> Result<String, ChainError> {
    let word = if result.len() > 64 { &result[result.len() - 64..] } else { result };
    let bytes = hex::decode(word).map_err(|e| ChainError::DecodeError(e.to_string()))?;
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(start, |p| p + 1);
    String::from_utf8(bytes[start..end].to_vec())
        .map_err(|e| ChainError::DecodeError(e.to_string()))
}

/// Re-encode a `41`-prefixed (or raw 20 byte) hex address to base58check.
/// Empty input stays empty; it is the "no address" sentinel.
pub fn encode_address_from_hex(hex_str: &str, testnet: bool) -> Result<String, ChainError> {
    if hex_str.is_empty() {
        return Ok(String::new());
    }
    let mut bytes = hex::decode(hex_str).map_err(|e| ChainError::DecodeError(e.to_string()))?;
    if bytes.len() > 20 {
        bytes.remove(0);
    }
    let profile = if testnet { &TRON_TESTNET } else { &TRON_MAINNET };
    Ok(encode_address(&bytes, profile))
}

/// Canonical address to its `41`-prefixed hex form used by account queries.
pub fn convert_addr_to_hex(address: &str) -> Result<String, ChainError> {
    let hash = decode_address(address, &TRON_MAINNET)?;
    let mut bytes = vec![0x41];
    bytes.extend_from_slice(&hash);
    Ok(hex::encode(bytes))
}

/// Canonical address to prefixed hex plus raw prefixed bytes, honoring the
/// network profile.
pub fn decode_address_to_hex(
    address: &str,
    testnet: bool,
) -> Result<(String, Vec<u8>), ChainError> {
    let profile = if testnet { &TRON_TESTNET } else { &TRON_MAINNET };
    let hash = decode_address(address, profile)?;
    let mut bytes = profile.prefix.to_vec();
    bytes.extend_from_slice(&hash);
    Ok((hex::encode(&bytes), bytes))
}

pub fn parse_block(res: &Value, testnet: bool) -> Result<TronBlock, ChainError> {
    let header = &res["block_header"]["raw_data"];

    let hash = json_str(res, "blockID");
    let height = json_u64(header, "number");
    let time = json_i64(header, "timestamp") / 1000;

    let mut txs = Vec::new();
    if let Some(items) = res.get("transactions").and_then(Value::as_array) {
        for item in items {
            txs.push(parse_transaction(item, &hash, height, time, testnet)?);
        }
    }

    Ok(TronBlock {
        hash,
        prev_hash: json_str(header, "parentHash"),
        height,
        version: json_u64(header, "version"),
        time,
        merkle_root: json_str(header, "txTrieRoot"),
        txs,
    })
}

pub fn parse_transaction(
    res: &Value,
    block_hash: &str,
    block_height: u64,
    block_time: i64,
    testnet: bool,
) -> Result<TronTransaction, ChainError> {
    let txid = json_str(res, "txID");

    let mut ret = Vec::new();
    if let Some(items) = res.get("ret").and_then(Value::as_array) {
        for item in items {
            ret.push(ExecutionResult {
                ret: json_str(item, "ret"),
                fee: json_i64(item, "fee"),
                contract_ret: json_str(item, "contractRet"),
            });
        }
    }

    let mut contract = Vec::new();
    if let Some(items) = res["raw_data"]
        .get("contract")
        .and_then(Value::as_array)
    {
        for (i, item) in items.iter().enumerate() {
            let mut c = parse_contract(item, testnet)?;
            c.txid = txid.clone();
            c.block_hash = block_hash.to_string();
            c.block_height = block_height;
            c.block_time = block_time;
            if let Some(r) = ret.get(i) {
                c.contract_ret = r.contract_ret.clone();
            }
            contract.push(c);
        }
    }

    Ok(TronTransaction {
        txid,
        block_hash: block_hash.to_string(),
        block_height,
        block_time,
        ret,
        contract,
        info: None,
    })
}

/// Decode one contract call. The per-type switch mirrors the node semantics:
/// freezes move value to self, TRC10 carries the asset descriptor, TRC20
/// trigger calls are classified by their call data.
pub fn parse_contract(res: &Value, testnet: bool) -> Result<Contract, ChainError> {
    let parameter = &res["parameter"]["value"];

    let mut c = Contract {
        contract_type: ContractType::from_str(&json_str(res, "type"))
            .unwrap_or(ContractType::Other(String::new())),
        from: encode_address_from_hex(&json_str(parameter, "owner_address"), testnet)?,
        ..Contract::default()
    };

    match c.contract_type {
        ContractType::WitnessCreateContract => {
            // SR creation burns the fixed witness fee
            c.amount = BigInt::from(9_999_000_000i64);
        }
        ContractType::FreezeBalanceContract => {
            c.to = c.from.clone();
            c.amount = json_bigint(parameter, "frozen_balance");
        }
        ContractType::TransferContract => {
            c.to = encode_address_from_hex(&json_str(parameter, "to_address"), testnet)?;
            c.amount = json_bigint(parameter, "amount");
        }
        ContractType::TransferAssetContract => {
            c.to = encode_address_from_hex(&json_str(parameter, "to_address"), testnet)?;
            c.amount = json_bigint(parameter, "amount");
            let asset = hex::decode(json_str(parameter, "asset_name"))
                .map_err(|e| ChainError::DecodeError(e.to_string()))?;
            c.contract_address = String::from_utf8_lossy(&asset).to_string();
            c.protocol = Protocol::Trc10;
        }
        ContractType::TriggerSmartContract => {
            c.contract_address =
                encode_address_from_hex(&json_str(parameter, "contract_address"), testnet)?;
            c.to = c.contract_address.clone();

            let data = json_str(parameter, "data");
            match parse_transfer_call(&data) {
                Ok((recipient_hex, amount)) => {
                    c.contract_call_type = ContractCallType::Trc20Transfer;
                    c.to = encode_address_from_hex(&recipient_hex, testnet)?;
                    c.amount = amount;
                }
                Err(_) => {
                    c.amount = json_bigint(parameter, "call_value");
                }
            }
            c.protocol = Protocol::Trc20;
        }
        _ => {}
    }

    Ok(c)
}

pub fn parse_transaction_info(res: &Value, testnet: bool) -> Result<TransactionInfo, ChainError> {
    let mut log = Vec::new();
    if let Some(items) = res.get("log").and_then(Value::as_array) {
        for item in items {
            log.push(EventLog {
                address: encode_address_from_hex(&json_str(item, "address"), testnet)?,
                topics: item
                    .get("topics")
                    .and_then(Value::as_array)
                    .map(|t| {
                        t.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                data: json_str(item, "data"),
            });
        }
    }

    let mut internal_transactions = Vec::new();
    if let Some(items) = res
        .get("internal_transactions")
        .and_then(Value::as_array)
    {
        for item in items {
            internal_transactions.push(parse_internal_transaction(item, testnet)?);
        }
    }

    let receipt = &res["receipt"];

    Ok(TransactionInfo {
        txid: json_str(res, "id"),
        fee: json_bigint(res, "fee"),
        block_number: json_u64(res, "blockNumber"),
        block_timestamp: json_i64(res, "blockTimeStamp") / 1000,
        contract_address: json_str(res, "contract_address"),
        receipt: Receipt {
            energy_fee: json_bigint(receipt, "energy_fee"),
            origin_energy_usage: json_bigint(receipt, "energy_usage"),
            energy_usage_total: json_bigint(receipt, "energy_usage_total"),
            net_fee: json_bigint(receipt, "net_fee"),
            net_usage: json_bigint(receipt, "net_usage"),
            result: json_str(receipt, "result"),
        },
        log,
        internal_transactions,
        asset_issue_id: json_str(res, "assetIssueID"),
    })
}

fn parse_internal_transaction(
    res: &Value,
    testnet: bool,
) -> Result<InternalTransaction, ChainError> {
    let mut call_values = Vec::new();
    if let Some(items) = res.get("callValueInfo").and_then(Value::as_array) {
        for item in items {
            call_values.push(json_bigint(item, "callValue"));
        }
    }

    Ok(InternalTransaction {
        hash: json_str(res, "hash"),
        caller_address: encode_address_from_hex(&json_str(res, "caller_address"), testnet)?,
        transfer_to_address: encode_address_from_hex(
            &json_str(res, "transferTo_address"),
            testnet,
        )?,
        note: json_str(res, "note"),
        call_values,
    })
}

pub fn parse_account(res: &Value) -> Account {
    let mut account = Account {
        address_hex: json_str(res, "address"),
        name: json_str(res, "account_name"),
        balance: json_i64(res, "balance"),
        free_net_usage: json_i64(res, "free_net_usage"),
        ..Account::default()
    };

    if let Some(items) = res.get("assetV2").and_then(Value::as_array) {
        for item in items {
            account
                .asset_v2
                .insert(json_str(item, "key"), json_bigint(item, "value"));
        }
    }
    if let Some(items) = res.get("asset").and_then(Value::as_array) {
        for item in items {
            account
                .asset
                .insert(json_str(item, "key"), json_bigint(item, "value"));
        }
    }

    account
}

pub fn parse_asset_info(res: &Value, testnet: bool) -> AssetInfo {
    let name = hex::decode(json_str(res, "name")).unwrap_or_default();
    let abbr = hex::decode(json_str(res, "abbr")).unwrap_or_default();

    AssetInfo {
        id: json_str(res, "id"),
        owner_address: encode_address_from_hex(&json_str(res, "owner_address"), testnet)
            .unwrap_or_default(),
        name: String::from_utf8_lossy(&name).to_string(),
        abbr: String::from_utf8_lossy(&abbr).to_string(),
        precision: json_u64(res, "precision") as u32,
    }
}

pub fn parse_contract_info(res: &Value, testnet: bool) -> Result<ContractInfo, ChainError> {
    Ok(ContractInfo {
        contract_address: encode_address_from_hex(&json_str(res, "contract_address"), testnet)?,
        origin_address_hex: json_str(res, "origin_address"),
        name: json_str(res, "name"),
        symbol: String::new(),
        decimals: 0,
        bytecode: json_str(res, "bytecode"),
        abi: res["abi"]
            .get("entrys")
            .map(|e| e.to_string())
            .unwrap_or_default(),
        consume_user_resource_percent: json_u64(res, "consume_user_resource_percent"),
    })
}

pub fn parse_constant_call_result(res: &Value) -> ConstantCallResult {
    let result = &res["result"];
    let message = hex::decode(json_str(result, "message")).unwrap_or_default();

    ConstantCallResult {
        txid: json_str(res, "txid"),
        constant_result: res
            .get("constant_result")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        result: CallReturn {
            result: result
                .get("result")
                .and_then(Value::as_bool)
                .unwrap_or_default(),
            code: json_i64(result, "code"),
            message: String::from_utf8_lossy(&message).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 41a614f803b6fd780986a42c78ec9c7f77e6ded13c == TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t (USDT)
    const USDT_HEX: &str = "41a614f803b6fd780986a42c78ec9c7f77e6ded13c";
    const USDT_B58: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    #[test]
    fn test_encode_address_from_hex() {
        assert_eq!(encode_address_from_hex(USDT_HEX, false).unwrap(), USDT_B58);
        // raw 20 byte form encodes identically
        assert_eq!(encode_address_from_hex(&USDT_HEX[2..], false).unwrap(), USDT_B58);
        // empty input is the sentinel, not an error
        assert_eq!(encode_address_from_hex("", false).unwrap(), "");
    }

    #[test]
    fn test_convert_addr_to_hex_round_trip() {
        assert_eq!(convert_addr_to_hex(USDT_B58).unwrap(), USDT_HEX);
    }

    #[test]
    fn test_decode_address_to_hex() {
        let (hex_form, bytes) = decode_address_to_hex(USDT_B58, false).unwrap();
        assert_eq!(hex_form, USDT_HEX);
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], 0x41);
    }

    #[test]
    fn test_parse_abi_string() {
        let word = format!("{}{}", hex::encode("Tether USD"), "00".repeat(22));
        assert_eq!(parse_abi_string(&word).unwrap(), "Tether USD");
    }

    #[test]
    fn test_parse_abi_uint() {
        assert_eq!(parse_abi_uint("0000000000000000000000000000000000000000000000000000000000000006"), 6);
        assert_eq!(parse_abi_uint("12"), 18);
    }

    #[test]
    fn test_hex_to_bigint() {
        assert_eq!(hex_to_bigint("64").unwrap(), BigInt::from(100));
        assert_eq!(hex_to_bigint("").unwrap(), BigInt::from(0));
        assert!(hex_to_bigint("zz").is_err());
    }

    #[test]
    fn test_parse_block_with_native_transfer() {
        let res = json!({
            "blockID": "0000000002e66fa9aabbcc",
            "block_header": { "raw_data": {
                "number": 48656297,
                "timestamp": 1661090460000i64,
                "parentHash": "0000000002e66fa8",
                "txTrieRoot": "deadbeef",
                "version": 24,
            }},
            "transactions": [{
                "txID": "1111",
                "ret": [{ "contractRet": "SUCCESS", "fee": 0 }],
                "raw_data": { "contract": [{
                    "type": "TransferContract",
                    "parameter": { "value": {
                        "owner_address": USDT_HEX,
                        "to_address": USDT_HEX,
                        "amount": 1000000,
                    }},
                }]},
            }],
        });
        let block = parse_block(&res, false).unwrap();
        assert_eq!(block.height, 48656297);
        assert_eq!(block.time, 1661090460);
        assert_eq!(block.version, 24);
        assert_eq!(block.txs.len(), 1);
        let tx = &block.txs[0];
        assert_eq!(tx.block_hash, block.hash);
        assert_eq!(tx.contract[0].from, USDT_B58);
        assert_eq!(tx.contract[0].amount, BigInt::from(1000000));
        assert_eq!(tx.contract[0].contract_ret, "SUCCESS");
    }

    #[test]
    fn test_parse_contract_trc10() {
        let res = json!({
            "type": "TransferAssetContract",
            "parameter": { "value": {
                "owner_address": USDT_HEX,
                "to_address": USDT_HEX,
                "amount": 5,
                "asset_name": hex::encode("1000001"),
            }},
        });
        let c = parse_contract(&res, false).unwrap();
        assert_eq!(c.protocol, Protocol::Trc10);
        assert_eq!(c.contract_address, "1000001");
        assert_eq!(c.amount, BigInt::from(5));
    }

    #[test]
    fn test_parse_contract_trc20_transfer() {
        let recipient = &USDT_HEX[2..];
        let data = format!("a9059cbb{}{}{:064x}", "0".repeat(24), recipient, 100);
        let res = json!({
            "type": "TriggerSmartContract",
            "parameter": { "value": {
                "owner_address": USDT_HEX,
                "contract_address": USDT_HEX,
                "data": data,
            }},
        });
        let c = parse_contract(&res, false).unwrap();
        assert_eq!(c.protocol, Protocol::Trc20);
        assert_eq!(c.contract_call_type, ContractCallType::Trc20Transfer);
        assert_eq!(c.to, USDT_B58);
        assert_eq!(c.amount, BigInt::from(100));
    }

    #[test]
    fn test_parse_contract_trigger_without_transfer() {
        let res = json!({
            "type": "TriggerSmartContract",
            "parameter": { "value": {
                "owner_address": USDT_HEX,
                "contract_address": USDT_HEX,
                "data": "12345678",
                "call_value": 7,
            }},
        });
        let c = parse_contract(&res, false).unwrap();
        assert_eq!(c.contract_call_type, ContractCallType::Unknown);
        // unparsed call keeps the contract as destination
        assert_eq!(c.to, USDT_B58);
        assert_eq!(c.amount, BigInt::from(7));
    }

    #[test]
    fn test_parse_account_assets() {
        let res = json!({
            "address": USDT_HEX,
            "balance": 123,
            "assetV2": [ { "key": "1000001", "value": 42 } ],
            "asset": [ { "key": "OldToken", "value": 7 } ],
        });
        let account = parse_account(&res);
        assert_eq!(account.balance, 123);
        assert_eq!(account.asset_v2["1000001"], BigInt::from(42));
        assert_eq!(account.asset["OldToken"], BigInt::from(7));
    }

    #[test]
    fn test_parse_asset_info_decodes_hex_names() {
        let res = json!({
            "id": "1000001",
            "owner_address": USDT_HEX,
            "name": hex::encode("TestToken"),
            "abbr": hex::encode("TT"),
            "precision": 6,
        });
        let ai = parse_asset_info(&res, false);
        assert_eq!(ai.name, "TestToken");
        assert_eq!(ai.abbr, "TT");
        assert_eq!(ai.precision, 6);
    }

    #[test]
    fn test_parse_constant_call_result() {
        let res = json!({
            "txid": "aa",
            "constant_result": ["0006"],
            "result": { "result": true, "message": hex::encode("ok") },
        });
        let r = parse_constant_call_result(&res);
        assert_eq!(r.constant_result, vec!["0006".to_string()]);
        assert!(r.result.result);
        assert_eq!(r.result.message, "ok");
    }
}
