//! Generic EVM JSON-RPC adapter and its chain-specific passthroughs.
//!
//! The Fantom and Gnosis clients are thin wrappers: they resolve the network
//! from `net_version` and delegate block access to this adapter.

pub mod fantom;
pub mod gnosis;

use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::Mutex,
    time::Duration,
};
use tracing::debug;

use chainbook_core::traits::ChainError;

/// JSON-RPC 2.0 client over HTTP.
pub struct EvmRpcClient {
    url: String,
    client: reqwest::Client,
    request_id: AtomicU64,
}

impl EvmRpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Http(e.to_string()))?;
        Ok(EvmRpcClient { url: url.to_string(), client, request_id: AtomicU64::new(0) })
    }

    /// Issue one JSON-RPC call and return the raw `result` value.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        debug!(%method, id, "json-rpc call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;
        if status != reqwest::StatusCode::OK {
            return Err(ChainError::Status { status: status.to_string(), body: text });
        }

        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        if let Some(err) = parsed.get("error") {
            if !err.is_null() {
                return Err(ChainError::InvalidResponse(err.to_string()));
            }
        }
        Ok(parsed
            .get("result")
            .cloned()
            .unwrap_or(Value::Null))
    }

    pub async fn network_id(&self) -> Result<u64, ChainError> {
        let result = self.call("net_version", json!([])).await?;
        let id = result
            .as_str()
            .map(str::to_string)
            .or_else(|| result.as_u64().map(|v| v.to_string()))
            .ok_or_else(|| ChainError::InvalidResponse(format!("net_version: {result}")))?;
        id.parse()
            .map_err(|_| ChainError::InvalidResponse(format!("net_version: {id}")))
    }

    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, ChainError> {
        let result = self
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        Ok(result
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

/// Generic EVM chain adapter holding the resolved network parameters.
pub struct EvmClient {
    pub(crate) rpc: EvmRpcClient,
    pub(crate) network: Mutex<String>,
    pub(crate) testnet: Mutex<bool>,
}

impl EvmClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        Ok(EvmClient {
            rpc: EvmRpcClient::new(url, timeout)?,
            network: Mutex::new(String::new()),
            testnet: Mutex::new(false),
        })
    }

    pub fn network(&self) -> String {
        self.network
            .lock()
            .expect("network lock")
            .clone()
    }

    pub fn is_testnet(&self) -> bool {
        *self.testnet.lock().expect("testnet lock")
    }

    pub(crate) fn set_network(&self, network: &str, testnet: bool) {
        *self.network.lock().expect("network lock") = network.to_string();
        *self.testnet.lock().expect("testnet lock") = testnet;
    }

    /// Fetch a block as raw JSON. `pending` is a permitted literal hash that
    /// selects the pending block; an empty response means block not found.
    pub async fn get_block_raw(
        &self,
        hash: &str,
        height: u32,
        full_txs: bool,
    ) -> Result<Value, ChainError> {
        let raw = if !hash.is_empty() {
            if hash == "pending" {
                self.rpc
                    .call("eth_getBlockByNumber", json!([hash, full_txs]))
                    .await?
            } else {
                self.rpc
                    .call("eth_getBlockByHash", json!([normalize_hash(hash), full_txs]))
                    .await?
            }
        } else {
            self.rpc
                .call("eth_getBlockByNumber", json!([format!("{height:#x}"), full_txs]))
                .await?
        };

        if raw.is_null() {
            return Err(ChainError::BlockNotFound);
        }
        Ok(raw)
    }

    /// Hash of the block at `height` on the best chain.
    pub async fn get_block_hash(&self, height: u32) -> Result<String, ChainError> {
        let raw = self.get_block_raw("", height, true).await?;
        Ok(raw
            .get("hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

fn normalize_hash(hash: &str) -> String {
    if hash.starts_with("0x") {
        hash.to_lowercase()
    } else {
        format!("0x{}", hash.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hash() {
        assert_eq!(normalize_hash("0xAB"), "0xab");
        assert_eq!(normalize_hash("AB"), "0xab");
    }

    #[test]
    fn test_block_number_literal_is_lowercase_hex() {
        let height: u32 = 48656297;
        assert_eq!(format!("{height:#x}"), "0x2e66fa9");
    }
}
