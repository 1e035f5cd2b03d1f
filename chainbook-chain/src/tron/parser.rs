//! Tron parser: canonical transaction building, transfer extraction and
//! packing of transactions for the persistent store.

use num_bigint::BigInt;
use tracing::warn;

use chainbook_core::{
    models::{
        blockchain::{TronTransaction, Tx, TxInput, TxOutput},
        token::{InternalTransfer, TokenTransfer},
        AddressDescriptor, ContractCallType, ContractType, PACKED_TXID_LEN,
        TRC20_TRANSFER_EVENT_TOPIC, TRC20_TRANSFER_METHOD_ID, TRON_AMOUNT_DECIMAL_POINT,
    },
    traits::{ChainError, ChainParser},
    Bytes,
};

use super::raw::{encode_address_from_hex, hex_to_bigint};

/// Length of `transfer(address,uint256)` call data in hex characters.
const TRANSFER_DATA_LENGTH: usize = 68 * 2;

/// Parse TRC20 `transfer(address,uint256)` call data, returning the raw hex
/// recipient and the amount.
pub fn parse_transfer_call(data: &str) -> Result<(String, BigInt), ChainError> {
    if data.len() != TRANSFER_DATA_LENGTH {
        return Err(ChainError::DecodeError("call data is not transfer".to_string()));
    }
    if &data[0..8] != TRC20_TRANSFER_METHOD_ID {
        return Err(ChainError::DecodeError("call method is not transfer".to_string()));
    }
    let to = data[32..72].to_string();
    let amount = hex_to_bigint(&data[72..])?;
    Ok((to, amount))
}

/// Parse a `Transfer(address,address,uint256)` event log, returning
/// `(contract, from, to, value)` with participants decoded from the 32 byte
/// topics.
pub fn parse_transfer_event(
    contract: &str,
    topics: &[String],
    data: &str,
    testnet: bool,
) -> Result<(String, String, String, BigInt), ChainError> {
    if topics.len() != 3 || topics[0] != TRC20_TRANSFER_EVENT_TOPIC {
        return Err(ChainError::DecodeError("log is not a transfer".to_string()));
    }
    let from = encode_address_from_hex(topic_address(&topics[1]), testnet)?;
    let to = encode_address_from_hex(topic_address(&topics[2]), testnet)?;
    let value = hex_to_bigint(data)?;
    Ok((contract.to_string(), from, to, value))
}

/// The address occupies the last 20 bytes of a 32 byte topic word.
fn topic_address(topic: &str) -> &str {
    let topic = topic.strip_prefix("0x").unwrap_or(topic);
    if topic.len() >= 40 {
        &topic[topic.len() - 40..]
    } else {
        topic
    }
}

pub struct TronParser {
    block_addresses_to_keep: u32,
    testnet: bool,
}

impl TronParser {
    pub fn new(block_addresses_to_keep: u32, testnet: bool) -> Self {
        TronParser { block_addresses_to_keep, testnet }
    }

    /// Convert a decoded Tron transaction into the canonical form: one
    /// pseudo-input, at most one pseudo-output, the native amount in
    /// `value_sat`. Multi-contract transactions record only the first call.
    pub fn tron_tx_to_tx(
        &self,
        tx: &TronTransaction,
        block_time: i64,
        confirmations: u32,
    ) -> Result<Tx, ChainError> {
        let contract = tx
            .contract
            .first()
            .ok_or_else(|| ChainError::DecodeError(format!("tx {} has no contract", tx.txid)))?;
        if tx.contract.len() > 1 {
            warn!(txid = %tx.txid, contracts = tx.contract.len(), "multi contract tx, indexing only the first call");
        }

        // TRC10 value moves as a token transfer, not as native value; TRC20
        // transfers route native value to the contract address.
        let value_sat = if contract.contract_type == ContractType::TransferAssetContract {
            BigInt::from(0)
        } else {
            contract.amount.clone()
        };

        let to = if contract.contract_call_type == ContractCallType::Trc20Transfer {
            contract.contract_address.clone()
        } else {
            contract.to.clone()
        };

        let vout = if to.is_empty() {
            Vec::new()
        } else {
            vec![TxOutput { n: 0, value_sat, addresses: vec![to] }]
        };

        Ok(Tx {
            txid: tx.txid.clone(),
            vin: vec![TxInput { addresses: vec![contract.from.clone()] }],
            vout,
            block_time,
            time: block_time,
            confirmations,
            tron: tx.clone(),
        })
    }
}

impl ChainParser for TronParser {
    fn packed_txid_len(&self) -> usize {
        PACKED_TXID_LEN
    }

    fn block_addresses_to_keep(&self) -> u32 {
        self.block_addresses_to_keep
    }

    fn amount_decimal_point(&self) -> u32 {
        TRON_AMOUNT_DECIMAL_POINT
    }

    /// Txids are packed as their ASCII hex form.
    fn pack_txid(&self, txid: &str) -> Result<Vec<u8>, ChainError> {
        if txid.is_empty() {
            return Err(ChainError::TxidMissing);
        }
        Ok(txid.as_bytes().to_vec())
    }

    fn unpack_txid(&self, buf: &[u8]) -> Result<String, ChainError> {
        String::from_utf8(buf.to_vec()).map_err(|e| ChainError::DecodeError(e.to_string()))
    }

    fn addr_desc_from_address(&self, address: &str) -> Result<AddressDescriptor, ChainError> {
        Ok(Bytes::from(address.as_bytes().to_vec()))
    }

    fn addr_desc_from_vout(&self, output: &TxOutput) -> Result<AddressDescriptor, ChainError> {
        if output.addresses.len() != 1 {
            return Err(ChainError::AddressMissing);
        }
        self.addr_desc_from_address(&output.addresses[0])
    }

    fn addresses_from_addr_desc(
        &self,
        desc: &AddressDescriptor,
    ) -> Result<Vec<String>, ChainError> {
        let address =
            String::from_utf8(desc.to_vec()).map_err(|e| ChainError::DecodeError(e.to_string()))?;
        Ok(vec![address])
    }

    /// The coin-specific payload is the JSON serialized Tron transaction.
    fn pack_tx(&self, tx: &Tx) -> Result<Vec<u8>, ChainError> {
        serde_json::to_vec(&tx.tron).map_err(|e| ChainError::DecodeError(e.to_string()))
    }

    fn unpack_tx(&self, buf: &[u8]) -> Result<(Tx, u32), ChainError> {
        let tron: TronTransaction =
            serde_json::from_slice(buf).map_err(|e| ChainError::DecodeError(e.to_string()))?;
        let height = tron.block_height as u32;
        let block_time = tron.block_time;
        let tx = self.tron_tx_to_tx(&tron, block_time, 0)?;
        Ok((tx, height))
    }

    /// One TRC10 event when the first contract is a `TransferAssetContract`.
    fn trc10_transfers(&self, tx: &Tx) -> Result<Vec<TokenTransfer>, ChainError> {
        let mut transfers = Vec::new();
        if let Some(contract) = tx.tron.contract.first() {
            if contract.contract_type == ContractType::TransferAssetContract {
                transfers.push(TokenTransfer {
                    contract: contract.contract_address.clone(),
                    from: contract.from.clone(),
                    to: contract.to.clone(),
                    tokens: contract.amount.clone(),
                });
            }
        }
        Ok(transfers)
    }

    /// TRC20 events: one per trigger call whose data parses as
    /// `transfer(address,uint256)`, one per `Transfer` log. Unparseable logs
    /// are skipped, never fatal for the transaction.
    fn trc20_transfers(&self, tx: &Tx) -> Result<Vec<TokenTransfer>, ChainError> {
        let mut transfers = Vec::new();

        for contract in &tx.tron.contract {
            if contract.contract_type != ContractType::TriggerSmartContract {
                continue;
            }
            if contract.contract_call_type == ContractCallType::Trc20Transfer {
                transfers.push(TokenTransfer {
                    contract: contract.contract_address.clone(),
                    from: contract.from.clone(),
                    to: contract.to.clone(),
                    tokens: contract.amount.clone(),
                });
            }
        }

        if let Some(info) = &tx.tron.info {
            for log in &info.log {
                match parse_transfer_event(&log.address, &log.topics, &log.data, self.testnet) {
                    Ok((contract, from, to, tokens)) => {
                        transfers.push(TokenTransfer { contract, from, to, tokens });
                    }
                    Err(err) => {
                        if log.topics.first().map(String::as_str)
                            == Some(TRC20_TRANSFER_EVENT_TOPIC)
                        {
                            warn!(txid = %tx.txid, %err, "skipping undecodable transfer log");
                        }
                    }
                }
            }
        }

        Ok(transfers)
    }

    /// One entry per internal transaction of a trigger call, carrying the
    /// first call value.
    fn internal_transfers(&self, tx: &Tx) -> Result<Vec<InternalTransfer>, ChainError> {
        let mut transfers = Vec::new();

        let is_trigger = tx
            .tron
            .contract
            .first()
            .is_some_and(|c| c.contract_type == ContractType::TriggerSmartContract);
        if !is_trigger {
            return Ok(transfers);
        }

        if let Some(info) = &tx.tron.info {
            for it in &info.internal_transactions {
                let value = match it.call_values.first() {
                    Some(v) => v.clone(),
                    None => continue,
                };
                transfers.push(InternalTransfer {
                    from: it.caller_address.clone(),
                    to: it.transfer_to_address.clone(),
                    value,
                });
            }
        }

        Ok(transfers)
    }
}
