pub mod blockchain;
pub mod token;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::Bytes;

/// Fixed-width byte form of an address used as a KV key. For Tron it is the
/// 34 byte base58 string itself, for EVM chains the 20 byte account hash.
pub type AddressDescriptor = Bytes;

/// Canonical (base58check) address string.
pub type Address = String;

/// Transaction id as reported by the node, a hex string.
pub type Txid = String;

/// Length of a Tron address descriptor in bytes.
pub const TRON_ADDRESS_DESCRIPTOR_LEN: usize = 34;

/// Length of a Tron token descriptor in bytes.
pub const TRON_TOKEN_DESCRIPTOR_LEN: usize = 30;

/// Length of a packed Tron txid: the 64 ASCII characters of the hex string.
pub const PACKED_TXID_LEN: usize = 64;

/// Number of decimal points in native TRX amounts.
pub const TRON_AMOUNT_DECIMAL_POINT: u32 = 6;

/// 4 byte method id of `transfer(address,uint256)`.
pub const TRC20_TRANSFER_METHOD_ID: &str = "a9059cbb";

/// Canonical `Transfer(address,address,uint256)` event topic.
pub const TRC20_TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Address for which the index deliberately suppresses contract bookkeeping.
pub const TRON_BLACKHOLE_ADDRESS: &str = "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy";

/// Sentinel meaning "no address"; never written as an output address.
pub const NO_ADDRESS: &str = "";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChainKind {
    #[default]
    Tron,
    Fantom,
    Gnosis,
}

/// Contract call types recognized by the node, plus a catch-all for new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum ContractType {
    AccountCreateContract,
    TransferContract,
    TransferAssetContract,
    VoteWitnessContract,
    WitnessCreateContract,
    AssetIssueContract,
    WitnessUpdateContract,
    ParticipateAssetIssueContract,
    AccountUpdateContract,
    FreezeBalanceContract,
    UnfreezeBalanceContract,
    WithdrawBalanceContract,
    UnfreezeAssetContract,
    UpdateAssetContract,
    ProposalCreateContract,
    ProposalApproveContract,
    ProposalDeleteContract,
    SetAccountIdContract,
    CreateSmartContract,
    TriggerSmartContract,
    UpdateSettingContract,
    ExchangeCreateContract,
    ExchangeInjectContract,
    ExchangeWithdrawContract,
    ExchangeTransactionContract,
    ShieldedTransferContract,
    ClearABIContract,
    UpdateBrokerageContract,
    UpdateEnergyLimitContract,
    #[strum(default)]
    Other(String),
}

/// Derived classification of a `TriggerSmartContract` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractCallType {
    Trc20Transfer,
    #[default]
    Unknown,
}

/// Token protocol a contract call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    #[serde(rename = "")]
    None,
    Trc10,
    Trc20,
}

/// Execution outcome of a single contract within a transaction.
pub const CONTRACT_RET_SUCCESS: &str = "SUCCESS";
pub const CONTRACT_RET_REVERT: &str = "REVERT";

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_contract_type_from_str() {
        assert_eq!(
            ContractType::from_str("TriggerSmartContract").unwrap(),
            ContractType::TriggerSmartContract
        );
        assert_eq!(
            ContractType::from_str("BrandNewContract").unwrap(),
            ContractType::Other("BrandNewContract".to_string())
        );
        assert_eq!(ContractType::TransferContract.to_string(), "TransferContract");
    }

    #[test]
    fn test_protocol_serde_tags() {
        assert_eq!(serde_json::to_string(&Protocol::None).unwrap(), "\"\"");
        assert_eq!(serde_json::to_string(&Protocol::Trc10).unwrap(), "\"trc10\"");
        assert_eq!(serde_json::to_string(&Protocol::Trc20).unwrap(), "\"trc20\"");
    }

    #[test]
    fn test_chain_kind_display() {
        assert_eq!(ChainKind::Fantom.to_string(), "fantom");
    }
}
