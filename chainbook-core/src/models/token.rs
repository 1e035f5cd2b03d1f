//! Token events and token metadata descriptors.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::Address;

/// Kind of token contract an address interacted with. The discriminants are
/// part of the persistent `addressContracts` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Trc10 = 0,
    Trc20 = 1,
}

impl TokenType {
    pub fn from_u64(v: u64) -> Option<TokenType> {
        match v {
            0 => Some(TokenType::Trc10),
            1 => Some(TokenType::Trc20),
            _ => None,
        }
    }
}

/// A TRC10 or TRC20 transfer extracted from a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTransfer {
    /// TRC20 contract address, or the ASCII TRC10 asset descriptor.
    pub contract: String,
    pub from: Address,
    pub to: Address,
    pub tokens: BigInt,
}

/// Contract-induced native value movement.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalTransfer {
    pub from: Address,
    pub to: Address,
    pub value: BigInt,
}

/// TRC10 token descriptor, as cached by the token cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trc10Token {
    pub contract: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

/// TRC20 token descriptor assembled from contract info.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trc20Token {
    pub contract: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}
