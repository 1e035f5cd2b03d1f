//! Base58check address codec.
//!
//! Encoding is driven by an [`AddressProfile`]: alphabet, checksum algorithm,
//! hash derivation and prefix/suffix bytes are all profile parameters so the
//! same codec serves Tron mainnet (prefix `0x41`) and testnet (prefix `0xa0`).

use crate::{keccak256, sha256d};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address")]
    InvalidAddress,
    #[error("Invalid hash length")]
    InvalidHashLength,
}

/// String-to-bytes encoding of the final address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeKind {
    Base58,
}

/// Checksum appended to the payload before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    DoubleSha256,
}

/// Hash derivation applied when the input is a raw public key instead of an
/// account hash of the expected length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Keccak256LastTwenty,
}

/// Everything needed to encode or decode an address for one network.
#[derive(Debug, Clone)]
pub struct AddressProfile {
    pub encode_kind: EncodeKind,
    pub alphabet: &'static bs58::Alphabet,
    pub checksum_kind: ChecksumKind,
    pub hash_kind: HashKind,
    pub hash_len: usize,
    pub prefix: &'static [u8],
    pub suffix: &'static [u8],
}

/// Tron mainnet: bitcoin alphabet, double-SHA256 checksum, 20 byte account
/// hash behind a single `0x41` prefix byte.
pub const TRON_MAINNET: AddressProfile = AddressProfile {
    encode_kind: EncodeKind::Base58,
    alphabet: bs58::Alphabet::BITCOIN,
    checksum_kind: ChecksumKind::DoubleSha256,
    hash_kind: HashKind::Keccak256LastTwenty,
    hash_len: 20,
    prefix: &[0x41],
    suffix: &[],
};

pub const TRON_TESTNET: AddressProfile = AddressProfile {
    encode_kind: EncodeKind::Base58,
    alphabet: bs58::Alphabet::BITCOIN,
    checksum_kind: ChecksumKind::DoubleSha256,
    hash_kind: HashKind::Keccak256LastTwenty,
    hash_len: 20,
    prefix: &[0xa0],
    suffix: &[],
};

fn calc_checksum(data: &[u8], kind: ChecksumKind) -> [u8; 4] {
    match kind {
        ChecksumKind::DoubleSha256 => {
            let digest = sha256d(data);
            [digest[0], digest[1], digest[2], digest[3]]
        }
    }
}

fn derive_hash(input: &[u8], kind: HashKind) -> Vec<u8> {
    match kind {
        HashKind::Keccak256LastTwenty => keccak256(input)[12..32].to_vec(),
    }
}

/// Encode an account hash (or a raw public key) into its string address.
///
/// Inputs that do not have `profile.hash_len` bytes are treated as public
/// keys and hashed first.
pub fn encode_address(hash: &[u8], profile: &AddressProfile) -> String {
    let hash = if hash.len() != profile.hash_len {
        derive_hash(hash, profile.hash_kind)
    } else {
        hash.to_vec()
    };

    let mut data = Vec::with_capacity(profile.prefix.len() + hash.len() + profile.suffix.len() + 4);
    data.extend_from_slice(profile.prefix);
    data.extend_from_slice(&hash);
    data.extend_from_slice(profile.suffix);
    let checksum = calc_checksum(&data, profile.checksum_kind);
    data.extend_from_slice(&checksum);

    match profile.encode_kind {
        EncodeKind::Base58 => bs58::encode(data)
            .with_alphabet(profile.alphabet)
            .into_string(),
    }
}

/// Decode a string address back into the account hash.
///
/// Verifies the checksum and the prefix/suffix bytes; any mismatch yields
/// [`AddressError::InvalidAddress`], a payload of the wrong length yields
/// [`AddressError::InvalidHashLength`].
pub fn decode_address(address: &str, profile: &AddressProfile) -> Result<Vec<u8>, AddressError> {
    let decoded = match profile.encode_kind {
        EncodeKind::Base58 => bs58::decode(address)
            .with_alphabet(profile.alphabet)
            .into_vec()
            .map_err(|_| AddressError::InvalidAddress)?,
    };

    if decoded.len() < 4 + profile.prefix.len() + profile.suffix.len() {
        return Err(AddressError::InvalidAddress);
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    if calc_checksum(payload, profile.checksum_kind)[..] != *checksum {
        return Err(AddressError::InvalidAddress);
    }

    if !payload.starts_with(profile.prefix) || !payload.ends_with(profile.suffix) {
        return Err(AddressError::InvalidAddress);
    }
    let hash = &payload[profile.prefix.len()..payload.len() - profile.suffix.len()];

    if hash.len() != profile.hash_len {
        return Err(AddressError::InvalidHashLength);
    }

    Ok(hash.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    // account hash of TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL
    const HASH: &str = "8840e6c55b9ada326d211d818c34a994aeced808";

    #[test]
    fn test_encode_known_address() {
        let hash = hex::decode(HASH).unwrap();
        assert_eq!(encode_address(&hash, &TRON_MAINNET), "TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL");
    }

    #[test]
    fn test_decode_known_address() {
        let hash = decode_address("TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL", &TRON_MAINNET).unwrap();
        assert_eq!(hex::encode(hash), HASH);
    }

    #[test]
    fn test_round_trip() {
        for seed in 0u8..32 {
            let hash: Vec<u8> = (0..20).map(|i| seed.wrapping_mul(31).wrapping_add(i)).collect();
            for profile in [&TRON_MAINNET, &TRON_TESTNET] {
                let encoded = encode_address(&hash, profile);
                assert_eq!(decode_address(&encoded, profile).unwrap(), hash);
            }
        }
    }

    #[test]
    fn test_public_key_input_is_hashed() {
        // 64 byte input is not an account hash, keccak derivation kicks in
        let pk = vec![0x07u8; 64];
        let expected = &keccak256(&pk)[12..32];
        let encoded = encode_address(&pk, &TRON_MAINNET);
        assert_eq!(decode_address(&encoded, &TRON_MAINNET).unwrap(), expected);
    }

    #[test]
    fn test_checksum_rejects_any_corruption() {
        let address = "TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL";
        let alphabet = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
        // substituting any single character must break the checksum
        for i in 0..address.len() {
            for c in alphabet.chars() {
                if address.as_bytes()[i] == c as u8 {
                    continue;
                }
                let mut corrupted = address.to_string().into_bytes();
                corrupted[i] = c as u8;
                let corrupted = String::from_utf8(corrupted).unwrap();
                assert_eq!(
                    decode_address(&corrupted, &TRON_MAINNET),
                    Err(AddressError::InvalidAddress),
                    "corrupted address {corrupted} decoded"
                );
            }
        }
    }

    #[test]
    fn test_decode_rejects_wrong_network() {
        // valid mainnet address fails the testnet prefix check
        assert_eq!(
            decode_address("TNPeeaaFB7K9cmo4uQpcU32zGK8G1NYqeL", &TRON_TESTNET),
            Err(AddressError::InvalidAddress)
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for input in ["", "0OIl", "not-base58!", "T"] {
            assert!(decode_address(input, &TRON_MAINNET).is_err(), "{input:?} decoded");
        }
    }
}
