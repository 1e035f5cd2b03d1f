pub mod address;
pub mod hex_bytes;
pub mod models;
pub mod serde_primitives;
pub mod traits;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub use hex_bytes::Bytes;

use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

/// Compute the Keccak-256 hash of input bytes.
pub fn keccak256<T: AsRef<[u8]>>(bytes: T) -> [u8; 32] {
    let mut output = [0u8; 32];

    let mut hasher = Keccak::v256();
    hasher.update(bytes.as_ref());
    hasher.finalize(&mut output);

    output
}

/// Compute SHA256(SHA256(input)), the checksum hash of base58check addresses.
pub fn sha256d<T: AsRef<[u8]>>(bytes: T) -> [u8; 32] {
    let first = Sha256::digest(bytes.as_ref());
    let second = Sha256::digest(first);
    second.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            hex::encode(keccak256([])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sha256d() {
        // double SHA256 of "hello"
        assert_eq!(
            hex::encode(sha256d(b"hello")),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }
}
