//! Serde helpers shared by the canonical model types.

/// Serialize byte buffers as `0x` prefixed hex strings and back.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &bytes::Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(data)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bytes::Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(raw)
            .map(bytes::Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Serialize [`num_bigint::BigInt`] as its decimal string representation.
///
/// The node reports amounts as JSON numbers or decimal strings; packed
/// transactions always carry the decimal string so values above 2^53
/// round-trip losslessly.
pub mod bigint_string {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigInt, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Wrapper {
        #[serde(with = "super::bigint_string")]
        amount: BigInt,
    }

    #[test]
    fn test_bigint_string_round_trip() {
        let w = Wrapper { amount: BigInt::parse_bytes(b"340282366920938463463374607431768211456", 10).unwrap() };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"amount":"340282366920938463463374607431768211456"}"#);
        assert_eq!(serde_json::from_str::<Wrapper>(&json).unwrap(), w);
    }
}
