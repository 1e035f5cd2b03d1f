//! Packing primitives shared by the column family encodings.
//!
//! Integers use base-128 varints (zigzag for signed values), strings are
//! length prefixed, floats are big-endian IEEE754, heights are 4 byte
//! big-endian keys so their lexicographic order equals numeric order.

use chainbook_core::models::AddressDescriptor;

use crate::StorageError;

pub fn pack_varuint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            buf.push(byte | 0x80);
        } else {
            buf.push(byte);
            break;
        }
    }
}

pub fn unpack_varuint(buf: &[u8]) -> Result<(u64, usize), StorageError> {
    let mut value: u64 = 0;
    for (i, byte) in buf.iter().enumerate() {
        if i >= 10 {
            break;
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(StorageError::DecodeError("truncated varuint".to_string()))
}

pub fn pack_varint(value: i64, buf: &mut Vec<u8>) {
    // zigzag keeps small negative indexes short
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    pack_varuint(zigzag, buf);
}

pub fn unpack_varint(buf: &[u8]) -> Result<(i64, usize), StorageError> {
    let (zigzag, len) = unpack_varuint(buf)?;
    let value = ((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64);
    Ok((value, len))
}

pub fn pack_string(value: &str, buf: &mut Vec<u8>) {
    pack_varuint(value.len() as u64, buf);
    buf.extend_from_slice(value.as_bytes());
}

pub fn unpack_string(buf: &[u8]) -> Result<(String, usize), StorageError> {
    let (len, l) = unpack_varuint(buf)?;
    let end = l + len as usize;
    if buf.len() < end {
        return Err(StorageError::DecodeError("truncated string".to_string()));
    }
    let value = String::from_utf8(buf[l..end].to_vec())
        .map_err(|e| StorageError::DecodeError(e.to_string()))?;
    Ok((value, end))
}

pub fn pack_float64(value: f64, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&value.to_bits().to_be_bytes());
}

pub fn unpack_float64(buf: &[u8]) -> Result<(f64, usize), StorageError> {
    if buf.len() < 8 {
        return Err(StorageError::DecodeError("truncated float64".to_string()));
    }
    let mut bits = [0u8; 8];
    bits.copy_from_slice(&buf[..8]);
    Ok((f64::from_bits(u64::from_be_bytes(bits)), 8))
}

/// Big-endian block height, the key of the height-indexed column families.
pub fn pack_uint(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn unpack_uint(buf: &[u8]) -> Result<u32, StorageError> {
    if buf.len() < 4 {
        return Err(StorageError::DecodeError("truncated uint".to_string()));
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[..4]);
    Ok(u32::from_be_bytes(bytes))
}

/// Key of the `addresses` column family: descriptor followed by the height.
pub fn pack_address_key(addr_desc: &AddressDescriptor, height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(addr_desc.len() + 4);
    key.extend_from_slice(addr_desc.as_ref());
    key.extend_from_slice(&pack_uint(height));
    key
}
