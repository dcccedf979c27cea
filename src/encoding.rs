//! Binary codecs shared across the crate: Bitcoin varints, little-endian
//! integer helpers, fixed-width big-endian scalars, and Base58Check.

use std::io::Read;

use num_bigint::BigInt;

use crate::constants::{
    MAINNET_P2PKH_PREFIX, MAINNET_P2SH_PREFIX, TESTNET_P2PKH_PREFIX, TESTNET_P2SH_PREFIX,
};
use crate::error::{Result, ValidationError};

/// Encodes an unsigned integer as a Bitcoin varint.
pub fn encode_varint(n: u64) -> Vec<u8> {
    if n < 0xfd {
        vec![n as u8]
    } else if n < 0x10000 {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(n as u16).to_le_bytes());
        out
    } else if n < 0x1_0000_0000 {
        let mut out = vec![0xfe];
        out.extend_from_slice(&(n as u32).to_le_bytes());
        out
    } else {
        let mut out = vec![0xff];
        out.extend_from_slice(&n.to_le_bytes());
        out
    }
}

/// Reads a varint from a stream.
pub fn read_varint(stream: &mut impl Read) -> Result<u64> {
    let prefix = read_array::<1>(stream)?[0];
    match prefix {
        0xfd => Ok(u16::from_le_bytes(read_array::<2>(stream)?) as u64),
        0xfe => Ok(u32::from_le_bytes(read_array::<4>(stream)?) as u64),
        0xff => Ok(u64::from_le_bytes(read_array::<8>(stream)?)),
        n => Ok(n as u64),
    }
}

/// Reads exactly N bytes, failing on a truncated stream.
pub fn read_array<const N: usize>(stream: &mut impl Read) -> Result<[u8; N]> {
    let mut buffer = [0u8; N];
    stream
        .read_exact(&mut buffer)
        .map_err(|_| ValidationError::MalformedInput("unexpected end of stream".to_string()))?;
    Ok(buffer)
}

/// Reads exactly `length` bytes into a vector.
pub fn read_vec(stream: &mut impl Read, length: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; length];
    stream
        .read_exact(&mut buffer)
        .map_err(|_| ValidationError::MalformedInput("unexpected end of stream".to_string()))?;
    Ok(buffer)
}

pub fn read_u32_le(stream: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array::<4>(stream)?))
}

pub fn read_u64_le(stream: &mut impl Read) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array::<8>(stream)?))
}

/// Fixed-width 32-byte big-endian form of a non-negative scalar.
pub fn be_bytes_32(n: &BigInt) -> [u8; 32] {
    let (_, bytes) = n.to_bytes_be();
    let mut out = [0u8; 32];
    let src: &[u8] = if bytes.len() > 32 { &bytes[bytes.len() - 32..] } else { &bytes };
    out[32 - src.len()..].copy_from_slice(src);
    out
}

/// Base58Check encoding: payload followed by a 4-byte double-SHA256 checksum.
pub fn base58check_encode(payload: &[u8]) -> String {
    bs58::encode(payload).with_check().into_string()
}

/// Decodes a Base58Check string back to its payload (version prefix included).
pub fn base58check_decode(encoded: &str) -> Result<Vec<u8>> {
    bs58::decode(encoded)
        .with_check(None)
        .into_vec()
        .map_err(|e| ValidationError::MalformedInput(format!("bad base58check string: {e}")))
}

fn prefixed_address(prefix: u8, h160: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(prefix);
    payload.extend_from_slice(h160);
    base58check_encode(&payload)
}

/// Address for a public-key hash.
pub fn h160_to_p2pkh_address(h160: &[u8; 20], testnet: bool) -> String {
    let prefix = if testnet { TESTNET_P2PKH_PREFIX } else { MAINNET_P2PKH_PREFIX };
    prefixed_address(prefix, h160)
}

/// Address for a redeem-script hash.
pub fn h160_to_p2sh_address(h160: &[u8; 20], testnet: bool) -> String {
    let prefix = if testnet { TESTNET_P2SH_PREFIX } else { MAINNET_P2SH_PREFIX };
    prefixed_address(prefix, h160)
}
