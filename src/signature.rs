//! ECDSA signatures and their DER encoding

use std::fmt;

use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::curve::SECP256K1;
use crate::error::{Result, ValidationError};

/// An (r, s) signature pair. Both components are positive and below the
/// curve order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    r: BigInt,
    s: BigInt,
}

impl Signature {
    pub fn new(r: BigInt, s: BigInt) -> Result<Self> {
        let n = &SECP256K1.n;
        if r <= BigInt::zero() || &r >= n || s <= BigInt::zero() || &s >= n {
            return Err(ValidationError::SignatureFormat(
                "signature component out of range".to_string(),
            ));
        }
        Ok(Signature { r, s })
    }

    pub fn r(&self) -> &BigInt {
        &self.r
    }

    pub fn s(&self) -> &BigInt {
        &self.s
    }

    /// DER encoding: 0x30 total-len, then 0x02 len r, 0x02 len s, with a
    /// leading 0x00 on any component whose high bit is set.
    pub fn der(&self) -> Vec<u8> {
        let r_bytes = unsigned_component(&self.r);
        let s_bytes = unsigned_component(&self.s);

        let mut out = Vec::with_capacity(6 + r_bytes.len() + s_bytes.len());
        out.push(0x30);
        out.push((4 + r_bytes.len() + s_bytes.len()) as u8);
        out.push(0x02);
        out.push(r_bytes.len() as u8);
        out.extend_from_slice(&r_bytes);
        out.push(0x02);
        out.push(s_bytes.len() as u8);
        out.extend_from_slice(&s_bytes);
        out
    }

    /// Structural inverse of `der`. Fails on a wrong tag, inconsistent
    /// declared lengths, or truncated input.
    pub fn parse_der(data: &[u8]) -> Result<Self> {
        let malformed =
            |reason: &str| ValidationError::SignatureFormat(format!("bad DER signature: {reason}"));

        if data.len() < 6 {
            return Err(malformed("too short"));
        }
        if data[0] != 0x30 {
            return Err(malformed("missing compound marker"));
        }
        if data[1] as usize != data.len() - 2 {
            return Err(malformed("declared length does not match input"));
        }
        if data[2] != 0x02 {
            return Err(malformed("missing r marker"));
        }
        let r_len = data[3] as usize;
        let r_end = 4 + r_len;
        if r_end + 2 > data.len() {
            return Err(malformed("r length overruns input"));
        }
        let r = BigInt::from_bytes_be(Sign::Plus, &data[4..r_end]);
        if data[r_end] != 0x02 {
            return Err(malformed("missing s marker"));
        }
        let s_len = data[r_end + 1] as usize;
        let s_start = r_end + 2;
        if s_start + s_len != data.len() {
            return Err(malformed("signature length mismatch"));
        }
        let s = BigInt::from_bytes_be(Sign::Plus, &data[s_start..]);

        Signature::new(r, s)
    }
}

/// Big-endian component bytes with DER's unsigned-integer rule applied.
fn unsigned_component(n: &BigInt) -> Vec<u8> {
    let (_, mut bytes) = n.to_bytes_be();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    bytes
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:x}, {:x})", self.r, self.s)
    }
}
