//! secp256k1: fixed curve parameters, the generator, and point operations
//! used by ECDSA (verify, SEC encode/decode, hash160, addresses)

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use once_cell::sync::Lazy;

use crate::encoding::{be_bytes_32, h160_to_p2pkh_address};
use crate::error::{Result, ValidationError};
use crate::field::FieldElement;
use crate::hashes::hash160;
use crate::point::Point;
use crate::signature::Signature;

/// The secp256k1 domain parameters. Constructed once and shared by
/// reference; never mutated.
pub struct CurveParams {
    /// Field prime, 2^256 - 2^32 - 977
    pub p: BigInt,
    pub a: BigInt,
    pub b: BigInt,
    /// Generator coordinates
    pub gx: BigInt,
    pub gy: BigInt,
    /// Group order
    pub n: BigInt,
}

pub static SECP256K1: Lazy<CurveParams> = Lazy::new(|| CurveParams {
    p: hex_int("fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f"),
    a: BigInt::from(0),
    b: BigInt::from(7),
    gx: hex_int("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"),
    gy: hex_int("483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"),
    n: hex_int("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141"),
});

/// The generator point. A failure here is a configuration defect, not a
/// data-dependent case, so construction panics.
pub static G: Lazy<S256Point> = Lazy::new(|| {
    S256Point::new(SECP256K1.gx.clone(), SECP256K1.gy.clone())
        .expect("secp256k1 generator is on the curve")
});

fn hex_int(s: &str) -> BigInt {
    BigInt::parse_bytes(s.as_bytes(), 16).expect("valid curve constant")
}

/// A point on secp256k1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S256Point {
    point: Point,
}

impl S256Point {
    pub fn new(x: BigInt, y: BigInt) -> Result<Self> {
        let x = FieldElement::new(x, SECP256K1.p.clone())?;
        let y = FieldElement::new(y, SECP256K1.p.clone())?;
        let point = Point::new(x, y, curve_a(), curve_b())?;
        Ok(S256Point { point })
    }

    pub fn infinity() -> Self {
        S256Point { point: Point::infinity(curve_a(), curve_b()) }
    }

    pub fn is_infinity(&self) -> bool {
        self.point.is_infinity()
    }

    /// The x coordinate as an integer, if the point is finite.
    pub fn x_num(&self) -> Option<BigInt> {
        self.point.x().map(|x| x.number().clone())
    }

    pub fn y_num(&self) -> Option<BigInt> {
        self.point.y().map(|y| y.number().clone())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        Ok(S256Point { point: self.point.add(&other.point)? })
    }

    /// Scalar multiplication with the coefficient reduced mod the group
    /// order, keeping exponents bounded regardless of caller input.
    pub fn scalar_mul(&self, coefficient: &BigInt) -> Result<Self> {
        let reduced = coefficient.mod_floor(&SECP256K1.n);
        Ok(S256Point { point: self.point.scalar_mul(&reduced)? })
    }

    /// ECDSA verification: with u = z/s and v = r/s, the signature is
    /// valid iff (u*G + v*self).x == r mod n.
    pub fn verify(&self, z: &BigInt, signature: &Signature) -> Result<bool> {
        let n = &SECP256K1.n;
        let s_inv = signature.s().modpow(&(n - BigInt::from(2)), n);
        let u = (z * &s_inv).mod_floor(n);
        let v = (signature.r() * &s_inv).mod_floor(n);
        let total = G.scalar_mul(&u)?.add(&self.scalar_mul(&v)?)?;
        match total.x_num() {
            Some(x) => Ok(x.mod_floor(n) == signature.r().mod_floor(n)),
            None => Ok(false),
        }
    }

    /// Uncompressed SEC encoding: 0x04 || x || y.
    pub fn sec_uncompressed(&self) -> Result<Vec<u8>> {
        let (x, y) = self.coordinates()?;
        let mut out = Vec::with_capacity(65);
        out.push(0x04);
        out.extend_from_slice(&be_bytes_32(&x));
        out.extend_from_slice(&be_bytes_32(&y));
        Ok(out)
    }

    /// Compressed SEC encoding: parity prefix || x.
    pub fn sec_compressed(&self) -> Result<Vec<u8>> {
        let (x, y) = self.coordinates()?;
        let prefix = if y.is_even() { 0x02 } else { 0x03 };
        let mut out = Vec::with_capacity(33);
        out.push(prefix);
        out.extend_from_slice(&be_bytes_32(&x));
        Ok(out)
    }

    /// Decodes a SEC public key, recovering y from x for the compressed
    /// forms via the modular square root beta = alpha^((p+1)/4).
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data.first() {
            Some(0x04) => {
                if data.len() != 65 {
                    return Err(ValidationError::SignatureFormat(
                        "uncompressed SEC key must be 65 bytes".to_string(),
                    ));
                }
                let x = BigInt::from_bytes_be(Sign::Plus, &data[1..33]);
                let y = BigInt::from_bytes_be(Sign::Plus, &data[33..65]);
                S256Point::new(x, y)
            }
            Some(prefix @ (0x02 | 0x03)) => {
                if data.len() != 33 {
                    return Err(ValidationError::SignatureFormat(
                        "compressed SEC key must be 33 bytes".to_string(),
                    ));
                }
                let p = &SECP256K1.p;
                let x = BigInt::from_bytes_be(Sign::Plus, &data[1..33]);
                let alpha = (x.modpow(&BigInt::from(3), p) + &SECP256K1.b).mod_floor(p);
                // p = 3 mod 4, so the square root is alpha^((p+1)/4)
                let beta = alpha.modpow(&((p + BigInt::from(1)) >> 2), p);
                let wants_even = *prefix == 0x02;
                let y = if beta.is_even() == wants_even { beta.clone() } else { p - &beta };
                S256Point::new(x, y)
            }
            _ => Err(ValidationError::SignatureFormat(
                "invalid SEC prefix".to_string(),
            )),
        }
    }

    /// hash160 of the chosen SEC encoding, the basis for P2PKH scripts.
    pub fn hash160(&self, compressed: bool) -> Result<[u8; 20]> {
        let sec = if compressed { self.sec_compressed()? } else { self.sec_uncompressed()? };
        Ok(hash160(&sec))
    }

    /// Base58Check P2PKH address.
    pub fn address(&self, compressed: bool, testnet: bool) -> Result<String> {
        Ok(h160_to_p2pkh_address(&self.hash160(compressed)?, testnet))
    }

    fn coordinates(&self) -> Result<(BigInt, BigInt)> {
        match (self.x_num(), self.y_num()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(ValidationError::Curve(
                "cannot encode the point at infinity".to_string(),
            )),
        }
    }
}

fn curve_a() -> FieldElement {
    FieldElement::new(SECP256K1.a.clone(), SECP256K1.p.clone())
        .expect("secp256k1 parameter a is in range")
}

fn curve_b() -> FieldElement {
    FieldElement::new(SECP256K1.b.clone(), SECP256K1.p.clone())
        .expect("secp256k1 parameter b is in range")
}
