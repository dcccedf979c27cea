//! Private keys: deterministic ECDSA signing and the serialized key forms
//! (SEC public key, WIF, address)

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::One;

use crate::constants::{MAINNET_WIF_PREFIX, TESTNET_WIF_PREFIX};
use crate::curve::{S256Point, G, SECP256K1};
use crate::encoding::{base58check_encode, be_bytes_32};
use crate::error::{Result, ValidationError};
use crate::hashes::hmac_sha256;
use crate::signature::Signature;

/// A secp256k1 private key with its derived public point.
pub struct PrivateKey {
    secret: BigInt,
    point: S256Point,
}

impl PrivateKey {
    /// Creates a key from a secret in [1, n). The public point is derived
    /// eagerly so signing and address derivation never recompute it.
    pub fn new(secret: BigInt) -> Result<Self> {
        if secret < BigInt::one() || secret >= SECP256K1.n {
            return Err(ValidationError::Curve(
                "secret out of range for the curve order".to_string(),
            ));
        }
        let point = G.scalar_mul(&secret)?;
        Ok(PrivateKey { secret, point })
    }

    pub fn point(&self) -> &S256Point {
        &self.point
    }

    /// The secret as 64 zero-padded hex digits.
    pub fn hex(&self) -> String {
        format!("{:064x}", self.secret)
    }

    /// Signs a message digest. The nonce is derived deterministically
    /// from the secret and digest, and s is canonicalized to the low
    /// half of the order.
    pub fn sign(&self, z: &BigInt) -> Result<Signature> {
        let n = &SECP256K1.n;
        let k = self.deterministic_k(z);
        let r = G
            .scalar_mul(&k)?
            .x_num()
            .ok_or_else(|| ValidationError::Curve("nonce produced the identity".to_string()))?;
        let k_inv = k.modpow(&(n - BigInt::from(2)), n);
        let mut s = ((z + &self.secret * &r) * k_inv).mod_floor(n);
        if s > (n >> 1) {
            s = n - s;
        }
        Signature::new(r, s)
    }

    /// RFC 6979-style nonce derivation: an HMAC-SHA256 chain seeded from
    /// the secret and digest, retried until the candidate lands in [1, n).
    fn deterministic_k(&self, z: &BigInt) -> BigInt {
        let n = &SECP256K1.n;
        let mut z = z.clone();
        if &z > n {
            z -= n;
        }

        let z_bytes = be_bytes_32(&z);
        let secret_bytes = be_bytes_32(&self.secret);

        let mut k = [0u8; 32];
        let mut v = [1u8; 32];

        let mut seed = Vec::with_capacity(32 + 1 + 64);
        seed.extend_from_slice(&v);
        seed.push(0x00);
        seed.extend_from_slice(&secret_bytes);
        seed.extend_from_slice(&z_bytes);
        k = hmac_sha256(&k, &seed);
        v = hmac_sha256(&k, &v);

        seed.clear();
        seed.extend_from_slice(&v);
        seed.push(0x01);
        seed.extend_from_slice(&secret_bytes);
        seed.extend_from_slice(&z_bytes);
        k = hmac_sha256(&k, &seed);
        v = hmac_sha256(&k, &v);

        loop {
            v = hmac_sha256(&k, &v);
            let candidate = BigInt::from_bytes_be(Sign::Plus, &v);
            if candidate >= BigInt::one() && &candidate < n {
                return candidate;
            }
            let mut retry = Vec::with_capacity(33);
            retry.extend_from_slice(&v);
            retry.push(0x00);
            k = hmac_sha256(&k, &retry);
            v = hmac_sha256(&k, &v);
        }
    }

    pub fn sec_compressed(&self) -> Result<Vec<u8>> {
        self.point.sec_compressed()
    }

    pub fn sec_uncompressed(&self) -> Result<Vec<u8>> {
        self.point.sec_uncompressed()
    }

    /// Wallet Import Format: network prefix, 32-byte secret, and a 0x01
    /// marker when the corresponding public key is compressed.
    pub fn wif(&self, compressed: bool, testnet: bool) -> String {
        let prefix = if testnet { TESTNET_WIF_PREFIX } else { MAINNET_WIF_PREFIX };
        let mut payload = vec![prefix];
        payload.extend_from_slice(&be_bytes_32(&self.secret));
        if compressed {
            payload.push(0x01);
        }
        base58check_encode(&payload)
    }

    pub fn address(&self, compressed: bool, testnet: bool) -> Result<String> {
        self.point.address(compressed, testnet)
    }
}
