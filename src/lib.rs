//! # Spendcheck
//!
//! Offline validation of Bitcoin-style transactions, built up from prime
//! field arithmetic: elliptic curve points over secp256k1, ECDSA with
//! deterministic nonces, a script interpreter covering P2PKH and P2SH,
//! and the legacy transaction wire format with SIGHASH_ALL signing.
//!
//! Everything works without a network. Previous transactions are
//! supplied through the [`fetcher::UtxoSource`] trait, so a fixed set of
//! raw transactions is enough to sign and verify spends end to end.
//!
//! ## Example
//!
//! ```
//! use num_bigint::BigInt;
//! use spendcheck::private_key::PrivateKey;
//!
//! # fn main() -> spendcheck::error::Result<()> {
//! let key = PrivateKey::new(BigInt::from(12345))?;
//! let z = BigInt::from(0x1234_5678);
//! let signature = key.sign(&z)?;
//! assert!(key.point().verify(&z, &signature)?);
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod curve;
pub mod encoding;
pub mod error;
pub mod fetcher;
pub mod field;
pub mod hashes;
pub mod op;
pub mod point;
pub mod private_key;
pub mod script;
pub mod signature;
pub mod transaction;

pub use curve::S256Point;
pub use error::{Result, ValidationError};
pub use field::FieldElement;
pub use point::Point;
pub use private_key::PrivateKey;
pub use script::Script;
pub use signature::Signature;
pub use transaction::{Tx, TxInput, TxOutput};
