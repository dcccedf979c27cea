//! Error types for offline transaction validation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("curve operation failed: {0}")]
    Curve(String),

    #[error("bad signature encoding: {0}")]
    SignatureFormat(String),

    #[error("script failed: {0}")]
    Script(String),

    #[error("consensus rule violation: {0}")]
    Consensus(String),

    #[error("previous transaction lookup failed: {0}")]
    Fetch(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;
