//! Previous-transaction lookup for input validation
//!
//! The transaction layer only needs raw bytes for a txid; where those
//! bytes come from is behind the `UtxoSource` trait so tests and offline
//! validation can supply a fixed set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::transaction::Tx;

/// Supplies the raw serialization of a transaction by its hex txid.
pub trait UtxoSource {
    fn fetch_raw(&self, tx_id: &str) -> anyhow::Result<Vec<u8>>;
}

/// A parsing cache over a `UtxoSource`. Every fetched transaction is
/// checked against the requested id before it is cached.
pub struct TxFetcher<S: UtxoSource> {
    source: S,
    cache: HashMap<String, Tx>,
}

impl<S: UtxoSource> TxFetcher<S> {
    pub fn new(source: S) -> Self {
        TxFetcher { source, cache: HashMap::new() }
    }

    pub fn fetch(&mut self, tx_id: &str) -> Result<&Tx> {
        if !self.cache.contains_key(tx_id) {
            let raw = self
                .source
                .fetch_raw(tx_id)
                .map_err(|e| ValidationError::Fetch(e.to_string()))?;
            let tx = Tx::parse(&mut raw.as_slice())?;
            let parsed_id = tx.id()?;
            if parsed_id != tx_id {
                return Err(ValidationError::Fetch(format!(
                    "source returned transaction {parsed_id} for requested id {tx_id}"
                )));
            }
            debug!(tx_id, "cached previous transaction");
            self.cache.insert(tx_id.to_string(), tx);
        }
        Ok(&self.cache[tx_id])
    }
}

/// An in-memory source backed by a map of raw transactions.
#[derive(Default)]
pub struct StaticSource {
    transactions: HashMap<String, Vec<u8>>,
}

impl StaticSource {
    pub fn new() -> Self {
        StaticSource::default()
    }

    pub fn insert_raw(&mut self, tx_id: &str, raw: Vec<u8>) {
        self.transactions.insert(tx_id.to_string(), raw);
    }

    pub fn insert_hex(&mut self, tx_id: &str, raw_hex: &str) -> Result<()> {
        let raw = hex::decode(raw_hex)
            .map_err(|e| ValidationError::MalformedInput(format!("bad transaction hex: {e}")))?;
        self.insert_raw(tx_id, raw);
        Ok(())
    }
}

impl UtxoSource for StaticSource {
    fn fetch_raw(&self, tx_id: &str) -> anyhow::Result<Vec<u8>> {
        match self.transactions.get(tx_id) {
            Some(raw) => Ok(raw.clone()),
            None => anyhow::bail!("unknown transaction {tx_id}"),
        }
    }
}
