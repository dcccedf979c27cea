//! Transactions: wire codec, sighash construction, signing, and
//! input-by-input verification
//!
//! Txids are stored and displayed in big-endian human order; the wire
//! format reverses them. `Tx::id` and the fetcher agree on that order.

use std::fmt;
use std::io::Read;

use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{COINBASE_PREV_INDEX, SIGHASH_ALL};
use crate::encoding::{encode_varint, read_array, read_u32_le, read_u64_le, read_varint};
use crate::error::{Result, ValidationError};
use crate::fetcher::{TxFetcher, UtxoSource};
use crate::hashes::hash256;
use crate::op::Instruction;
use crate::private_key::PrivateKey;
use crate::script::Script;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Previous txid in big-endian human order
    prev_tx_id: [u8; 32],
    prev_index: u32,
    script_sig: Script,
    sequence: u32,
}

impl TxInput {
    pub fn new(prev_tx_id: [u8; 32], prev_index: u32, script_sig: Script, sequence: u32) -> Self {
        TxInput { prev_tx_id, prev_index, script_sig, sequence }
    }

    pub fn prev_index(&self) -> u32 {
        self.prev_index
    }

    pub fn script_sig(&self) -> &Script {
        &self.script_sig
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The referenced txid as hex, matching `Tx::id`.
    pub fn prev_tx_hex(&self) -> String {
        hex::encode(self.prev_tx_id)
    }

    pub fn parse(stream: &mut impl Read) -> Result<Self> {
        let mut prev_tx_id = read_array::<32>(stream)?;
        prev_tx_id.reverse();
        let prev_index = read_u32_le(stream)?;
        let script_sig = Script::parse(stream)?;
        let sequence = read_u32_le(stream)?;
        Ok(TxInput { prev_tx_id, prev_index, script_sig, sequence })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut id = self.prev_tx_id;
        id.reverse();
        out.extend_from_slice(&id);
        out.extend_from_slice(&self.prev_index.to_le_bytes());
        out.extend_from_slice(&self.script_sig.serialize()?);
        out.extend_from_slice(&self.sequence.to_le_bytes());
        Ok(out)
    }

    /// Amount of the referenced output.
    pub fn value<S: UtxoSource>(&self, fetcher: &mut TxFetcher<S>) -> Result<u64> {
        let tx = fetcher.fetch(&self.prev_tx_hex())?;
        Ok(tx.output(self.prev_index)?.amount())
    }

    /// Locking script of the referenced output.
    pub fn script_pubkey<S: UtxoSource>(&self, fetcher: &mut TxFetcher<S>) -> Result<Script> {
        let tx = fetcher.fetch(&self.prev_tx_hex())?;
        Ok(tx.output(self.prev_index)?.script_pubkey().clone())
    }

    fn is_coinbase(&self) -> bool {
        self.prev_tx_id == [0u8; 32] && self.prev_index == COINBASE_PREV_INDEX
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    amount: u64,
    script_pubkey: Script,
}

impl TxOutput {
    pub fn new(amount: u64, script_pubkey: Script) -> Self {
        TxOutput { amount, script_pubkey }
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    pub fn parse(stream: &mut impl Read) -> Result<Self> {
        let amount = read_u64_le(stream)?;
        let script_pubkey = Script::parse(stream)?;
        Ok(TxOutput { amount, script_pubkey })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.script_pubkey.serialize()?);
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
}

impl Tx {
    pub fn new(version: u32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, lock_time: u32) -> Self {
        Tx { version, inputs, outputs, lock_time }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    fn output(&self, index: u32) -> Result<&TxOutput> {
        self.outputs.get(index as usize).ok_or_else(|| {
            ValidationError::Consensus(format!("input references nonexistent output {index}"))
        })
    }

    pub fn parse(stream: &mut impl Read) -> Result<Self> {
        let version = read_u32_le(stream)?;
        let input_count = read_varint(stream)?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(TxInput::parse(stream)?);
        }
        let output_count = read_varint(stream)?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            outputs.push(TxOutput::parse(stream)?);
        }
        let lock_time = read_u32_le(stream)?;
        Ok(Tx { version, inputs, outputs, lock_time })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for input in &self.inputs {
            out.extend_from_slice(&input.serialize()?);
        }
        out.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            out.extend_from_slice(&output.serialize()?);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        Ok(out)
    }

    /// Double-SHA256 of the serialization, reversed into human order.
    pub fn hash(&self) -> Result<[u8; 32]> {
        let mut digest = hash256(&self.serialize()?);
        digest.reverse();
        Ok(digest)
    }

    /// The hex txid.
    pub fn id(&self) -> Result<String> {
        Ok(hex::encode(self.hash()?))
    }

    /// Inputs minus outputs. Negative when the transaction tries to
    /// create value.
    pub fn fee<S: UtxoSource>(&self, fetcher: &mut TxFetcher<S>) -> Result<i64> {
        let mut input_total: i128 = 0;
        for input in &self.inputs {
            input_total += input.value(fetcher)? as i128;
        }
        let output_total: i128 = self.outputs.iter().map(|o| o.amount() as i128).sum();
        i64::try_from(input_total - output_total)
            .map_err(|_| ValidationError::Consensus("fee out of range".to_string()))
    }

    /// The digest an input's signature commits to: the transaction with
    /// every other scriptSig blanked and the signed input's scriptSig
    /// replaced by the locking script (or redeem script for P2SH), with
    /// the sighash type appended.
    pub fn signature_hash<S: UtxoSource>(
        &self,
        input_index: usize,
        redeem_script: Option<&Script>,
        fetcher: &mut TxFetcher<S>,
    ) -> Result<BigInt> {
        if input_index >= self.inputs.len() {
            return Err(ValidationError::MalformedInput(format!(
                "no input at index {input_index}"
            )));
        }

        let mut preimage = Vec::new();
        preimage.extend_from_slice(&self.version.to_le_bytes());
        preimage.extend_from_slice(&encode_varint(self.inputs.len() as u64));
        for (i, input) in self.inputs.iter().enumerate() {
            let script_sig = if i == input_index {
                match redeem_script {
                    Some(redeem) => redeem.clone(),
                    None => input.script_pubkey(fetcher)?,
                }
            } else {
                Script::default()
            };
            let substituted = TxInput {
                prev_tx_id: input.prev_tx_id,
                prev_index: input.prev_index,
                script_sig,
                sequence: input.sequence,
            };
            preimage.extend_from_slice(&substituted.serialize()?);
        }
        preimage.extend_from_slice(&encode_varint(self.outputs.len() as u64));
        for output in &self.outputs {
            preimage.extend_from_slice(&output.serialize()?);
        }
        preimage.extend_from_slice(&self.lock_time.to_le_bytes());
        preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());

        let digest = hash256(&preimage);
        Ok(BigInt::from_bytes_be(Sign::Plus, &digest))
    }

    /// Signs one input with the given key, installs the P2PKH scriptSig,
    /// and reports whether the freshly signed input verifies.
    pub fn sign_input<S: UtxoSource>(
        &mut self,
        input_index: usize,
        private_key: &PrivateKey,
        fetcher: &mut TxFetcher<S>,
    ) -> Result<bool> {
        let z = self.signature_hash(input_index, None, fetcher)?;
        let mut der = private_key.sign(&z)?.der();
        der.push(SIGHASH_ALL as u8);
        let sec = private_key.sec_compressed()?;

        self.inputs[input_index].script_sig =
            Script::new(vec![Instruction::Data(der), Instruction::Data(sec)]);
        self.verify_input(input_index, fetcher)
    }

    /// Evaluates one input's unlocking script against the referenced
    /// locking script.
    pub fn verify_input<S: UtxoSource>(
        &self,
        input_index: usize,
        fetcher: &mut TxFetcher<S>,
    ) -> Result<bool> {
        let input = self.inputs.get(input_index).ok_or_else(|| {
            ValidationError::MalformedInput(format!("no input at index {input_index}"))
        })?;
        let script_pubkey = input.script_pubkey(fetcher)?;

        // For P2SH the signatures commit to the redeem script carried in
        // the last scriptSig push, not to the locking script.
        let redeem_script = if script_pubkey.is_p2sh_script_pubkey() {
            match input.script_sig.instructions().last() {
                Some(Instruction::Data(redeem_bytes)) => {
                    let mut prefixed = encode_varint(redeem_bytes.len() as u64);
                    prefixed.extend_from_slice(redeem_bytes);
                    Some(Script::parse(&mut prefixed.as_slice())?)
                }
                _ => None,
            }
        } else {
            None
        };

        let z = self.signature_hash(input_index, redeem_script.as_ref(), fetcher)?;
        let combined = input.script_sig.extend(&script_pubkey);
        combined.evaluate(&z)
    }

    /// Full check: the transaction must not create value, and every
    /// input's script must evaluate to true.
    pub fn verify<S: UtxoSource>(&self, fetcher: &mut TxFetcher<S>) -> Result<bool> {
        if self.fee(fetcher)? < 0 {
            return Err(ValidationError::Consensus(
                "outputs exceed inputs".to_string(),
            ));
        }
        for input_index in 0..self.inputs.len() {
            if !self.verify_input(input_index, fetcher)? {
                debug!(input_index, tx_id = %self.id()?, "input failed verification");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A coinbase has exactly one input spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.as_slice(), [input] if input.is_coinbase())
    }

    /// The block height committed in a coinbase scriptSig's first push,
    /// little-endian.
    pub fn coinbase_height(&self) -> Option<u64> {
        if !self.is_coinbase() {
            return None;
        }
        match self.inputs[0].script_sig.instructions().first() {
            Some(Instruction::Data(bytes)) if bytes.len() <= 8 => {
                let mut padded = [0u8; 8];
                padded[..bytes.len()].copy_from_slice(bytes);
                Some(u64::from_le_bytes(padded))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id().unwrap_or_else(|_| "<unserializable>".to_string());
        write!(
            f,
            "tx {} version {} inputs {} outputs {} locktime {}",
            id,
            self.version,
            self.inputs.len(),
            self.outputs.len(),
            self.lock_time
        )
    }
}
