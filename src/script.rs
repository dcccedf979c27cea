//! Script parsing, serialization, and evaluation
//!
//! A script is a sequence of instructions. Evaluation walks a work queue
//! so P2SH redemption can splice a redeem script's instructions in front
//! of whatever remains.

use std::collections::VecDeque;
use std::fmt;
use std::io::Read;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{MAX_EVAL_INSTRUCTIONS, MAX_INSTRUCTION_SIZE, MAX_SCRIPT_SIZE};
use crate::encoding::{encode_varint, read_array, read_varint, read_vec};
use crate::error::{Result, ValidationError};
use crate::hashes::hash160;
use crate::op::{
    self, decode_bool, dispatch, Instruction, Stack, OP_16, OP_CHECKMULTISIG,
    OP_CHECKMULTISIGVERIFY, OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUAL,
    OP_EQUALVERIFY, OP_FROMALTSTACK, OP_HASH160, OP_IF, OP_NOTIF, OP_PUSHDATA1, OP_PUSHDATA2,
    OP_TOALTSTACK, OP_1,
};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Script {
    instructions: Vec<Instruction>,
}

impl Script {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Script { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Parses a length-prefixed script from a stream. Byte values 1-75
    /// push that many bytes; 76 and 77 are the one- and two-byte
    /// PUSHDATA forms; everything else is an opcode.
    pub fn parse(stream: &mut impl Read) -> Result<Self> {
        let length = read_varint(stream)?;
        if length as usize > MAX_SCRIPT_SIZE {
            return Err(ValidationError::MalformedInput(format!(
                "script of {length} bytes exceeds the {MAX_SCRIPT_SIZE} byte limit"
            )));
        }

        let mut instructions = Vec::new();
        let mut count = 0u64;
        while count < length {
            let current = read_array::<1>(stream)?[0];
            count += 1;
            match current {
                1..=75 => {
                    let data = read_vec(stream, current as usize)?;
                    count += current as u64;
                    instructions.push(Instruction::Data(data));
                }
                OP_PUSHDATA1 => {
                    let data_length = read_array::<1>(stream)?[0] as usize;
                    let data = read_vec(stream, data_length)?;
                    count += 1 + data_length as u64;
                    instructions.push(Instruction::data(data)?);
                }
                OP_PUSHDATA2 => {
                    let data_length = u16::from_le_bytes(read_array::<2>(stream)?) as usize;
                    let data = read_vec(stream, data_length)?;
                    count += 2 + data_length as u64;
                    instructions.push(Instruction::data(data)?);
                }
                opcode => instructions.push(Instruction::Opcode(opcode)),
            }
        }
        if count != length {
            return Err(ValidationError::MalformedInput(
                "script body does not match its declared length".to_string(),
            ));
        }
        Ok(Script { instructions })
    }

    /// The script body without its length prefix.
    pub fn raw_serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for instruction in &self.instructions {
            match instruction {
                Instruction::Opcode(code) => out.push(*code),
                Instruction::Data(data) => {
                    match data.len() {
                        0..=75 => out.push(data.len() as u8),
                        76..=255 => {
                            out.push(OP_PUSHDATA1);
                            out.push(data.len() as u8);
                        }
                        256..=MAX_INSTRUCTION_SIZE => {
                            out.push(OP_PUSHDATA2);
                            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
                        }
                        _ => {
                            return Err(ValidationError::MalformedInput(
                                "push too long to serialize".to_string(),
                            ))
                        }
                    }
                    out.extend_from_slice(data);
                }
            }
        }
        Ok(out)
    }

    /// The wire form: varint length prefix followed by the body.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let body = self.raw_serialize()?;
        let mut out = encode_varint(body.len() as u64);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Concatenates two scripts, unlocking instructions first.
    pub fn extend(&self, other: &Script) -> Script {
        let mut instructions =
            Vec::with_capacity(self.instructions.len() + other.instructions.len());
        instructions.extend_from_slice(&self.instructions);
        instructions.extend_from_slice(&other.instructions);
        Script { instructions }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
    pub fn is_p2pkh_script_pubkey(&self) -> bool {
        matches!(
            self.instructions.as_slice(),
            [
                Instruction::Opcode(OP_DUP),
                Instruction::Opcode(OP_HASH160),
                Instruction::Data(hash),
                Instruction::Opcode(OP_EQUALVERIFY),
                Instruction::Opcode(OP_CHECKSIG),
            ] if hash.len() == 20
        )
    }

    /// OP_HASH160 <20 bytes> OP_EQUAL
    pub fn is_p2sh_script_pubkey(&self) -> bool {
        matches!(
            self.instructions.as_slice(),
            [
                Instruction::Opcode(OP_HASH160),
                Instruction::Data(hash),
                Instruction::Opcode(OP_EQUAL),
            ] if hash.len() == 20
        )
    }

    /// Builds the standard P2PKH locking script for a pubkey hash.
    pub fn p2pkh_script(h160: &[u8; 20]) -> Script {
        Script {
            instructions: vec![
                Instruction::Opcode(OP_DUP),
                Instruction::Opcode(OP_HASH160),
                Instruction::Data(h160.to_vec()),
                Instruction::Opcode(OP_EQUALVERIFY),
                Instruction::Opcode(OP_CHECKSIG),
            ],
        }
    }

    /// Builds the standard P2SH locking script for a redeem-script hash.
    pub fn p2sh_script(h160: &[u8; 20]) -> Script {
        Script {
            instructions: vec![
                Instruction::Opcode(OP_HASH160),
                Instruction::Data(h160.to_vec()),
                Instruction::Opcode(OP_EQUAL),
            ],
        }
    }

    /// Runs the script against the signature digest `z`. Succeeds when
    /// execution finishes without a structural failure and the final top
    /// of stack is truthy.
    pub fn evaluate(&self, z: &BigInt) -> Result<bool> {
        let mut queue: VecDeque<Instruction> = self.instructions.iter().cloned().collect();
        let mut stack = Stack::new();
        let mut processed = 0usize;

        while let Some(instruction) = queue.pop_front() {
            processed += 1;
            if processed > MAX_EVAL_INSTRUCTIONS {
                return Err(ValidationError::Script(
                    "instruction ceiling exceeded".to_string(),
                ));
            }

            match instruction {
                Instruction::Opcode(opcode) => {
                    if let Some(operation) = dispatch(opcode) {
                        operation(&mut stack)?;
                    } else {
                        execute_special(opcode, &mut stack, &mut queue, z)?;
                    }
                }
                Instruction::Data(data) => {
                    stack.push(Instruction::Data(data))?;
                    // P2SH: a pubkey-hash template immediately after a push
                    // is redeemed by splicing the pushed script in.
                    if is_p2sh_template(&queue) {
                        redeem_p2sh(&mut stack, &mut queue)?;
                    }
                }
            }
        }

        if stack.is_empty() {
            return Ok(false);
        }
        Ok(decode_bool(stack.peek()?.as_bytes()))
    }
}

/// Opcodes the dispatch table cannot express: small-number pushes,
/// conditionals, altstack placeholders, and the digest-aware checks.
fn execute_special(
    opcode: u8,
    stack: &mut Stack,
    queue: &mut VecDeque<Instruction>,
    z: &BigInt,
) -> Result<()> {
    match opcode {
        OP_1..=OP_16 => op::op_small_number(stack, opcode),
        OP_IF => run_conditional(stack, queue, true),
        OP_NOTIF => run_conditional(stack, queue, false),
        OP_ELSE | OP_ENDIF => Err(ValidationError::Script(
            "conditional close without a matching open".to_string(),
        )),
        // The altstack is not modelled; these execute as no-ops.
        OP_TOALTSTACK | OP_FROMALTSTACK => Ok(()),
        OP_CHECKSIG => op::op_checksig(stack, z),
        OP_CHECKSIGVERIFY => op::op_checksigverify(stack, z),
        OP_CHECKMULTISIG => op::op_checkmultisig(stack, z),
        OP_CHECKMULTISIGVERIFY => op::op_checkmultisigverify(stack, z),
        // Unassigned opcodes execute as no-ops.
        _ => Ok(()),
    }
}

/// Single-branch conditional: pops the condition and drops the guarded
/// instructions up to OP_ENDIF when it does not match. OP_ELSE and
/// nested conditionals inside the branch are unsupported.
fn run_conditional(
    stack: &mut Stack,
    queue: &mut VecDeque<Instruction>,
    wants_true: bool,
) -> Result<()> {
    let condition = decode_bool(stack.pop()?.as_bytes());
    let take_branch = condition == wants_true;

    let mut branch = Vec::new();
    loop {
        let Some(instruction) = queue.pop_front() else {
            return Err(ValidationError::Script(
                "conditional without a closing endif".to_string(),
            ));
        };
        match instruction {
            Instruction::Opcode(OP_ENDIF) => break,
            Instruction::Opcode(OP_IF | OP_NOTIF) => {
                return Err(ValidationError::Script(
                    "nested conditionals are not supported".to_string(),
                ));
            }
            Instruction::Opcode(OP_ELSE) => {
                return Err(ValidationError::Script(
                    "else branches are not supported".to_string(),
                ));
            }
            other => branch.push(other),
        }
    }

    if take_branch {
        for instruction in branch.into_iter().rev() {
            queue.push_front(instruction);
        }
    }
    Ok(())
}

/// The remaining instructions are exactly OP_HASH160 <20 bytes> OP_EQUAL.
/// Anything after the template means the pattern is ordinary script, not
/// a P2SH commitment.
fn is_p2sh_template(queue: &VecDeque<Instruction>) -> bool {
    queue.len() == 3
        && matches!(
            (queue.front(), queue.get(1), queue.get(2)),
            (
                Some(Instruction::Opcode(OP_HASH160)),
                Some(Instruction::Data(hash)),
                Some(Instruction::Opcode(OP_EQUAL)),
            ) if hash.len() == 20
        )
}

/// Consumes the template, checks the redeem script's hash160 against the
/// committed hash, and splices the parsed redeem script into the queue.
fn redeem_p2sh(stack: &mut Stack, queue: &mut VecDeque<Instruction>) -> Result<()> {
    let redeem_bytes = stack.pop()?.into_bytes();

    queue.pop_front(); // OP_HASH160
    let Some(Instruction::Data(expected)) = queue.pop_front() else {
        return Err(ValidationError::Script("malformed p2sh template".to_string()));
    };
    queue.pop_front(); // OP_EQUAL

    if hash160(&redeem_bytes) != expected.as_slice() {
        return Err(ValidationError::Script(
            "redeem script does not match the committed hash".to_string(),
        ));
    }
    debug!(redeem_len = redeem_bytes.len(), "redeeming p2sh script");

    // The redeem script is stored bare; re-add the length prefix the
    // parser expects.
    let mut prefixed = encode_varint(redeem_bytes.len() as u64);
    prefixed.extend_from_slice(&redeem_bytes);
    let redeem_script = Script::parse(&mut prefixed.as_slice())?;

    for instruction in redeem_script.instructions.into_iter().rev() {
        queue.push_front(instruction);
    }
    Ok(())
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for instruction in &self.instructions {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match instruction {
                Instruction::Opcode(code) => write!(f, "OP[{code:#04x}]")?,
                Instruction::Data(data) => write!(f, "{}", hex::encode(data))?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::private_key::PrivateKey;

    fn parse_hex(script_hex: &str) -> Script {
        let bytes = hex::decode(script_hex).unwrap();
        Script::parse(&mut bytes.as_slice()).unwrap()
    }

    #[test]
    fn test_parse_scriptsig() {
        // A real scriptSig: a 71-byte DER signature push and a 33-byte
        // compressed pubkey push.
        let script_hex = "6b4830450221008ed46aa2cf12d6d81065bfabe903670165b538f65ee9a3385e6327d80c66d3b50220\
                          24dc92939e7cfbdf91aeb16711b3a3a6c743cae266b2fe5e73bfcd8b0fa5f8b5012103935581e52c35\
                          4cd2f484fe8ed83af7a3097005b2f9c60bff71d35bd795f54b67";
        let script = parse_hex(script_hex);
        assert_eq!(script.instructions().len(), 2);
        let Instruction::Data(signature) = &script.instructions()[0] else {
            panic!("expected a data push");
        };
        assert_eq!(signature.len(), 0x48);
        let Instruction::Data(pubkey) = &script.instructions()[1] else {
            panic!("expected a data push");
        };
        assert_eq!(pubkey.len(), 0x21);
    }

    #[test]
    fn test_serialize_round_trip() {
        let script_hex = "6b4830450221008ed46aa2cf12d6d81065bfabe903670165b538f65ee9a3385e6327d80c66d3b50220\
                          24dc92939e7cfbdf91aeb16711b3a3a6c743cae266b2fe5e73bfcd8b0fa5f8b5012103935581e52c35\
                          4cd2f484fe8ed83af7a3097005b2f9c60bff71d35bd795f54b67";
        let script = parse_hex(script_hex);
        assert_eq!(hex::encode(script.serialize().unwrap()), script_hex);
    }

    #[test]
    fn test_parse_rejects_truncated_script() {
        // Declares 10 bytes but supplies 2.
        let bytes = hex::decode("0a0102").unwrap();
        assert!(Script::parse(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_parse_rejects_push_past_end() {
        // Declared length 2, but the push wants 5 bytes.
        let bytes = hex::decode("0205ff").unwrap();
        assert!(Script::parse(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_pushdata_forms_round_trip() {
        let short = Script::new(vec![Instruction::Data(vec![0xab; 80])]);
        let long = Script::new(vec![Instruction::Data(vec![0xcd; 300])]);
        for script in [short, long] {
            let serialized = script.serialize().unwrap();
            let parsed = Script::parse(&mut serialized.as_slice()).unwrap();
            assert_eq!(parsed, script);
        }
    }

    #[test]
    fn test_oversized_push_fails_to_serialize() {
        let script = Script::new(vec![Instruction::Data(vec![0; 521])]);
        assert!(script.serialize().is_err());
    }

    #[test]
    fn test_template_recognition() {
        let p2pkh = Script::p2pkh_script(&[0x11; 20]);
        assert!(p2pkh.is_p2pkh_script_pubkey());
        assert!(!p2pkh.is_p2sh_script_pubkey());

        let p2sh = Script::p2sh_script(&[0x22; 20]);
        assert!(p2sh.is_p2sh_script_pubkey());
        assert!(!p2sh.is_p2pkh_script_pubkey());
    }

    #[test]
    fn test_evaluate_p2pkh() {
        let z = BigInt::from(0x77aa_1234u64);
        let key = PrivateKey::new(BigInt::from(271828)).unwrap();
        let mut der = key.sign(&z).unwrap().der();
        der.push(0x01);
        let sec = key.sec_compressed().unwrap();

        let script_sig =
            Script::new(vec![Instruction::Data(der), Instruction::Data(sec.clone())]);
        let script_pubkey = Script::p2pkh_script(&hash160(&sec));

        let combined = script_sig.extend(&script_pubkey);
        assert!(combined.evaluate(&z).unwrap());
    }

    #[test]
    fn test_evaluate_p2pkh_wrong_key_fails() {
        let z = BigInt::from(0x77aa_1234u64);
        let key = PrivateKey::new(BigInt::from(271828)).unwrap();
        let other = PrivateKey::new(BigInt::from(314159)).unwrap();
        let mut der = key.sign(&z).unwrap().der();
        der.push(0x01);
        let sec = key.sec_compressed().unwrap();

        let script_sig = Script::new(vec![Instruction::Data(der), Instruction::Data(sec)]);
        // Locked to a different key's hash: EQUALVERIFY errors out.
        let script_pubkey =
            Script::p2pkh_script(&hash160(&other.sec_compressed().unwrap()));

        assert!(script_sig.extend(&script_pubkey).evaluate(&z).is_err());
    }

    #[test]
    fn test_evaluate_arithmetic_puzzle() {
        // scriptPubkey: OP_ADD OP_6 OP_EQUAL, unlocked by pushing 2 and 4.
        let script_sig =
            Script::new(vec![Instruction::Data(vec![2]), Instruction::Data(vec![4])]);
        let script_pubkey = Script::new(vec![
            Instruction::Opcode(op::OP_ADD),
            Instruction::Opcode(OP_1 + 5),
            Instruction::Opcode(OP_EQUAL),
        ]);
        assert!(script_sig.extend(&script_pubkey).evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_evaluate_empty_stack_is_false() {
        let script = Script::new(vec![Instruction::Opcode(op::OP_NOP)]);
        assert!(!script.evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_evaluate_false_top_is_false() {
        let script = Script::new(vec![Instruction::Data(Vec::new())]);
        assert!(!script.evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_evaluate_conditional_taken() {
        // 1 IF 7 ENDIF 7 EQUAL
        let script = Script::new(vec![
            Instruction::Data(vec![1]),
            Instruction::Opcode(OP_IF),
            Instruction::Data(vec![7]),
            Instruction::Opcode(OP_ENDIF),
            Instruction::Data(vec![7]),
            Instruction::Opcode(OP_EQUAL),
        ]);
        assert!(script.evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_evaluate_notif_skips_on_true() {
        // 1 NOTIF RETURN ENDIF 1
        let script = Script::new(vec![
            Instruction::Data(vec![1]),
            Instruction::Opcode(OP_NOTIF),
            Instruction::Opcode(op::OP_RETURN),
            Instruction::Opcode(OP_ENDIF),
            Instruction::Data(vec![1]),
        ]);
        assert!(script.evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_evaluate_unterminated_conditional() {
        let script = Script::new(vec![
            Instruction::Data(vec![1]),
            Instruction::Opcode(OP_IF),
            Instruction::Data(vec![7]),
        ]);
        assert!(script.evaluate(&BigInt::from(0)).is_err());
    }

    #[test]
    fn test_evaluate_else_unsupported() {
        let script = Script::new(vec![
            Instruction::Data(vec![1]),
            Instruction::Opcode(OP_IF),
            Instruction::Data(vec![7]),
            Instruction::Opcode(OP_ELSE),
            Instruction::Data(vec![8]),
            Instruction::Opcode(OP_ENDIF),
        ]);
        assert!(script.evaluate(&BigInt::from(0)).is_err());
    }

    #[test]
    fn test_evaluate_bare_endif_fails() {
        let script = Script::new(vec![Instruction::Opcode(OP_ENDIF)]);
        assert!(script.evaluate(&BigInt::from(0)).is_err());
    }

    #[test]
    fn test_evaluate_p2sh_redeem() {
        // Redeem script: OP_ADD OP_6 OP_EQUAL.
        let redeem = Script::new(vec![
            Instruction::Opcode(op::OP_ADD),
            Instruction::Opcode(OP_1 + 5),
            Instruction::Opcode(OP_EQUAL),
        ]);
        let redeem_bytes = redeem.raw_serialize().unwrap();
        let script_pubkey = Script::p2sh_script(&hash160(&redeem_bytes));

        let script_sig = Script::new(vec![
            Instruction::Data(vec![2]),
            Instruction::Data(vec![4]),
            Instruction::Data(redeem_bytes),
        ]);
        assert!(script_sig.extend(&script_pubkey).evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_hash_puzzle_mid_script_is_not_p2sh() {
        // A hash puzzle whose lock continues past OP_EQUAL: the pushed
        // preimage must stay on the stack as data, not be spliced in as
        // a redeem script.
        let preimage = Script::new(vec![Instruction::Opcode(op::OP_0)])
            .raw_serialize()
            .unwrap();
        let script = Script::new(vec![
            Instruction::Data(preimage.clone()),
            Instruction::Opcode(OP_HASH160),
            Instruction::Data(hash160(&preimage).to_vec()),
            Instruction::Opcode(OP_EQUAL),
            Instruction::Opcode(op::OP_NOP),
        ]);
        assert!(script.evaluate(&BigInt::from(0)).unwrap());
    }

    #[test]
    fn test_evaluate_p2sh_wrong_redeem_script() {
        let redeem = Script::new(vec![Instruction::Opcode(OP_1)]);
        let redeem_bytes = redeem.raw_serialize().unwrap();
        let script_pubkey = Script::p2sh_script(&[0x42; 20]);

        let script_sig = Script::new(vec![Instruction::Data(redeem_bytes)]);
        assert!(script_sig.extend(&script_pubkey).evaluate(&BigInt::from(0)).is_err());
    }

    #[test]
    fn test_evaluate_instruction_ceiling() {
        // A self-referencing p2sh-style loop is impossible, so drive the
        // counter with a long flat script instead.
        let instructions = vec![Instruction::Opcode(op::OP_NOP); MAX_EVAL_INSTRUCTIONS + 1];
        let script = Script::new(instructions);
        assert!(script.evaluate(&BigInt::from(0)).is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_script() {
        let mut bytes = encode_varint((MAX_SCRIPT_SIZE + 1) as u64);
        bytes.extend(std::iter::repeat(0x61).take(MAX_SCRIPT_SIZE + 1));
        assert!(Script::parse(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_display() {
        let script = Script::p2pkh_script(&[0xab; 20]);
        let rendered = script.to_string();
        assert!(rendered.contains("OP[0x76]"));
        assert!(rendered.contains(&"ab".repeat(20)));
    }
}
