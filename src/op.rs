//! Script instructions, the evaluation stack, and opcode implementations
//!
//! Instructions are tagged at parse time: a `Data` instruction is a byte
//! push, an `Opcode` instruction executes. Script numbers on the stack use
//! an unsigned big-endian magnitude encoding with zero as the empty vector.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_INSTRUCTION_SIZE, MAX_STACK_SIZE};
use crate::curve::S256Point;
use crate::error::{Result, ValidationError};
use crate::hashes::{hash160, hash256, sha1};
use crate::signature::Signature;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_PICK: u8 = 0x79;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_SIZE: u8 = 0x82;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_NOT: u8 = 0x91;
pub const OP_ADD: u8 = 0x93;
pub const OP_MUL: u8 = 0x95;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// One parsed script element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// A byte push, at most 520 bytes
    Data(Vec<u8>),
    /// An operation to execute
    Opcode(u8),
}

impl Instruction {
    pub fn data(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() > MAX_INSTRUCTION_SIZE {
            return Err(ValidationError::MalformedInput(format!(
                "push of {} bytes exceeds the {} byte element limit",
                bytes.len(),
                MAX_INSTRUCTION_SIZE
            )));
        }
        Ok(Instruction::Data(bytes))
    }

    pub fn is_opcode(&self) -> bool {
        matches!(self, Instruction::Opcode(_))
    }

    /// The pushed bytes, treating an opcode as its single-byte value.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Instruction::Data(bytes) => bytes,
            Instruction::Opcode(code) => vec![code],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Instruction::Data(bytes) => bytes,
            Instruction::Opcode(code) => std::slice::from_ref(code),
        }
    }
}

/// The evaluation stack, bounded at 1000 entries.
#[derive(Debug, Default)]
pub struct Stack {
    items: Vec<Instruction>,
}

impl Stack {
    pub fn new() -> Self {
        Stack { items: Vec::new() }
    }

    pub fn push(&mut self, instruction: Instruction) -> Result<()> {
        if self.items.len() >= MAX_STACK_SIZE {
            return Err(ValidationError::Script("stack overflow".to_string()));
        }
        self.items.push(instruction);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Instruction> {
        self.items
            .pop()
            .ok_or_else(|| ValidationError::Script("stack underflow".to_string()))
    }

    pub fn peek(&self) -> Result<&Instruction> {
        self.items
            .last()
            .ok_or_else(|| ValidationError::Script("stack underflow".to_string()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Encodes a script number: big-endian magnitude, zero as empty.
pub fn encode_num(n: &BigInt) -> Vec<u8> {
    if n.is_zero() {
        return Vec::new();
    }
    let (_, bytes) = n.to_bytes_be();
    bytes
}

/// Decodes a script number pushed by `encode_num`.
pub fn decode_num(bytes: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, bytes)
}

fn encode_bool(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

/// Truthiness of a stack element: empty and all-zero byte strings are
/// false, everything else is true.
pub fn decode_bool(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| *b != 0)
}

fn pop_num(stack: &mut Stack) -> Result<BigInt> {
    Ok(decode_num(&stack.pop()?.into_bytes()))
}

fn push_num(stack: &mut Stack, n: &BigInt) -> Result<()> {
    stack.push(Instruction::Data(encode_num(n)))
}

fn push_bool(stack: &mut Stack, value: bool) -> Result<()> {
    stack.push(Instruction::Data(encode_bool(value)))
}

pub fn op_0(stack: &mut Stack) -> Result<()> {
    stack.push(Instruction::Data(Vec::new()))
}

/// Pushes the raw byte 0x81. Numeric opcodes treat magnitudes only, so
/// negative one survives as its classic encoding without interpretation.
pub fn op_1negate(stack: &mut Stack) -> Result<()> {
    stack.push(Instruction::Data(vec![0x81]))
}

fn push_small(stack: &mut Stack, n: u8) -> Result<()> {
    stack.push(Instruction::Data(vec![n]))
}

pub fn op_nop(_stack: &mut Stack) -> Result<()> {
    Ok(())
}

pub fn op_verify(stack: &mut Stack) -> Result<()> {
    let top = stack.pop()?;
    if !decode_bool(top.as_bytes()) {
        return Err(ValidationError::Script("verify failed".to_string()));
    }
    Ok(())
}

pub fn op_return(_stack: &mut Stack) -> Result<()> {
    Err(ValidationError::Script("op_return is unspendable".to_string()))
}

pub fn op_2drop(stack: &mut Stack) -> Result<()> {
    stack.pop()?;
    stack.pop()?;
    Ok(())
}

pub fn op_2dup(stack: &mut Stack) -> Result<()> {
    let top = stack.pop()?;
    let second = stack.pop()?;
    stack.push(second.clone())?;
    stack.push(top.clone())?;
    stack.push(second)?;
    stack.push(top)
}

pub fn op_ifdup(stack: &mut Stack) -> Result<()> {
    let top = stack.peek()?;
    if decode_bool(top.as_bytes()) {
        let duplicate = top.clone();
        stack.push(duplicate)?;
    }
    Ok(())
}

pub fn op_depth(stack: &mut Stack) -> Result<()> {
    let depth = BigInt::from(stack.len());
    push_num(stack, &depth)
}

pub fn op_drop(stack: &mut Stack) -> Result<()> {
    stack.pop()?;
    Ok(())
}

pub fn op_dup(stack: &mut Stack) -> Result<()> {
    let top = stack.peek()?.clone();
    stack.push(top)
}

pub fn op_pick(stack: &mut Stack) -> Result<()> {
    let n = pop_num(stack)?;
    let n = usize::try_from(&n)
        .map_err(|_| ValidationError::Script("pick depth out of range".to_string()))?;
    if n >= stack.len() {
        return Err(ValidationError::Script("pick depth exceeds stack".to_string()));
    }
    let item = stack.items[stack.len() - 1 - n].clone();
    stack.push(item)
}

pub fn op_swap(stack: &mut Stack) -> Result<()> {
    let top = stack.pop()?;
    let second = stack.pop()?;
    stack.push(top)?;
    stack.push(second)
}

pub fn op_size(stack: &mut Stack) -> Result<()> {
    let size = BigInt::from(stack.peek()?.as_bytes().len());
    push_num(stack, &size)
}

pub fn op_equal(stack: &mut Stack) -> Result<()> {
    let a = stack.pop()?.into_bytes();
    let b = stack.pop()?.into_bytes();
    push_bool(stack, a == b)
}

pub fn op_equalverify(stack: &mut Stack) -> Result<()> {
    op_equal(stack)?;
    op_verify(stack)
}

pub fn op_not(stack: &mut Stack) -> Result<()> {
    let top = stack.pop()?;
    push_bool(stack, !decode_bool(top.as_bytes()))
}

pub fn op_add(stack: &mut Stack) -> Result<()> {
    let a = pop_num(stack)?;
    let b = pop_num(stack)?;
    push_num(stack, &(a + b))
}

pub fn op_mul(stack: &mut Stack) -> Result<()> {
    let a = pop_num(stack)?;
    let b = pop_num(stack)?;
    push_num(stack, &(a * b))
}

pub fn op_min(stack: &mut Stack) -> Result<()> {
    let a = pop_num(stack)?;
    let b = pop_num(stack)?;
    push_num(stack, &a.min(b))
}

pub fn op_max(stack: &mut Stack) -> Result<()> {
    let a = pop_num(stack)?;
    let b = pop_num(stack)?;
    push_num(stack, &a.max(b))
}

/// Pops max, min, x; pushes whether min <= x < max.
pub fn op_within(stack: &mut Stack) -> Result<()> {
    let max = pop_num(stack)?;
    let min = pop_num(stack)?;
    let x = pop_num(stack)?;
    push_bool(stack, x >= min && x < max)
}

pub fn op_sha1(stack: &mut Stack) -> Result<()> {
    let element = stack.pop()?.into_bytes();
    stack.push(Instruction::Data(sha1(&element).to_vec()))
}

pub fn op_hash160(stack: &mut Stack) -> Result<()> {
    let element = stack.pop()?.into_bytes();
    stack.push(Instruction::Data(hash160(&element).to_vec()))
}

pub fn op_hash256(stack: &mut Stack) -> Result<()> {
    let element = stack.pop()?.into_bytes();
    stack.push(Instruction::Data(hash256(&element).to_vec()))
}

/// Checks one signature against one public key for the digest `z`. A
/// malformed key or signature counts as a failed check, not a script
/// error, so a mutated witness fails cleanly.
pub fn op_checksig(stack: &mut Stack, z: &BigInt) -> Result<()> {
    let pubkey = stack.pop()?.into_bytes();
    let mut der = stack.pop()?.into_bytes();
    // Drop the trailing sighash-type byte appended at signing time.
    der.pop();

    let valid = check_signature(&pubkey, &der, z);
    push_bool(stack, valid)
}

pub fn op_checksigverify(stack: &mut Stack, z: &BigInt) -> Result<()> {
    op_checksig(stack, z)?;
    op_verify(stack)
}

/// m-of-n signature check. Pops n, n public keys, m, m signatures, and
/// the historical extra dummy element. Signatures must appear in the
/// same relative order as their keys; each key is consumed once.
pub fn op_checkmultisig(stack: &mut Stack, z: &BigInt) -> Result<()> {
    let n = small_count(stack, "key count")?;
    let mut pubkeys = Vec::with_capacity(n);
    for _ in 0..n {
        pubkeys.push(stack.pop()?.into_bytes());
    }
    let m = small_count(stack, "signature count")?;
    if m > n {
        return Err(ValidationError::Script(
            "more signatures required than keys supplied".to_string(),
        ));
    }
    let mut signatures = Vec::with_capacity(m);
    for _ in 0..m {
        let mut der = stack.pop()?.into_bytes();
        der.pop();
        signatures.push(der);
    }
    // Off-by-one in the original protocol: one extra element is consumed.
    stack.pop()?;

    let mut keys = pubkeys.into_iter();
    let mut valid = true;
    'signatures: for der in &signatures {
        for key in keys.by_ref() {
            if check_signature(&key, der, z) {
                continue 'signatures;
            }
        }
        valid = false;
        break;
    }
    push_bool(stack, valid)
}

pub fn op_checkmultisigverify(stack: &mut Stack, z: &BigInt) -> Result<()> {
    op_checkmultisig(stack, z)?;
    op_verify(stack)
}

fn check_signature(pubkey: &[u8], der: &[u8], z: &BigInt) -> bool {
    let Ok(point) = S256Point::parse(pubkey) else {
        return false;
    };
    let Ok(signature) = Signature::parse_der(der) else {
        return false;
    };
    point.verify(z, &signature).unwrap_or(false)
}

fn small_count(stack: &mut Stack, what: &str) -> Result<usize> {
    let n = pop_num(stack)?;
    usize::try_from(&n)
        .ok()
        .filter(|n| *n <= 20)
        .ok_or_else(|| ValidationError::Script(format!("bad {what} for checkmultisig")))
}

pub type OpFn = fn(&mut Stack) -> Result<()>;

/// Looks up a stack-only opcode. Opcodes that need the signature digest
/// or control flow are handled by the script evaluator directly.
pub fn dispatch(opcode: u8) -> Option<OpFn> {
    match opcode {
        OP_0 => Some(op_0),
        OP_1NEGATE => Some(op_1negate),
        OP_NOP => Some(op_nop),
        OP_VERIFY => Some(op_verify),
        OP_RETURN => Some(op_return),
        OP_2DROP => Some(op_2drop),
        OP_2DUP => Some(op_2dup),
        OP_IFDUP => Some(op_ifdup),
        OP_DEPTH => Some(op_depth),
        OP_DROP => Some(op_drop),
        OP_DUP => Some(op_dup),
        OP_PICK => Some(op_pick),
        OP_SWAP => Some(op_swap),
        OP_SIZE => Some(op_size),
        OP_EQUAL => Some(op_equal),
        OP_EQUALVERIFY => Some(op_equalverify),
        OP_NOT => Some(op_not),
        OP_ADD => Some(op_add),
        OP_MUL => Some(op_mul),
        OP_MIN => Some(op_min),
        OP_MAX => Some(op_max),
        OP_WITHIN => Some(op_within),
        OP_SHA1 => Some(op_sha1),
        OP_HASH160 => Some(op_hash160),
        OP_HASH256 => Some(op_hash256),
        _ => None,
    }
}

/// Executes OP_1 through OP_16 by pushing the literal small number.
pub fn op_small_number(stack: &mut Stack, opcode: u8) -> Result<()> {
    debug_assert!((OP_1..=OP_16).contains(&opcode));
    push_small(stack, opcode - OP_1 + 1)
}
