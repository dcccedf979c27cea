//! End-to-end signing and verification against an in-memory UTXO set

use num_bigint::BigInt;
use spendcheck::constants::{COINBASE_PREV_INDEX, SEQUENCE_FINAL, SIGHASH_ALL};
use spendcheck::fetcher::{StaticSource, TxFetcher};
use spendcheck::hashes::hash160;
use spendcheck::op::{Instruction, OP_1, OP_CHECKMULTISIG};
use spendcheck::{PrivateKey, Script, Tx, TxInput, TxOutput, ValidationError};

fn key(secret: u64) -> PrivateKey {
    PrivateKey::new(BigInt::from(secret)).unwrap()
}

/// A coinbase-style transaction paying `amount` to `lock`; it only
/// exists to give the spend under test something to reference.
fn funding_tx(amount: u64, lock: Script) -> Tx {
    let input = TxInput::new(
        [0u8; 32],
        COINBASE_PREV_INDEX,
        Script::new(vec![Instruction::Data(vec![0x01])]),
        SEQUENCE_FINAL,
    );
    Tx::new(1, vec![input], vec![TxOutput::new(amount, lock)], 0)
}

fn fetcher_with(funding: &Tx) -> TxFetcher<StaticSource> {
    let mut source = StaticSource::new();
    source.insert_raw(&funding.id().unwrap(), funding.serialize().unwrap());
    TxFetcher::new(source)
}

fn spend_of(funding: &Tx, script_sig: Script, amount: u64, to: Script) -> Tx {
    let input = TxInput::new(funding.hash().unwrap(), 0, script_sig, SEQUENCE_FINAL);
    Tx::new(1, vec![input], vec![TxOutput::new(amount, to)], 0)
}

fn sighash_signature(key: &PrivateKey, z: &BigInt) -> Vec<u8> {
    let mut der = key.sign(z).unwrap().der();
    der.push(SIGHASH_ALL as u8);
    der
}

#[test]
fn p2pkh_sign_and_verify() {
    let owner = key(8675309);
    let pubkey_hash = owner.point().hash160(true).unwrap();
    let funding = funding_tx(100_000, Script::p2pkh_script(&pubkey_hash));
    let mut fetcher = fetcher_with(&funding);

    let mut spend =
        spend_of(&funding, Script::default(), 99_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.sign_input(0, &owner, &mut fetcher).unwrap());
    assert!(spend.verify(&mut fetcher).unwrap());
    assert_eq!(spend.fee(&mut fetcher).unwrap(), 1_000);
}

#[test]
fn p2pkh_wrong_key_does_not_verify() {
    let owner = key(8675309);
    let thief = key(4111111111);
    let pubkey_hash = owner.point().hash160(true).unwrap();
    let funding = funding_tx(100_000, Script::p2pkh_script(&pubkey_hash));
    let mut fetcher = fetcher_with(&funding);

    let mut spend =
        spend_of(&funding, Script::default(), 99_000, Script::p2pkh_script(&[0x44; 20]));
    // Signing with a key whose hash does not match the lock fails the
    // self-check with a script error from EQUALVERIFY.
    assert!(spend.sign_input(0, &thief, &mut fetcher).is_err());
}

#[test]
fn tampered_output_invalidates_signature() {
    let owner = key(8675309);
    let pubkey_hash = owner.point().hash160(true).unwrap();
    let funding = funding_tx(100_000, Script::p2pkh_script(&pubkey_hash));
    let mut fetcher = fetcher_with(&funding);

    let mut spend =
        spend_of(&funding, Script::default(), 99_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.sign_input(0, &owner, &mut fetcher).unwrap());

    // Redirect the payment after signing: the committed digest changes
    // and the signature no longer checks out.
    let tampered = Tx::new(
        spend.version(),
        spend.inputs().to_vec(),
        vec![TxOutput::new(99_000, Script::p2pkh_script(&[0x55; 20]))],
        spend.lock_time(),
    );
    assert!(!tampered.verify_input(0, &mut fetcher).unwrap());
}

#[test]
fn outputs_exceeding_inputs_rejected() {
    let owner = key(8675309);
    let pubkey_hash = owner.point().hash160(true).unwrap();
    let funding = funding_tx(1_000, Script::p2pkh_script(&pubkey_hash));
    let mut fetcher = fetcher_with(&funding);

    let mut spend =
        spend_of(&funding, Script::default(), 2_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.sign_input(0, &owner, &mut fetcher).unwrap());
    assert_eq!(spend.fee(&mut fetcher).unwrap(), -1_000);
    assert!(matches!(
        spend.verify(&mut fetcher),
        Err(ValidationError::Consensus(_))
    ));
}

fn multisig_script(keys: &[&PrivateKey]) -> Script {
    let count = Instruction::Opcode(OP_1 + keys.len() as u8 - 1);
    let mut instructions = vec![count.clone()];
    for key in keys {
        instructions.push(Instruction::Data(key.sec_compressed().unwrap()));
    }
    instructions.push(count);
    instructions.push(Instruction::Opcode(OP_CHECKMULTISIG));
    Script::new(instructions)
}

#[test]
fn p2sh_two_of_two_multisig() {
    let alice = key(111_111);
    let bob = key(222_222);
    let redeem = multisig_script(&[&alice, &bob]);
    let redeem_bytes = redeem.raw_serialize().unwrap();

    let funding = funding_tx(50_000, Script::p2sh_script(&hash160(&redeem_bytes)));
    let mut fetcher = fetcher_with(&funding);

    // Compute the digest the redeem script commits to, then install the
    // witness: dummy, both signatures, and the redeem script itself.
    let unsigned =
        spend_of(&funding, Script::default(), 49_000, Script::p2pkh_script(&[0x44; 20]));
    let z = unsigned.signature_hash(0, Some(&redeem), &mut fetcher).unwrap();

    let script_sig = Script::new(vec![
        Instruction::Data(Vec::new()),
        Instruction::Data(sighash_signature(&alice, &z)),
        Instruction::Data(sighash_signature(&bob, &z)),
        Instruction::Data(redeem_bytes),
    ]);
    let spend = spend_of(&funding, script_sig, 49_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.verify(&mut fetcher).unwrap());
}

#[test]
fn p2sh_missing_signature_fails() {
    let alice = key(111_111);
    let bob = key(222_222);
    let redeem = multisig_script(&[&alice, &bob]);
    let redeem_bytes = redeem.raw_serialize().unwrap();

    let funding = funding_tx(50_000, Script::p2sh_script(&hash160(&redeem_bytes)));
    let mut fetcher = fetcher_with(&funding);

    let unsigned =
        spend_of(&funding, Script::default(), 49_000, Script::p2pkh_script(&[0x44; 20]));
    let z = unsigned.signature_hash(0, Some(&redeem), &mut fetcher).unwrap();

    // Alice signs twice instead of alice and bob.
    let script_sig = Script::new(vec![
        Instruction::Data(Vec::new()),
        Instruction::Data(sighash_signature(&alice, &z)),
        Instruction::Data(sighash_signature(&alice, &z)),
        Instruction::Data(redeem_bytes),
    ]);
    let spend = spend_of(&funding, script_sig, 49_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(!spend.verify(&mut fetcher).unwrap());
}

#[test]
fn p2sh_wrong_redeem_script_is_an_error() {
    let alice = key(111_111);
    let redeem = multisig_script(&[&alice]);
    let redeem_bytes = redeem.raw_serialize().unwrap();

    // Locked to a hash the supplied redeem script does not match.
    let funding = funding_tx(50_000, Script::p2sh_script(&[0x77; 20]));
    let mut fetcher = fetcher_with(&funding);

    let unsigned =
        spend_of(&funding, Script::default(), 49_000, Script::p2pkh_script(&[0x44; 20]));
    let z = unsigned.signature_hash(0, Some(&redeem), &mut fetcher).unwrap();

    let script_sig = Script::new(vec![
        Instruction::Data(Vec::new()),
        Instruction::Data(sighash_signature(&alice, &z)),
        Instruction::Data(redeem_bytes),
    ]);
    let spend = spend_of(&funding, script_sig, 49_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.verify_input(0, &mut fetcher).is_err());
}

#[test]
fn bare_multisig_verifies() {
    let alice = key(333_333);
    let bob = key(444_444);
    let lock = multisig_script(&[&alice, &bob]);

    let funding = funding_tx(10_000, lock);
    let mut fetcher = fetcher_with(&funding);

    let unsigned =
        spend_of(&funding, Script::default(), 9_000, Script::p2pkh_script(&[0x44; 20]));
    let z = unsigned.signature_hash(0, None, &mut fetcher).unwrap();

    let script_sig = Script::new(vec![
        Instruction::Data(Vec::new()),
        Instruction::Data(sighash_signature(&alice, &z)),
        Instruction::Data(sighash_signature(&bob, &z)),
    ]);
    let spend = spend_of(&funding, script_sig, 9_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.verify(&mut fetcher).unwrap());
}

#[test]
fn transactions_survive_json_round_trip() {
    let owner = key(8675309);
    let pubkey_hash = owner.point().hash160(true).unwrap();
    let funding = funding_tx(100_000, Script::p2pkh_script(&pubkey_hash));
    let mut fetcher = fetcher_with(&funding);

    let mut spend =
        spend_of(&funding, Script::default(), 99_000, Script::p2pkh_script(&[0x44; 20]));
    assert!(spend.sign_input(0, &owner, &mut fetcher).unwrap());

    let json = serde_json::to_string(&spend).unwrap();
    let decoded: Tx = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, spend);
    assert!(decoded.verify(&mut fetcher).unwrap());
}
