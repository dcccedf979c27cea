//! Validation constants for the script engine and transaction layer

/// Maximum size of a single script instruction (push-data element)
pub const MAX_INSTRUCTION_SIZE: usize = 520;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum stack size during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Ceiling on instructions processed by one evaluation, including
/// instructions spliced in by P2SH redemption
pub const MAX_EVAL_INSTRUCTIONS: usize = 10_000;

/// Sighash type appended to every signature pre-image (SIGHASH_ALL)
pub const SIGHASH_ALL: u32 = 1;

/// Sequence number for a final input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Previous-output index that marks a coinbase input
pub const COINBASE_PREV_INDEX: u32 = 0xffffffff;

/// Base58Check version prefixes
pub const MAINNET_P2PKH_PREFIX: u8 = 0x00;
pub const TESTNET_P2PKH_PREFIX: u8 = 0x6f;
pub const MAINNET_P2SH_PREFIX: u8 = 0x05;
pub const TESTNET_P2SH_PREFIX: u8 = 0xc4;
pub const MAINNET_WIF_PREFIX: u8 = 0x80;
pub const TESTNET_WIF_PREFIX: u8 = 0xef;
