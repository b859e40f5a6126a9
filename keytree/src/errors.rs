use thiserror::Error;

/// Represents an error in seed handling or key derivation.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum KeytreeError {
    /// This error occurs when the seed entropy has a length BIP-39 cannot encode.
    #[error("Invalid seed length: {0} bytes")]
    InvalidSeedLength(usize),

    /// This error occurs when a recovery phrase fails to parse or its checksum is wrong.
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// This error occurs when the derivation index space is used up.
    #[error("Derivation index {0} is beyond the key space")]
    KeyExhausted(u64),
}
