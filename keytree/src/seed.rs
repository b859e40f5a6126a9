use core::fmt;

use bip39::Mnemonic;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::errors::KeytreeError;

/// Root entropy of a wallet. Every key the wallet uses is derived from it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Entropy length for a 12-word phrase.
    pub const SHORT_LEN: usize = 16;

    /// Entropy length for a 24-word phrase.
    pub const LONG_LEN: usize = 32;

    /// Generates fresh entropy of `len` bytes (16 or 32).
    pub fn random<T: RngCore + CryptoRng>(mut rng: T, len: usize) -> Result<Self, KeytreeError> {
        if len != Self::SHORT_LEN && len != Self::LONG_LEN {
            return Err(KeytreeError::InvalidSeedLength(len));
        }
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        Ok(Seed(bytes))
    }

    /// Wraps raw entropy, checking that BIP-39 can encode it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeytreeError> {
        match bytes.len() {
            16 | 20 | 24 | 28 | 32 => Ok(Seed(bytes.to_vec())),
            n => Err(KeytreeError::InvalidSeedLength(n)),
        }
    }

    /// Recovers the entropy encoded by a BIP-39 English phrase.
    /// Surrounding and repeated whitespace and letter case are ignored.
    pub fn from_mnemonic(phrase: &str) -> Result<Self, KeytreeError> {
        let normalized = phrase
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let mnemonic = Mnemonic::parse_normalized(&normalized)
            .map_err(|e| KeytreeError::InvalidMnemonic(e.to_string()))?;
        let (entropy, len) = mnemonic.to_entropy_array();
        Self::from_bytes(&entropy[..len])
    }

    /// Encodes the entropy as a BIP-39 English phrase.
    pub fn to_mnemonic(&self) -> Result<String, KeytreeError> {
        Mnemonic::from_entropy(&self.0)
            .map(|m| m.to_string())
            .map_err(|e| KeytreeError::InvalidMnemonic(e.to_string()))
    }

    /// Returns the raw entropy.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed(<{} bytes>)", self.0.len())
    }
}
