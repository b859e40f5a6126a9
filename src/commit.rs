//! Pedersen commitments and rewindable output proofs.
//!
//! A commitment to `value` with blinding factor `r` is `value·H + r·G`, where `G` is the
//! Ristretto basepoint and `H` is a second generator with no known discrete log relative
//! to `G`.
//!
//! Every output carries a 48-byte proof: the value and derivation index encrypted under a
//! key only the owner's keychain can produce, followed by an authentication tag. Rewinding
//! the proof and recomputing the commitment from the derived blinding factor is how a
//! wallet recognizes its outputs on chain.

use aggsig::serialization::{bytes, bytes32};
use byteorder::{ByteOrder, LittleEndian};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use keytree::{DerivationIndex, Keychain};
use merlin::Transcript;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::errors::{WalletError, WalletResult};

/// Value generator `H`.
pub static VALUE_GENERATOR: Lazy<RistrettoPoint> = Lazy::new(|| {
    let mut t = Transcript::new(b"Slatewallet.generators");
    let mut buf = [0u8; 64];
    t.challenge_bytes(b"H", &mut buf);
    RistrettoPoint::from_uniform_bytes(&buf)
});

/// Computes `value·H + blinding·G`.
pub fn commit(value: u64, blinding: &Scalar) -> RistrettoPoint {
    Scalar::from(value) * *VALUE_GENERATOR + blinding * RISTRETTO_BASEPOINT_POINT
}

/// Compressed Pedersen commitment.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "bytes32")] pub [u8; 32]);

impl Commitment {
    /// Commits to `value` with `blinding`.
    pub fn new(value: u64, blinding: &Scalar) -> Self {
        commit(value, blinding).into()
    }

    /// Decompresses the commitment.
    pub fn to_point(&self) -> WalletResult<RistrettoPoint> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or_else(|| WalletError::malformed(format!("invalid commitment {}", self)))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<RistrettoPoint> for Commitment {
    fn from(p: RistrettoPoint) -> Self {
        Commitment(p.compress().to_bytes())
    }
}

impl core::fmt::Display for Commitment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl core::fmt::Debug for Commitment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Commitment({})", hex::encode(&self.0[..8]))
    }
}

/// Encrypted `(value, derivation index)` of an output, openable by the owner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputProof(#[serde(with = "bytes")] Vec<u8>);

impl OutputProof {
    /// Length of a well-formed proof.
    pub const LEN: usize = 48;

    /// Seals `value` and `index` for the holder of `rewind_key`.
    pub fn create(
        rewind_key: &[u8; 32],
        commitment: &Commitment,
        value: u64,
        index: DerivationIndex,
    ) -> Self {
        let mut plaintext = [0u8; 16];
        LittleEndian::write_u64(&mut plaintext[..8], value);
        LittleEndian::write_u64(&mut plaintext[8..], index);

        let mut bytes = Vec::with_capacity(Self::LEN);
        let pad = keystream(rewind_key, commitment);
        bytes.extend(plaintext.iter().zip(pad.iter()).map(|(p, k)| p ^ k));
        bytes.extend_from_slice(&tag(rewind_key, commitment, &plaintext));
        OutputProof(bytes)
    }

    /// Opens the proof. Returns `None` unless it was sealed under `rewind_key` for this
    /// exact commitment.
    pub fn rewind(
        &self,
        rewind_key: &[u8; 32],
        commitment: &Commitment,
    ) -> Option<(u64, DerivationIndex)> {
        if self.0.len() != Self::LEN {
            return None;
        }
        let pad = keystream(rewind_key, commitment);
        let mut plaintext = [0u8; 16];
        for (i, b) in plaintext.iter_mut().enumerate() {
            *b = self.0[i] ^ pad[i];
        }
        let expected = tag(rewind_key, commitment, &plaintext);
        if !bool::from(expected[..].ct_eq(&self.0[16..])) {
            return None;
        }
        Some((
            LittleEndian::read_u64(&plaintext[..8]),
            LittleEndian::read_u64(&plaintext[8..]),
        ))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for OutputProof {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OutputProof({} bytes)", self.0.len())
    }
}

fn proof_transcript(rewind_key: &[u8; 32], commitment: &Commitment) -> Transcript {
    let mut t = Transcript::new(b"Slatewallet.output-proof");
    t.append_message(b"rewind_key", rewind_key);
    t.append_message(b"commitment", commitment.as_bytes());
    t
}

fn keystream(rewind_key: &[u8; 32], commitment: &Commitment) -> [u8; 16] {
    let mut pad = [0u8; 16];
    proof_transcript(rewind_key, commitment).challenge_bytes(b"pad", &mut pad);
    pad
}

fn tag(rewind_key: &[u8; 32], commitment: &Commitment, plaintext: &[u8; 16]) -> [u8; 32] {
    let mut t = proof_transcript(rewind_key, commitment);
    t.append_message(b"plaintext", plaintext);
    let mut tag = [0u8; 32];
    t.challenge_bytes(b"tag", &mut tag);
    tag
}

/// Builds the commitment and proof of an output of `value` owned by the key at `index`.
pub fn build_output(
    keychain: &Keychain,
    index: DerivationIndex,
    value: u64,
) -> WalletResult<(Commitment, OutputProof)> {
    let key = keychain.derive(index)?;
    let commitment = Commitment::new(value, &key.blinding);
    let proof = OutputProof::create(keychain.rewind_key(), &commitment, value, index);
    Ok((commitment, proof))
}

/// Recognizes an output as ours: the proof must open under our rewind key and the
/// commitment must be reproducible from the key at the recovered index.
pub fn recover_output(
    keychain: &Keychain,
    commitment: &Commitment,
    proof: &OutputProof,
) -> Option<(u64, DerivationIndex)> {
    let (value, index) = proof.rewind(keychain.rewind_key(), commitment)?;
    let key = keychain.derive(index).ok()?;
    if Commitment::new(value, &key.blinding) == *commitment {
        Some((value, index))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keytree::Seed;

    fn keychain(byte: u8) -> Keychain {
        Keychain::from_seed(&Seed::from_bytes(&[byte; 32]).unwrap())
    }

    #[test]
    fn commitments_are_homomorphic() {
        let r1 = Scalar::from(11u64);
        let r2 = Scalar::from(22u64);
        let sum = commit(5, &r1) + commit(7, &r2);
        assert_eq!(Commitment::from(sum), Commitment::new(12, &(r1 + r2)));
    }

    #[test]
    fn owner_recovers_output() {
        let kc = keychain(1);
        let (commitment, proof) = build_output(&kc, 42, 1_000_000).unwrap();
        assert_eq!(proof.as_bytes().len(), OutputProof::LEN);
        assert_eq!(recover_output(&kc, &commitment, &proof), Some((1_000_000, 42)));
    }

    #[test]
    fn stranger_cannot_rewind() {
        let owner = keychain(1);
        let stranger = keychain(2);
        let (commitment, proof) = build_output(&owner, 3, 500).unwrap();
        assert_eq!(proof.rewind(stranger.rewind_key(), &commitment), None);
        assert_eq!(recover_output(&stranger, &commitment, &proof), None);
    }

    #[test]
    fn proof_bound_to_commitment() {
        let kc = keychain(1);
        let (_, proof) = build_output(&kc, 3, 500).unwrap();
        let (other, _) = build_output(&kc, 4, 500).unwrap();
        assert_eq!(recover_output(&kc, &other, &proof), None);
    }

    #[test]
    fn truncated_proof_rejected() {
        let kc = keychain(1);
        let (commitment, proof) = build_output(&kc, 3, 500).unwrap();
        let short = OutputProof(proof.as_bytes()[..40].to_vec());
        assert_eq!(short.rewind(kc.rewind_key(), &commitment), None);
    }
}
