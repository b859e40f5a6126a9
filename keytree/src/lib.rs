#![deny(missing_docs)]
//! Deterministic key tree for a Mimblewimble wallet.
//!
//! A BIP-39 [`Seed`] produces a root extended private key [`Xprv`]. Output blinding
//! keys are leaves of the tree addressed by a monotonically assigned derivation index,
//! so the whole wallet can be re-created from the recovery phrase alone.

use crate::transcript::TranscriptProtocol;
use curve25519_dalek::constants;
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

mod errors;
mod seed;
mod transcript;


pub use self::errors::KeytreeError;
pub use self::seed::Seed;

/// Position of a key in the wallet's key space.
pub type DerivationIndex = u64;

/// Highest derivation index a wallet may assign.
pub const MAX_DERIVATION_INDEX: DerivationIndex = u32::MAX as DerivationIndex;

/// Xprv represents an extended private key.
#[derive(Clone)]
pub struct Xprv {
    scalar: Scalar,
    dk: [u8; 32],
    precompressed_pubkey: CompressedRistretto,
}

impl Xprv {
    /// Returns the root Xprv for the given seed.
    pub fn from_seed(seed: &Seed) -> Self {
        let mut t = Transcript::new(b"Keytree.seed");
        t.append_message(b"seed", seed.as_bytes());

        let scalar = t.challenge_scalar(b"scalar");
        let mut dk = [0u8; 32];
        t.challenge_bytes(b"dk", &mut dk);

        Self::from_parts(scalar, dk)
    }

    fn from_parts(scalar: Scalar, dk: [u8; 32]) -> Self {
        let precompressed_pubkey = (scalar * &constants::RISTRETTO_BASEPOINT_POINT).compress();
        Xprv {
            scalar,
            dk,
            precompressed_pubkey,
        }
    }

    /// Returns the public key of this node.
    pub fn public_key(&self) -> CompressedRistretto {
        self.precompressed_pubkey
    }

    /// Returns an intermediate child key. Users must provide customize, in order to separate
    /// sibling keys from one another through unique derivation paths.
    pub fn derive_intermediate_key(&self, customize: impl FnOnce(&mut Transcript)) -> Xprv {
        let mut t = self.prepare_prf();
        customize(&mut t);

        let f = t.challenge_scalar(b"f.intermediate");
        let mut child_dk = [0u8; 32];
        t.challenge_bytes(b"dk", &mut child_dk);

        Self::from_parts(self.scalar + f, child_dk)
    }

    /// Returns a leaf private key. Leaves cannot derive further keys.
    pub fn derive_key(&self, customize: impl FnOnce(&mut Transcript)) -> Scalar {
        let mut t = self.prepare_prf();
        customize(&mut t);

        let f = t.challenge_scalar(b"f.leaf");
        self.scalar + f
    }

    fn prepare_prf(&self) -> Transcript {
        let mut t = Transcript::new(b"Keytree.derivation");
        t.commit_point(b"pt", &self.precompressed_pubkey);
        t.append_message(b"dk", &self.dk);
        t
    }

    /// Serializes this Xprv to a sequence of bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&self.scalar.to_bytes());
        buf[32..].copy_from_slice(&self.dk);
        buf
    }

    /// Decodes an Xprv from a 64-byte array, and fails if the provided array is not
    /// exactly 64 bytes or the scalar is not canonical.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 64 {
            return None;
        }

        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&bytes[..32]);
        let scalar = Scalar::from_canonical_bytes(scalar_bytes)?;
        let mut dk = [0u8; 32];
        dk.copy_from_slice(&bytes[32..]);

        Some(Self::from_parts(scalar, dk))
    }
}

/// Secret key material at a given derivation index.
#[derive(Clone, Debug)]
pub struct KeyMaterial {
    /// Index the key was derived at.
    pub index: DerivationIndex,
    /// Blinding factor for the output owned by this key.
    pub blinding: Scalar,
}

/// Derives all key material of one wallet. Stateless apart from the seed.
#[derive(Clone)]
pub struct Keychain {
    blinding_root: Xprv,
    rewind_key: [u8; 32],
}

impl Keychain {
    /// Builds the keychain for a seed.
    pub fn from_seed(seed: &Seed) -> Self {
        let root = Xprv::from_seed(seed);
        let blinding_root = root.derive_intermediate_key(|t| {
            t.append_message(b"purpose", b"output-blinding");
        });

        // The rewind key is bound to the public half of the root, so output proofs can be
        // opened without touching the spending keys.
        let mut t = Transcript::new(b"Keytree.rewind");
        t.commit_point(b"root", &root.public_key());
        t.append_message(b"dk", &root.dk);
        let mut rewind_key = [0u8; 32];
        t.challenge_bytes(b"rewind_key", &mut rewind_key);

        Keychain {
            blinding_root,
            rewind_key,
        }
    }

    /// Derives the key material at `index`. Pure and deterministic for a fixed seed.
    pub fn derive(&self, index: DerivationIndex) -> Result<KeyMaterial, KeytreeError> {
        if index > MAX_DERIVATION_INDEX {
            return Err(KeytreeError::KeyExhausted(index));
        }
        let blinding = self
            .blinding_root
            .derive_key(|t| t.commit_u64(b"index", index));
        Ok(KeyMaterial { index, blinding })
    }

    /// Symmetric key used to open output proofs created by this wallet.
    pub fn rewind_key(&self) -> &[u8; 32] {
        &self.rewind_key
    }
}
