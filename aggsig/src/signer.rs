use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use super::{KernelContext, PartialSignature, VerificationKey};

/// One participant's secret signing material: the excess `x_i` and the nonce `r_i`.
///
/// The sender keeps its signer across rounds (the receiver's reply may arrive
/// much later), so it can be rebuilt from the stored secrets with [`Signer::from_secrets`].
#[derive(Clone)]
pub struct Signer {
    x_i: Scalar,
    r_i: Scalar,
}

impl Signer {
    /// Creates a signer for secret excess `x_i`, generating a fresh nonce.
    pub fn new(x_i: Scalar) -> Self {
        let mut rng = Transcript::new(b"Aggsig.nonce")
            .build_rng()
            .commit_witness_bytes(b"x_i", x_i.as_bytes())
            .finalize(&mut rand::thread_rng());
        let r_i = Scalar::random(&mut rng);
        Signer { x_i, r_i }
    }

    /// Restores a signer from a previously generated excess and nonce.
    pub fn from_secrets(x_i: Scalar, r_i: Scalar) -> Self {
        Signer { x_i, r_i }
    }

    /// Public excess `X_i = x_i·G`.
    pub fn public_excess(&self) -> VerificationKey {
        VerificationKey::from_secret(&self.x_i)
    }

    /// Public nonce `R_i = r_i·G`.
    pub fn public_nonce(&self) -> VerificationKey {
        VerificationKey::from_secret(&self.r_i)
    }

    /// Secret excess.
    pub fn secret_excess(&self) -> &Scalar {
        &self.x_i
    }

    /// Secret nonce.
    pub fn secret_nonce(&self) -> &Scalar {
        &self.r_i
    }

    /// Computes the share `s_i = r_i + c·x_i` for the given context.
    pub fn sign(&self, context: &KernelContext) -> PartialSignature {
        PartialSignature(self.r_i + context.challenge() * self.x_i)
    }
}

impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer")
            .field("X_i", &self.public_excess())
            .field("R_i", &self.public_nonce())
            .finish()
    }
}
