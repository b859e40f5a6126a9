use super::signature::check_equation;
use super::{AggsigError, KernelContext, PartialSignature, VerificationKey};

/// The public side of another participant: its public nonce and public excess.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Counterparty {
    /// Public nonce `R_i`
    pub public_nonce: VerificationKey,
    /// Public excess `X_i`
    pub public_excess: VerificationKey,
}

impl Counterparty {
    /// Creates a counterparty from its published nonce and excess.
    pub fn new(public_nonce: VerificationKey, public_excess: VerificationKey) -> Self {
        Counterparty {
            public_nonce,
            public_excess,
        }
    }

    /// Verifies the counterparty's partial signature: `s_i·G == R_i + c·X_i`.
    pub fn verify_share(
        &self,
        share: &PartialSignature,
        context: &KernelContext,
    ) -> Result<(), AggsigError> {
        let X_i = self.public_excess.to_point()?;
        check_equation(
            &share.0,
            self.public_nonce.as_compressed(),
            &context.challenge(),
            &X_i,
        )
        .map_err(|_| AggsigError::ShareError {
            pubkey: *self.public_excess.as_bytes(),
        })
    }
}
