use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use super::{AggsigError, TranscriptProtocol, VerificationKey};

/// Public kernel data every participant signs over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KernelMessage {
    /// Fee paid by the transaction.
    pub fee: u64,
    /// Height before which the kernel is not valid (0 for none).
    pub lock_height: u64,
}

/// The signing context of one kernel: the message plus the aggregated public nonce and
/// the aggregated public excess. Both parties must build it from the participants in
/// the same (positional) order to arrive at the same challenge.
#[derive(Copy, Clone, Debug)]
pub struct KernelContext {
    message: KernelMessage,
    nonce_sum: VerificationKey,
    key_sum: VerificationKey,
}

impl KernelContext {
    /// Aggregates the participants' public nonces and public excesses.
    pub fn new(
        message: KernelMessage,
        public_nonces: &[VerificationKey],
        public_keys: &[VerificationKey],
    ) -> Result<Self, AggsigError> {
        if public_nonces.len() != public_keys.len() {
            return Err(AggsigError::BadArguments);
        }
        Ok(KernelContext {
            message,
            nonce_sum: VerificationKey::sum(public_nonces)?,
            key_sum: VerificationKey::sum(public_keys)?,
        })
    }

    /// Takes a mutable transcript, and commits the internal context to the transcript.
    pub fn commit(&self, transcript: &mut Transcript) {
        transcript.aggsig_domain_sep();
        transcript.append_u64(b"fee", self.message.fee);
        transcript.append_u64(b"lock_height", self.message.lock_height);
        transcript.append_point(b"R", self.nonce_sum.as_compressed());
        transcript.append_point(b"X", self.key_sum.as_compressed());
    }

    /// Returns the challenge `c = H(m, R, X)` shared by all participants.
    pub fn challenge(&self) -> Scalar {
        let mut t = Transcript::new(b"Aggsig.kernel");
        self.commit(&mut t);
        t.challenge_scalar(b"c")
    }

    /// Aggregated public nonce `R`.
    pub fn nonce_sum(&self) -> VerificationKey {
        self.nonce_sum
    }

    /// Aggregated public excess `X`, the kernel excess.
    pub fn key_sum(&self) -> VerificationKey {
        self.key_sum
    }

    /// Kernel message signed over.
    pub fn message(&self) -> KernelMessage {
        self.message
    }
}
