use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use subtle::ConstantTimeEq;

use super::{AggsigError, KernelContext, KernelMessage, TranscriptProtocol, VerificationKey};

/// A participant's share `s_i = r_i + c·x_i` of the kernel signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PartialSignature(pub Scalar);

/// A Schnorr signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Signature using nonce, message, and private key
    pub s: Scalar,
    /// Nonce commitment
    pub R: CompressedRistretto,
}

impl Signature {
    /// Adds up the partial signatures of all participants.
    /// The nonce commitment is the aggregated nonce of the context.
    pub fn aggregate(
        context: &KernelContext,
        shares: &[PartialSignature],
    ) -> Result<Signature, AggsigError> {
        if shares.is_empty() {
            return Err(AggsigError::BadArguments);
        }
        let s: Scalar = shares.iter().map(|share| share.0).sum();
        Ok(Signature {
            s,
            R: *context.nonce_sum().as_compressed(),
        })
    }

    /// Verifies the signature against the aggregated nonce and key of a kernel context.
    pub fn verify(&self, context: &KernelContext) -> Result<(), AggsigError> {
        if !bool::from(self.R.ct_eq(context.nonce_sum().as_compressed())) {
            return Err(AggsigError::InvalidSignature);
        }
        let X = context.key_sum().to_point()?;
        check_equation(&self.s, &self.R, &context.challenge(), &X)
    }

    /// Verifies a finished kernel signature given only the kernel message and excess.
    pub fn verify_kernel(
        &self,
        message: KernelMessage,
        excess: &VerificationKey,
    ) -> Result<(), AggsigError> {
        let context = KernelContext::new(message, &[VerificationKey::from(self.R)], &[*excess])?;
        self.verify(&context)
    }

    /// Creates a single-key signature over `message` under the domain `label`.
    pub fn sign_message(label: &'static [u8], message: &[u8], privkey: &Scalar) -> Signature {
        let X = VerificationKey::from_secret(privkey);
        let mut transcript = message_transcript(label, message, &X);

        let mut rng = transcript
            .build_rng()
            .rekey_with_witness_bytes(b"x", privkey.as_bytes())
            .finalize(&mut rand::thread_rng());
        let r = Scalar::random(&mut rng);
        let R = (r * RISTRETTO_BASEPOINT_POINT).compress();

        transcript.append_point(b"R", &R);
        let c = transcript.challenge_scalar(b"c");
        Signature { s: r + c * privkey, R }
    }

    /// Verifies a single-key signature created with [`Signature::sign_message`].
    pub fn verify_message(
        &self,
        label: &'static [u8],
        message: &[u8],
        pubkey: &VerificationKey,
    ) -> Result<(), AggsigError> {
        let mut transcript = message_transcript(label, message, pubkey);
        transcript.append_point(b"R", &self.R);
        let c = transcript.challenge_scalar(b"c");
        check_equation(&self.s, &self.R, &c, &pubkey.to_point()?)
    }

    /// Encodes the signature as 64 bytes: `R || s`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.R.as_bytes());
        buf[32..].copy_from_slice(self.s.as_bytes());
        buf
    }

    /// Decodes a signature from 64 bytes, rejecting non-canonical scalars.
    pub fn from_bytes(bytes: &[u8]) -> Result<Signature, AggsigError> {
        if bytes.len() != 64 {
            return Err(AggsigError::BadArguments);
        }
        let mut s = [0u8; 32];
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            R: CompressedRistretto::from_slice(&bytes[..32]),
            s: Scalar::from_canonical_bytes(s).ok_or(AggsigError::BadArguments)?,
        })
    }
}

impl PartialSignature {
    /// Decodes a partial signature from a canonical 32-byte scalar.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, AggsigError> {
        Scalar::from_canonical_bytes(bytes)
            .map(PartialSignature)
            .ok_or(AggsigError::BadArguments)
    }

    /// Canonical 32-byte encoding.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

/// Checks `s·G == R + c·X`.
pub(crate) fn check_equation(
    s: &Scalar,
    R: &CompressedRistretto,
    c: &Scalar,
    X: &RistrettoPoint,
) -> Result<(), AggsigError> {
    let expected = RistrettoPoint::vartime_double_scalar_mul_basepoint(&(-c), X, s).compress();
    if bool::from(expected.ct_eq(R)) {
        Ok(())
    } else {
        Err(AggsigError::InvalidSignature)
    }
}

fn message_transcript(label: &'static [u8], message: &[u8], pubkey: &VerificationKey) -> Transcript {
    let mut transcript = Transcript::new(b"Aggsig.message");
    transcript.message_sig_domain_sep();
    transcript.append_message(b"label", label);
    transcript.append_message(b"msg", message);
    transcript.append_point(b"X", pubkey.as_compressed());
    transcript
}
