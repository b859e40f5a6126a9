//! Defines a `TranscriptProtocol` trait for using a Merlin transcript.
use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

/// Extension trait to the Merlin transcript API that allows committing scalars and points and
/// generating challenges as scalars.
pub trait TranscriptProtocol {
    /// Commit a domain separator for the aggregated kernel signature.
    fn aggsig_domain_sep(&mut self);
    /// Commit a domain separator for a single-key message signature.
    fn message_sig_domain_sep(&mut self);
    /// Commit a `point` with the given `label`.
    fn append_point(&mut self, label: &'static [u8], point: &CompressedRistretto);
    /// Compute a `label`ed challenge variable.
    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
}

impl TranscriptProtocol for Transcript {
    fn aggsig_domain_sep(&mut self) {
        self.append_message(b"dom-sep", b"aggsig kernel v1");
    }

    fn message_sig_domain_sep(&mut self) {
        self.append_message(b"dom-sep", b"aggsig message v1");
    }

    fn append_point(&mut self, label: &'static [u8], point: &CompressedRistretto) {
        self.append_message(label, point.as_bytes());
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut buf = [0u8; 64];
        self.challenge_bytes(label, &mut buf);
        Scalar::from_bytes_mod_order_wide(&buf)
    }
}
