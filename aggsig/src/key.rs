use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;

use super::errors::AggsigError;

/// Public half of an excess or a nonce, `x·G`, kept compressed as it travels in slates.
/// Decompression happens only where the point enters an equation.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct VerificationKey {
    point: CompressedRistretto,
}

impl VerificationKey {
    /// `x·G` for the secret `x`.
    pub fn from_secret(x: &Scalar) -> Self {
        (x * RISTRETTO_BASEPOINT_POINT).into()
    }

    /// Compressed encoding, as fed to transcripts.
    pub fn as_compressed(&self) -> &CompressedRistretto {
        &self.point
    }

    /// Raw 32-byte encoding.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.point.as_bytes()
    }

    /// Decompresses the point, failing on an invalid encoding.
    pub fn to_point(&self) -> Result<RistrettoPoint, AggsigError> {
        self.point.decompress().ok_or(AggsigError::InvalidPoint)
    }

    /// `ΣX_i` over a non-empty list of keys.
    pub fn sum<'a>(
        keys: impl IntoIterator<Item = &'a VerificationKey>,
    ) -> Result<VerificationKey, AggsigError> {
        let mut keys = keys.into_iter().peekable();
        if keys.peek().is_none() {
            return Err(AggsigError::BadArguments);
        }
        let mut total = RistrettoPoint::default();
        for key in keys {
            total += key.to_point()?;
        }
        Ok(total.into())
    }
}

impl From<RistrettoPoint> for VerificationKey {
    fn from(p: RistrettoPoint) -> Self {
        VerificationKey {
            point: p.compress(),
        }
    }
}

impl From<CompressedRistretto> for VerificationKey {
    fn from(point: CompressedRistretto) -> Self {
        VerificationKey { point }
    }
}
