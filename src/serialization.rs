//! Serde helpers for field types that are not wrapped in a crate type.

/// Canonical scalars as hex (human-readable formats) or 32 raw bytes.
pub mod scalar {
    use aggsig::serialization::bytes32;
    use curve25519_dalek::scalar::Scalar;
    use serde::{de, Deserializer, Serializer};

    /// Serializes the scalar's canonical encoding.
    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes32::serialize(scalar.as_bytes(), serializer)
    }

    /// Inverse of [`serialize`]; rejects non-canonical encodings.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf = bytes32::deserialize(deserializer)?;
        Scalar::from_canonical_bytes(buf).ok_or_else(|| de::Error::custom("non-canonical scalar"))
    }
}
