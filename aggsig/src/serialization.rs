//! Serde support: keys, partial signatures and signatures are hex strings in
//! human-readable formats (slates are JSON) and raw bytes otherwise (wallet state is bincode).
//!
//! The [`bytes`] and [`bytes32`] modules are usable with `#[serde(with = "...")]`.

use curve25519_dalek::ristretto::CompressedRistretto;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use super::{PartialSignature, Signature, VerificationKey};

struct BytesVisitor;

impl<'de> Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, formatter: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
        formatter.write_str("a hex string or a byte array")
    }

    fn visit_str<E>(self, v: &str) -> Result<Vec<u8>, E>
    where
        E: de::Error,
    {
        hex::decode(v).map_err(E::custom)
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Vec<u8>, E>
    where
        E: de::Error,
    {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Vec<u8>, E>
    where
        E: de::Error,
    {
        Ok(v)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Vec<u8>, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            out.push(b);
        }
        Ok(out)
    }
}

/// Variable-length byte strings.
pub mod bytes {
    use super::*;

    /// Serializes as hex for human-readable formats, raw bytes otherwise.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    /// Inverse of [`serialize`].
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(BytesVisitor)
        } else {
            deserializer.deserialize_byte_buf(BytesVisitor)
        }
    }
}

/// Fixed 32-byte strings.
pub mod bytes32 {
    use super::*;

    /// Serializes as hex for human-readable formats, raw bytes otherwise.
    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::bytes::serialize(&bytes[..], serializer)
    }

    /// Inverse of [`serialize`], failing on any length other than 32.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = super::bytes::deserialize(deserializer)?;
        if v.len() != 32 {
            return Err(de::Error::invalid_length(v.len(), &"32 bytes"));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&v);
        Ok(buf)
    }
}

impl Serialize for VerificationKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes32::serialize(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for VerificationKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf = bytes32::deserialize(deserializer)?;
        Ok(VerificationKey::from(CompressedRistretto(buf)))
    }
}

impl Serialize for PartialSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes32::serialize(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PartialSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf = bytes32::deserialize(deserializer)?;
        PartialSignature::from_bytes(buf).map_err(de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes::serialize(&self.to_bytes()[..], serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = bytes::deserialize(deserializer)?;
        Signature::from_bytes(&v).map_err(de::Error::custom)
    }
}
