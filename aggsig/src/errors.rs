use thiserror::Error;

/// Represents an error in nonce/key aggregation, signing, or verification.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum AggsigError {
    /// This error occurs when a point is not a valid compressed Ristretto point
    #[error("Point decoding failed")]
    InvalidPoint,

    /// This error occurs when a partial signature fails to verify
    #[error("Partial signature of key {pubkey:?} failed to verify")]
    ShareError {
        /// The pubkey corresponding to the share that failed to verify
        pubkey: [u8; 32],
    },

    /// This error occurs when an aggregated or single signature fails to verify
    #[error("Signature verification failed")]
    InvalidSignature,

    /// This error occurs when a function is called with bad arguments.
    #[error("Bad arguments")]
    BadArguments,
}
