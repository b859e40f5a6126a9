#![deny(missing_docs)]
#![allow(non_snake_case)]
//! Aggregated Schnorr signatures for Mimblewimble transaction kernels.
//!
//! Each participant holds a secret excess `x_i` and a secret nonce `r_i`, publishes
//! `X_i = x_i·G` and `R_i = r_i·G`, and contributes a partial signature
//! `s_i = r_i + c·x_i` where `c = H(kernel message, ΣR_i, ΣX_i)`.
//! The partials add up to a plain Schnorr signature `(ΣR_i, Σs_i)` valid
//! for the aggregate excess `ΣX_i`.

mod context;
mod counterparty;
mod errors;
mod key;
pub mod serialization;
mod signature;
mod signer;
mod transcript;

#[cfg(test)]
mod tests;

pub use self::context::{KernelContext, KernelMessage};
pub use self::counterparty::Counterparty;
pub use self::errors::AggsigError;
pub use self::key::VerificationKey;
pub use self::signature::{PartialSignature, Signature};
pub use self::signer::Signer;
pub use self::transcript::TranscriptProtocol;
