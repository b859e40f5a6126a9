use aggsig::AggsigError;
use keytree::KeytreeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error returned by a wallet operation.
#[derive(Error, Debug)]
pub enum WalletError {
    /// Spendable outputs do not cover the amount plus fee.
    #[error("Not enough funds: needed {needed}, available {available}")]
    InsufficientFunds {
        /// Amount plus fee the selection had to cover.
        needed: u64,
        /// Spendable amount at the time of selection.
        available: u64,
    },

    /// The slate's amount or fee differs from what this party agreed to.
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch {
        /// Amount this party expected.
        expected: u64,
        /// Amount found in the slate.
        actual: u64,
    },

    /// The slate is structurally invalid for the requested round.
    #[error("Malformed slate: {0}")]
    MalformedSlate(String),

    /// A partial or aggregated kernel signature did not verify.
    #[error("Signature aggregation failed: {0}")]
    SignatureAggregationFailed(String),

    /// The requested transition is not allowed from the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No derivation indices left in the key space.
    #[error("Key space exhausted")]
    KeyExhausted,

    /// The chain node could not be reached or returned an error. Retryable.
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    /// Persisted wallet data could not be decoded.
    #[error("Storage corruption: {0}")]
    StorageCorruption(String),

    /// No wallet exists at the configured location.
    #[error("Wallet is not initialized")]
    WalletNotInitialized,

    /// A wallet already exists at the configured location.
    #[error("Wallet already exists")]
    WalletAlreadyExists,

    /// The password does not decrypt the seed.
    #[error("Invalid password")]
    InvalidPassword,

    /// The recovery phrase is not a valid BIP-39 mnemonic.
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// No transaction record matches the given id or slate id.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The slate could not be delivered to or answered by the counterparty.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::MalformedSlate(_) => "malformed_slate",
            Self::SignatureAggregationFailed(_) => "signature_aggregation_failed",
            Self::InvalidState(_) => "invalid_state",
            Self::KeyExhausted => "key_exhausted",
            Self::ChainUnavailable(_) => "chain_unavailable",
            Self::StorageCorruption(_) => "storage_corruption",
            Self::WalletNotInitialized => "wallet_not_initialized",
            Self::WalletAlreadyExists => "wallet_already_exists",
            Self::InvalidPassword => "invalid_password",
            Self::InvalidMnemonic(_) => "invalid_mnemonic",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::Config(_) => "config",
            Self::Transport(_) => "transport",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether the caller may retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainUnavailable(_) | Self::Transport(_))
    }

    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedSlate(msg.into())
    }

    pub(crate) fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn storage<S: Into<String>>(msg: S) -> Self {
        Self::StorageCorruption(msg.into())
    }
}

impl From<KeytreeError> for WalletError {
    fn from(e: KeytreeError) -> Self {
        match e {
            KeytreeError::KeyExhausted(_) => WalletError::KeyExhausted,
            KeytreeError::InvalidMnemonic(msg) => WalletError::InvalidMnemonic(msg),
            KeytreeError::InvalidSeedLength(n) => {
                WalletError::StorageCorruption(format!("seed has invalid length {}", n))
            }
        }
    }
}

impl From<AggsigError> for WalletError {
    fn from(e: AggsigError) -> Self {
        match e {
            AggsigError::InvalidPoint | AggsigError::BadArguments => {
                WalletError::MalformedSlate(e.to_string())
            }
            AggsigError::ShareError { .. } | AggsigError::InvalidSignature => {
                WalletError::SignatureAggregationFailed(e.to_string())
            }
        }
    }
}

/// Structured error handed to bridge callers and carried in foreign API replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Value of [`WalletError::code`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Payload of the error kind, enough to rebuild it on the other side of a transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ErrorDetail>,
}

/// Payload of an [`ErrorResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDetail {
    /// Description carried by the variant.
    Text(String),
    /// Expected (or needed) and actual (or available) amounts.
    Amounts {
        /// Expected or needed amount.
        expected: u64,
        /// Actual or available amount.
        actual: u64,
    },
}

impl From<&WalletError> for ErrorResponse {
    fn from(e: &WalletError) -> Self {
        use WalletError::*;
        let detail = match e {
            InsufficientFunds { needed, available } => Some(ErrorDetail::Amounts {
                expected: *needed,
                actual: *available,
            }),
            AmountMismatch { expected, actual } => Some(ErrorDetail::Amounts {
                expected: *expected,
                actual: *actual,
            }),
            MalformedSlate(s)
            | SignatureAggregationFailed(s)
            | InvalidState(s)
            | ChainUnavailable(s)
            | StorageCorruption(s)
            | InvalidMnemonic(s)
            | TransactionNotFound(s)
            | Config(s)
            | Transport(s) => Some(ErrorDetail::Text(s.clone())),
            KeyExhausted | WalletNotInitialized | WalletAlreadyExists | InvalidPassword => None,
            Io(_) | Serialization(_) => Some(ErrorDetail::Text(e.to_string())),
        };
        ErrorResponse {
            code: e.code().to_string(),
            message: e.to_string(),
            detail,
        }
    }
}

impl From<ErrorResponse> for WalletError {
    /// Rebuilds the error a counterparty reported. Codes without a faithful local
    /// variant (its own I/O or encoding failures) come back as `Transport`.
    fn from(r: ErrorResponse) -> Self {
        let text = match &r.detail {
            Some(ErrorDetail::Text(s)) => s.clone(),
            _ => r.message.clone(),
        };
        let amounts = match r.detail {
            Some(ErrorDetail::Amounts { expected, actual }) => Some((expected, actual)),
            _ => None,
        };
        match (r.code.as_str(), amounts) {
            ("insufficient_funds", Some((needed, available))) => {
                WalletError::InsufficientFunds { needed, available }
            }
            ("amount_mismatch", Some((expected, actual))) => {
                WalletError::AmountMismatch { expected, actual }
            }
            ("malformed_slate", _) => WalletError::MalformedSlate(text),
            ("signature_aggregation_failed", _) => WalletError::SignatureAggregationFailed(text),
            ("invalid_state", _) => WalletError::InvalidState(text),
            ("key_exhausted", _) => WalletError::KeyExhausted,
            ("chain_unavailable", _) => WalletError::ChainUnavailable(text),
            ("storage_corruption", _) => WalletError::StorageCorruption(text),
            ("wallet_not_initialized", _) => WalletError::WalletNotInitialized,
            ("wallet_already_exists", _) => WalletError::WalletAlreadyExists,
            ("invalid_password", _) => WalletError::InvalidPassword,
            ("invalid_mnemonic", _) => WalletError::InvalidMnemonic(text),
            ("transaction_not_found", _) => WalletError::TransactionNotFound(text),
            ("config", _) => WalletError::Config(text),
            _ => WalletError::Transport(format!("counterparty failed: {}", r.message)),
        }
    }
}

/// Result type of every wallet operation.
pub type WalletResult<T> = Result<T, WalletError>;
