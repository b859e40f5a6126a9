#![deny(missing_docs)]
//! Mimblewimble wallet engine.
//!
//! Two wallets build one transaction by passing a [`Slate`] back and forth: the sender
//! [creates](SlateNegotiator::create) it, the receiver [adds its output and partial
//! signature](SlateNegotiator::receive), and the sender [aggregates the kernel
//! signature](SlateNegotiator::finalize). Neither side learns the other's blinding factors.
//!
//! A wallet recovered from its phrase finds its outputs again by scanning the chain in
//! resumable batches ([`RestoreScanner`]), and keeps them in line with the chain on
//! every [`check`](Wallet::check) or [`refresh`](Wallet::refresh).
//!
//! [`Wallet`] owns all of it behind one lock.

pub mod chain;
mod commit;
mod config;
mod errors;
mod ledger;
pub mod logging;
mod negotiator;
mod output;
mod restore;
pub mod serialization;
mod slate;
mod state;
mod storage;
mod transaction;
pub mod transport;
mod wallet;

pub use self::chain::{ChainOutput, InMemoryChain, NodeClient, OutputListing};
pub use self::commit::{build_output, commit, recover_output, Commitment, OutputProof};
pub use self::config::{ChainType, WalletConfig};
pub use self::errors::{ErrorDetail, ErrorResponse, WalletError, WalletResult};
pub use self::ledger::{Direction, TransactionLedger, TransactionRecord, TxType};
pub use self::negotiator::{InitTxArgs, SenderContext, SlateNegotiator};
pub use self::output::{
    Balances, LockToken, Observation, OutputData, OutputSet, OutputStatus, Selection,
    SelectionParams, SelectionStrategy,
};
pub use self::restore::{BatchProgress, RecoveredOutput, RestoreScanner, ScanBatch};
pub use self::slate::{
    ParticipantData, Slate, SlateStatus, VersionCompatInfo, CURRENT_VERSION, SUPPORTED_VERSIONS,
};
pub use self::state::WalletState;
pub use self::storage::{EncryptedSeed, FileBackend, KdfParams, MemoryBackend, WalletBackend};
pub use self::transaction::{tx_fee, Input, Output, Transaction, TransactionBody, TxKernel};
pub use self::transport::{HttpTransport, LoopbackTransport, SlateTransport};
pub use self::wallet::{Wallet, WalletInfo};
