//! Durable log of the wallet's transactions.

use aggsig::VerificationKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};
use crate::transaction::Transaction;

/// Direction of a transaction from this wallet's point of view.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Funds leave the wallet.
    Sent,
    /// Funds arrive in the wallet.
    Received,
}

/// Closed set of record types. Transitions only go from the pending types
/// (`Sent`, `Received`) to their cancelled or confirmed counterparts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    /// Outgoing, not confirmed.
    Sent,
    /// Incoming, not confirmed.
    Received,
    /// Outgoing, cancelled.
    SentCancelled,
    /// Incoming, cancelled.
    ReceivedCancelled,
    /// Outgoing, seen on chain.
    SentConfirmed,
    /// Incoming, seen on chain.
    ReceivedConfirmed,
}

impl TxType {
    /// The pending type for a direction.
    pub fn pending(direction: Direction) -> Self {
        match direction {
            Direction::Sent => TxType::Sent,
            Direction::Received => TxType::Received,
        }
    }

    /// Direction of the record.
    pub fn direction(self) -> Direction {
        match self {
            TxType::Sent | TxType::SentCancelled | TxType::SentConfirmed => Direction::Sent,
            TxType::Received | TxType::ReceivedCancelled | TxType::ReceivedConfirmed => {
                Direction::Received
            }
        }
    }

    /// Type after cancellation, if the record can be cancelled.
    pub fn cancelled(self) -> Option<TxType> {
        match self {
            TxType::Sent => Some(TxType::SentCancelled),
            TxType::Received => Some(TxType::ReceivedCancelled),
            _ => None,
        }
    }

    /// Type after chain confirmation, if the record is pending.
    pub fn confirmed(self) -> Option<TxType> {
        match self {
            TxType::Sent => Some(TxType::SentConfirmed),
            TxType::Received => Some(TxType::ReceivedConfirmed),
            _ => None,
        }
    }

    /// Whether the record was cancelled.
    pub fn is_cancelled(self) -> bool {
        matches!(self, TxType::SentCancelled | TxType::ReceivedCancelled)
    }
}

/// One logical transaction on this wallet's side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Wallet-local id, stable for the life of the wallet.
    pub id: u32,
    /// Slate the record belongs to; `None` for outputs found by restore.
    pub tx_slate_id: Option<Uuid>,
    /// Current type.
    pub tx_type: TxType,
    /// Amount paid or received.
    pub amount: u64,
    /// Fee (sender side).
    pub fee: u64,
    /// When the record was created.
    pub creation_ts: DateTime<Utc>,
    /// When the record was confirmed.
    pub confirmation_ts: Option<DateTime<Utc>>,
    /// Whether the transaction is on chain.
    pub confirmed: bool,
    /// Inputs spent by this wallet.
    pub num_inputs: usize,
    /// Outputs created for this wallet.
    pub num_outputs: usize,
    /// Value of the outputs created for this wallet.
    pub amount_credited: u64,
    /// Value of the inputs spent by this wallet.
    pub amount_debited: u64,
    /// Participant messages seen on the slate.
    pub messages: Vec<String>,
    /// Whether the kernel signature was completed.
    pub finalized: bool,
    /// Kernel excess once finalized.
    pub kernel_excess: Option<VerificationKey>,
    /// Finalized transaction, kept for posting.
    pub stored_tx: Option<Transaction>,
    /// Whether the node accepted the transaction when it was last posted.
    pub posted: bool,
}

/// Amounts and counts of a new record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordSummary {
    /// Amount paid or received.
    pub amount: u64,
    /// Fee.
    pub fee: u64,
    /// Inputs spent by this wallet.
    pub num_inputs: usize,
    /// Outputs created for this wallet.
    pub num_outputs: usize,
    /// Value of the outputs created for this wallet.
    pub amount_credited: u64,
    /// Value of the inputs spent by this wallet.
    pub amount_debited: u64,
}

/// Result of a cancel request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The record moved to its cancelled type.
    Cancelled,
    /// The record was cancelled before; nothing changed.
    AlreadyCancelled,
}

/// Records in creation order. Records are never removed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionLedger {
    records: Vec<TransactionRecord>,
    next_id: u32,
}

impl TransactionLedger {
    /// Appends a pending record for `slate_id`.
    pub fn record_pending(
        &mut self,
        slate_id: Uuid,
        direction: Direction,
        summary: RecordSummary,
        messages: Vec<String>,
    ) -> u32 {
        self.push(
            Some(slate_id),
            TxType::pending(direction),
            summary,
            messages,
            None,
        )
    }

    /// Appends an already confirmed incoming record for an output found on chain.
    pub fn record_restored(&mut self, value: u64) -> u32 {
        let summary = RecordSummary {
            amount: value,
            num_outputs: 1,
            amount_credited: value,
            ..RecordSummary::default()
        };
        self.push(
            None,
            TxType::ReceivedConfirmed,
            summary,
            Vec::new(),
            Some(Utc::now()),
        )
    }

    fn push(
        &mut self,
        tx_slate_id: Option<Uuid>,
        tx_type: TxType,
        summary: RecordSummary,
        messages: Vec<String>,
        confirmation_ts: Option<DateTime<Utc>>,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(TransactionRecord {
            id,
            tx_slate_id,
            tx_type,
            amount: summary.amount,
            fee: summary.fee,
            creation_ts: Utc::now(),
            confirmation_ts,
            confirmed: confirmation_ts.is_some(),
            num_inputs: summary.num_inputs,
            num_outputs: summary.num_outputs,
            amount_credited: summary.amount_credited,
            amount_debited: summary.amount_debited,
            messages,
            finalized: false,
            kernel_excess: None,
            stored_tx: None,
            posted: false,
        });
        id
    }

    /// Cancels a pending record. Cancelling twice is a no-op; cancelling a finalized or
    /// confirmed record is an `InvalidState` error.
    pub fn cancel(&mut self, id: u32) -> WalletResult<CancelOutcome> {
        let record = self
            .get_mut(id)
            .ok_or_else(|| WalletError::TransactionNotFound(id.to_string()))?;
        if record.tx_type.is_cancelled() {
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        if record.confirmed {
            return Err(WalletError::invalid_state(format!(
                "transaction {} is already confirmed",
                id
            )));
        }
        if record.finalized {
            return Err(WalletError::invalid_state(format!(
                "transaction {} is already finalized",
                id
            )));
        }
        match record.tx_type.cancelled() {
            Some(t) => {
                record.tx_type = t;
                Ok(CancelOutcome::Cancelled)
            }
            None => Err(WalletError::invalid_state(format!(
                "transaction {} cannot be cancelled",
                id
            ))),
        }
    }

    /// Marks a pending record as on chain. Returns whether anything changed.
    pub fn confirm(&mut self, id: u32) -> bool {
        match self.get_mut(id) {
            Some(record) => match record.tx_type.confirmed() {
                Some(t) => {
                    record.tx_type = t;
                    record.confirmed = true;
                    record.confirmation_ts = Some(Utc::now());
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// First record for `slate_id`.
    pub fn get(&self, slate_id: &Uuid) -> Option<&TransactionRecord> {
        self.records
            .iter()
            .find(|r| r.tx_slate_id.as_ref() == Some(slate_id))
    }

    /// Record for `slate_id` in the given direction.
    pub fn find(&self, slate_id: &Uuid, direction: Direction) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| {
            r.tx_slate_id.as_ref() == Some(slate_id) && r.tx_type.direction() == direction
        })
    }

    /// Record by wallet-local id.
    pub fn get_by_id(&self, id: u32) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Mutable record by wallet-local id.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut TransactionRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// All records in creation order.
    pub fn list(&self) -> &[TransactionRecord] {
        &self.records
    }
}
