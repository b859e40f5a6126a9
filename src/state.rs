//! Everything the wallet persists besides the seed.

use keytree::{DerivationIndex, MAX_DERIVATION_INDEX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};
use crate::ledger::{CancelOutcome, Direction, TransactionLedger, TransactionRecord};
use crate::negotiator::SenderContext;
use crate::output::{OutputSet, OutputStatus};
use crate::restore::BatchProgress;
use crate::slate::Slate;

/// Persisted wallet state. Mutated only through the wallet's write lock, on a copy
/// that replaces the original once it has been saved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletState {
    /// Next derivation index to hand out.
    pub next_index: DerivationIndex,
    /// Owned outputs.
    pub outputs: OutputSet,
    /// Transaction log.
    pub ledger: TransactionLedger,
    /// Sender secrets of slates awaiting finalization.
    pub contexts: BTreeMap<Uuid, SenderContext>,
    /// Responses produced by `receive`, replayed on resubmission. Held while the
    /// receipt is pending.
    pub received_slates: BTreeMap<Uuid, Slate>,
    /// Slates finalized by this wallet, held until the send is confirmed.
    pub finalized_slates: BTreeMap<Uuid, Slate>,
    /// Cursor of the last restore or check batch.
    pub restore_progress: Option<BatchProgress>,
    /// Chain height at the last successful refresh.
    pub last_confirmed_height: u64,
}

impl Default for WalletState {
    fn default() -> Self {
        WalletState {
            next_index: 1,
            outputs: OutputSet::default(),
            ledger: TransactionLedger::default(),
            contexts: BTreeMap::new(),
            received_slates: BTreeMap::new(),
            finalized_slates: BTreeMap::new(),
            restore_progress: None,
            last_confirmed_height: 0,
        }
    }
}

impl WalletState {
    /// Reserves a fresh derivation index. Indices are never handed out twice.
    pub fn next_unused_index(&mut self) -> WalletResult<DerivationIndex> {
        let index = self.next_index;
        if index > MAX_DERIVATION_INDEX {
            return Err(WalletError::KeyExhausted);
        }
        self.next_index += 1;
        Ok(index)
    }

    /// Raises the next index past `index`.
    pub fn bump_index_past(&mut self, index: DerivationIndex) {
        if index >= self.next_index {
            self.next_index = index.saturating_add(1);
        }
    }

    /// Cancels record `id`: releases its locked inputs and drops the outputs it created
    /// that never reached the chain. Cancelling twice is a no-op.
    pub fn cancel_tx(&mut self, id: u32) -> WalletResult<TransactionRecord> {
        let outcome = self.ledger.cancel(id)?;
        let record = self
            .ledger
            .get_by_id(id)
            .cloned()
            .ok_or_else(|| WalletError::TransactionNotFound(id.to_string()))?;
        if outcome == CancelOutcome::AlreadyCancelled {
            return Ok(record);
        }

        if let Some(slate_id) = record.tx_slate_id {
            if record.tx_type.direction() == Direction::Sent {
                if let Some(token) = self.outputs.lock_token(slate_id) {
                    self.outputs.release(&token);
                }
                self.contexts.remove(&slate_id);
            }
            self.forget_slate(&slate_id, record.tx_type.direction());
        }
        let orphaned: Vec<_> = self
            .outputs
            .iter()
            .filter(|o| o.tx_log_id == Some(id) && o.status == OutputStatus::Unconfirmed)
            .map(|o| o.commitment)
            .collect();
        for c in &orphaned {
            self.outputs.remove(c);
        }
        info!(
            id,
            slate_id = ?record.tx_slate_id,
            removed_outputs = orphaned.len(),
            "transaction cancelled"
        );
        Ok(record)
    }

    /// Moves record `id` to its confirmed type and drops the slate kept for replays.
    pub fn confirm_record(&mut self, id: Option<u32>) {
        let id = match id {
            Some(id) => id,
            None => return,
        };
        if !self.ledger.confirm(id) {
            return;
        }
        if let Some(record) = self.ledger.get_by_id(id) {
            if let Some(slate_id) = record.tx_slate_id {
                let direction = record.tx_type.direction();
                self.forget_slate(&slate_id, direction);
            }
        }
    }

    fn forget_slate(&mut self, slate_id: &Uuid, direction: Direction) {
        match direction {
            Direction::Sent => self.finalized_slates.remove(slate_id),
            Direction::Received => self.received_slates.remove(slate_id),
        };
    }

    /// Cancels the unfinalized sends whose TTL ended before `height`.
    /// Returns the slates cancelled.
    pub fn cancel_expired(&mut self, height: u64) -> WalletResult<Vec<Uuid>> {
        let expired: Vec<_> = self
            .contexts
            .values()
            .filter(|c| c.ttl_cutoff_height.map_or(false, |cutoff| height > cutoff))
            .map(|c| (c.slate_id, c.tx_log_id))
            .collect();
        for (slate_id, id) in &expired {
            info!(%slate_id, height, "send expired");
            self.cancel_tx(*id)?;
        }
        Ok(expired.into_iter().map(|(slate_id, _)| slate_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_start_at_one_and_never_repeat() {
        let mut state = WalletState::default();
        assert_eq!(state.next_unused_index().unwrap(), 1);
        assert_eq!(state.next_unused_index().unwrap(), 2);
        state.bump_index_past(10);
        assert_eq!(state.next_unused_index().unwrap(), 11);
        state.bump_index_past(3);
        assert_eq!(state.next_unused_index().unwrap(), 12);
    }

    #[test]
    fn key_space_ceiling() {
        let mut state = WalletState::default();
        state.next_index = MAX_DERIVATION_INDEX;
        assert!(state.next_unused_index().is_ok());
        assert!(matches!(
            state.next_unused_index(),
            Err(WalletError::KeyExhausted)
        ));
    }

    #[test]
    fn bincode_round_trip_of_empty_state() {
        let state = WalletState::default();
        let bytes = bincode::serialize(&state).unwrap();
        let back: WalletState = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.next_index, 1);
        assert!(back.outputs.is_empty());
    }
}
