//! Batched, resumable scan of the chain's outputs.
//!
//! A scan walks the chain's output index in windows `[start, start + batch_size)`.
//! Outputs whose proof opens under the wallet's rewind key, and whose commitment is
//! reproduced by the key at the recovered derivation index, are ours. The driving loop
//! calls again with `start = last_retrieved_index + 1` until
//! `last_retrieved_index == highest_index`, persisting the cursor in between, so a crash
//! loses at most one batch.

use keytree::{DerivationIndex, Keychain};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::chain::NodeClient;
use crate::commit::{recover_output, Commitment};
use crate::errors::{WalletError, WalletResult};
use crate::ledger::Direction;
use crate::output::{Observation, OutputData, OutputStatus};
use crate::state::WalletState;

/// Resumable cursor over the chain's output index.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Highest output index the chain reports.
    pub highest_index: u64,
    /// Last index covered so far.
    pub last_retrieved_index: u64,
    /// Outputs recognized as ours in the batch.
    pub number_found: usize,
}

impl BatchProgress {
    /// Whether the scan has covered the whole index.
    pub fn is_complete(&self) -> bool {
        self.last_retrieved_index >= self.highest_index
    }

    /// Start index of the next batch.
    pub fn next_start(&self) -> u64 {
        self.last_retrieved_index + 1
    }
}

/// An output recognized as ours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredOutput {
    /// Commitment.
    pub commitment: Commitment,
    /// Value opened from the proof.
    pub value: u64,
    /// Derivation index opened from the proof.
    pub derivation_index: DerivationIndex,
    /// Block height.
    pub height: u64,
    /// Output index.
    pub mmr_index: u64,
}

/// What one batch found; not yet applied to any state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanBatch {
    /// Cursor after this batch.
    pub progress: BatchProgress,
    /// Our outputs within the batch.
    pub found: Vec<RecoveredOutput>,
}

/// Scans the chain with the keys of one wallet.
pub struct RestoreScanner<'a> {
    keychain: &'a Keychain,
}

impl<'a> RestoreScanner<'a> {
    /// Scanner over the wallet's keys.
    pub fn new(keychain: &'a Keychain) -> Self {
        RestoreScanner { keychain }
    }

    /// Queries the chain for `[start_index, start_index + batch_size)` and recognizes our
    /// outputs. Touches no wallet state, so a failure here leaves the cursor where it was.
    pub fn scan(
        &self,
        client: &dyn NodeClient,
        start_index: u64,
        batch_size: u64,
    ) -> WalletResult<ScanBatch> {
        if batch_size == 0 {
            return Err(WalletError::Config("batch size must be positive".into()));
        }
        let start_index = start_index.max(1);
        let end_index = start_index.saturating_add(batch_size - 1);
        let listing = client.get_outputs_by_pmmr_index(start_index, end_index)?;

        let found: Vec<_> = listing
            .outputs
            .iter()
            .filter_map(|o| {
                let (value, derivation_index) =
                    recover_output(self.keychain, &o.commitment, &o.proof)?;
                Some(RecoveredOutput {
                    commitment: o.commitment,
                    value,
                    derivation_index,
                    height: o.height,
                    mmr_index: o.mmr_index,
                })
            })
            .collect();

        // Never report past the end of the chain, never move backwards.
        let last_retrieved_index = end_index.min(listing.highest_index).max(start_index - 1);
        let progress = BatchProgress {
            highest_index: listing.highest_index,
            last_retrieved_index,
            number_found: found.len(),
        };
        debug!(
            start_index,
            end_index,
            highest_index = progress.highest_index,
            found = progress.number_found,
            "restore batch scanned"
        );
        Ok(ScanBatch { progress, found })
    }
}

/// Applies a scanned batch in one step: new outputs are added as unspent with a
/// confirmed incoming record, known unconfirmed ones become unspent, and the next
/// derivation index moves past every recovered index.
pub fn apply_batch(state: &mut WalletState, batch: &ScanBatch) -> usize {
    let mut added = 0;
    for found in &batch.found {
        state.bump_index_past(found.derivation_index);
        match state.outputs.get(&found.commitment) {
            Some(existing) => {
                let tx_log_id = existing.tx_log_id;
                if state.outputs.observe(
                    &found.commitment,
                    Observation::Unspent {
                        height: found.height,
                    },
                ) == Some(OutputStatus::Unspent)
                {
                    state.confirm_record(tx_log_id);
                }
            }
            None => {
                let tx_log_id = state.ledger.record_restored(found.value);
                state.outputs.insert(OutputData {
                    commitment: found.commitment,
                    value: found.value,
                    derivation_index: found.derivation_index,
                    status: OutputStatus::Unspent,
                    height: found.height,
                    lock_height: 0,
                    tx_log_id: Some(tx_log_id),
                    locked_by: None,
                });
                added += 1;
            }
        }
    }
    state.restore_progress = Some(batch.progress);
    if added > 0 {
        info!(added, "restored outputs");
    }
    added
}

/// Commitments whose status the chain can still change.
pub fn tracked_commitments(state: &WalletState) -> Vec<Commitment> {
    state
        .outputs
        .iter()
        .filter(|o| o.status != OutputStatus::Spent)
        .map(|o| o.commitment)
        .collect()
}

/// Reconciles the outputs in `queried` with what the chain reported for them
/// (`on_chain` holds the unspent ones).
///
/// * unconfirmed outputs seen on chain become unspent and confirm their record;
/// * unspent or locked outputs missing from chain become spent, and a lock's send
///   record is confirmed;
/// * with `release_stale`, locks held by slates whose send record is cancelled or
///   missing are released.
pub fn reconcile(
    state: &mut WalletState,
    queried: &[Commitment],
    on_chain: &HashMap<Commitment, (u64, u64)>,
    release_stale: bool,
) {
    for c in queried {
        let (status, tx_log_id, locked_by) = match state.outputs.get(c) {
            Some(o) => (o.status, o.tx_log_id, o.locked_by),
            None => continue,
        };
        match (on_chain.get(c), status) {
            (Some(&(height, _)), _) => {
                if state.outputs.observe(c, Observation::Unspent { height })
                    == Some(OutputStatus::Unspent)
                {
                    state.confirm_record(tx_log_id);
                }
            }
            (None, OutputStatus::Unspent) | (None, OutputStatus::Locked) => {
                state.outputs.observe(c, Observation::Spent);
                let spender = locked_by
                    .and_then(|slate_id| state.ledger.find(&slate_id, Direction::Sent))
                    .map(|r| r.id);
                state.confirm_record(spender);
            }
            _ => {}
        }
    }

    if release_stale {
        let stale: Vec<_> = state
            .outputs
            .iter()
            .filter(|o| o.status == OutputStatus::Locked)
            .filter_map(|o| o.locked_by)
            .filter(|slate_id| {
                state
                    .ledger
                    .find(slate_id, Direction::Sent)
                    .map(|r| r.tx_type.is_cancelled())
                    .unwrap_or(true)
            })
            .collect();
        for slate_id in stale {
            if let Some(token) = state.outputs.lock_token(slate_id) {
                warn!(slate_id = %slate_id, "releasing lock of abandoned slate");
                state.outputs.release(&token);
            }
        }
    }
}
