//! The wallet's view of the outputs it owns.

use keytree::DerivationIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::commit::Commitment;
use crate::errors::{WalletError, WalletResult};
use crate::transaction::tx_fee;

/// Lifecycle of an owned output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStatus {
    /// Created by a slate round, not yet seen on chain.
    Unconfirmed,
    /// Seen on chain and not spent.
    Unspent,
    /// Reserved as an input of an in-flight slate.
    Locked,
    /// Spent on chain.
    Spent,
}

/// An output owned by this wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputData {
    /// Commitment as it appears on chain.
    pub commitment: Commitment,
    /// Cleartext value.
    pub value: u64,
    /// Index of the key that blinds the commitment.
    pub derivation_index: DerivationIndex,
    /// Current status.
    pub status: OutputStatus,
    /// Height the output was confirmed at (0 while unconfirmed).
    pub height: u64,
    /// Height before which the output cannot be spent.
    pub lock_height: u64,
    /// Ledger record that created the output.
    pub tx_log_id: Option<u32>,
    /// Slate holding the lock while `status` is `Locked`.
    pub locked_by: Option<Uuid>,
}

impl OutputData {
    /// Confirmations at `current_height`; 0 for outputs not yet on chain.
    pub fn num_confirmations(&self, current_height: u64) -> u64 {
        if self.status == OutputStatus::Unconfirmed || self.height > current_height {
            0
        } else {
            1 + current_height - self.height
        }
    }

    /// Whether the output may be selected as an input.
    pub fn is_spendable(&self, current_height: u64, minimum_confirmations: u64) -> bool {
        self.status == OutputStatus::Unspent
            && self.lock_height <= current_height
            && self.num_confirmations(current_height) >= minimum_confirmations
    }
}

/// Chain evidence about one commitment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// The commitment is in the chain's unspent set at this height.
    Unspent {
        /// Height of the block that created the output.
        height: u64,
    },
    /// The commitment is no longer in the unspent set.
    Spent,
}

/// Input selection policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Greedily take the smallest spendable outputs first.
    Smallest,
    /// Spend every spendable output.
    All,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::Smallest
    }
}

impl FromStr for SelectionStrategy {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smallest" => Ok(SelectionStrategy::Smallest),
            "all" => Ok(SelectionStrategy::All),
            _ => Err(WalletError::Config(format!(
                "unknown selection strategy {:?}",
                s
            ))),
        }
    }
}

/// Parameters of one input selection.
#[derive(Clone, Debug)]
pub struct SelectionParams {
    /// Amount the receiver gets.
    pub amount: u64,
    /// Current chain height.
    pub current_height: u64,
    /// Confirmations required for an input.
    pub minimum_confirmations: u64,
    /// Maximum number of inputs.
    pub max_outputs: usize,
    /// Number of outputs to split the change into.
    pub num_change_outputs: usize,
    /// Fee per weight unit.
    pub base_fee: u64,
    /// Selection policy.
    pub strategy: SelectionStrategy,
}

/// Outcome of input selection. Nothing is locked until it is passed to [`OutputSet::reserve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Chosen inputs.
    pub inputs: Vec<OutputData>,
    /// Fee of the resulting transaction.
    pub fee: u64,
    /// Values of the change outputs (empty when there is no change).
    pub change: Vec<u64>,
}

impl Selection {
    /// Total value of the inputs.
    pub fn total(&self) -> u64 {
        self.inputs.iter().map(|o| o.value).sum()
    }
}

/// Proof that a set of outputs is locked for one slate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    /// The slate holding the lock.
    pub slate_id: Uuid,
    /// The locked outputs.
    pub commitments: Vec<Commitment>,
}

/// Spendable and pending amounts, in base units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Confirmed unspent plus locked plus awaiting confirmation.
    pub total: u64,
    /// Outputs not yet confirmed (or below the confirmation threshold).
    pub awaiting_confirmation: u64,
    /// Change of sent transactions still waiting for the receiver and finalization.
    pub awaiting_finalization: u64,
    /// Reserved by in-flight slates.
    pub locked: u64,
    /// Selectable right now.
    pub currently_spendable: u64,
}

/// All outputs owned by the wallet, keyed by commitment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputSet {
    outputs: BTreeMap<Commitment, OutputData>,
}

impl OutputSet {
    /// Adds an output, replacing a previous entry for the same commitment.
    pub fn insert(&mut self, output: OutputData) {
        self.outputs.insert(output.commitment, output);
    }

    /// Removes an output. Only outputs that never reached the chain should be removed.
    pub fn remove(&mut self, commitment: &Commitment) -> Option<OutputData> {
        self.outputs.remove(commitment)
    }

    /// Looks up an output.
    pub fn get(&self, commitment: &Commitment) -> Option<&OutputData> {
        self.outputs.get(commitment)
    }

    /// Iterates over all outputs in commitment order.
    pub fn iter(&self) -> impl Iterator<Item = &OutputData> {
        self.outputs.values()
    }

    /// Number of tracked outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether no outputs are tracked.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Chooses inputs and fee for a payment of `params.amount`.
    pub fn select(&self, params: &SelectionParams) -> WalletResult<Selection> {
        let mut eligible: Vec<&OutputData> = self
            .iter()
            .filter(|o| o.is_spendable(params.current_height, params.minimum_confirmations))
            .collect();
        eligible.sort_by_key(|o| (o.value, o.derivation_index));
        let available: u64 = eligible.iter().map(|o| o.value).sum();

        let fee_for = |num_inputs: usize, with_change: bool| {
            let outputs = if with_change {
                1 + params.num_change_outputs
            } else {
                1
            };
            tx_fee(num_inputs, outputs, 1, params.base_fee)
        };

        // The fee depends on the number of inputs, so grow the target until it is covered.
        let mut target = params.amount.saturating_add(fee_for(1, false));
        for _ in 0..=eligible.len() {
            let chosen = match pick(&eligible, target, params) {
                Some(chosen) => chosen,
                None => break,
            };
            let total: u64 = chosen.iter().map(|o| o.value).sum();
            let n = chosen.len();

            let exact_fee = fee_for(n, false);
            if total == params.amount.saturating_add(exact_fee) {
                return Ok(Selection {
                    inputs: chosen.into_iter().cloned().collect(),
                    fee: exact_fee,
                    change: Vec::new(),
                });
            }
            let fee = fee_for(n, true);
            let needed = params.amount.saturating_add(fee);
            if total >= needed {
                return Ok(Selection {
                    inputs: chosen.into_iter().cloned().collect(),
                    fee,
                    change: split_change(total - needed, params.num_change_outputs),
                });
            }
            if needed <= target {
                break;
            }
            target = needed;
        }

        Err(WalletError::InsufficientFunds {
            needed: params.amount.saturating_add(fee_for(eligible.len().max(1), true)),
            available,
        })
    }

    /// Locks the selected inputs for `slate_id`. All or nothing: if any input is no longer
    /// unspent, nothing is locked and `InsufficientFunds` is returned.
    pub fn reserve(&mut self, selection: &Selection, slate_id: Uuid) -> WalletResult<LockToken> {
        for input in &selection.inputs {
            match self.outputs.get(&input.commitment) {
                Some(o) if o.status == OutputStatus::Unspent => {}
                _ => {
                    return Err(WalletError::InsufficientFunds {
                        needed: selection.total(),
                        available: self.spendable_total(),
                    })
                }
            }
        }
        let mut commitments = Vec::with_capacity(selection.inputs.len());
        for input in &selection.inputs {
            if let Some(o) = self.outputs.get_mut(&input.commitment) {
                o.status = OutputStatus::Locked;
                o.locked_by = Some(slate_id);
                commitments.push(o.commitment);
            }
        }
        Ok(LockToken {
            slate_id,
            commitments,
        })
    }

    /// Reverts the token's outputs from Locked to Unspent. Outputs spent meanwhile stay spent.
    pub fn release(&mut self, token: &LockToken) {
        for c in &token.commitments {
            if let Some(o) = self.outputs.get_mut(c) {
                if o.status == OutputStatus::Locked && o.locked_by == Some(token.slate_id) {
                    o.status = OutputStatus::Unspent;
                    o.locked_by = None;
                }
            }
        }
    }

    /// Returns the lock token currently held by `slate_id`, if any.
    pub fn lock_token(&self, slate_id: Uuid) -> Option<LockToken> {
        let commitments: Vec<_> = self
            .iter()
            .filter(|o| o.status == OutputStatus::Locked && o.locked_by == Some(slate_id))
            .map(|o| o.commitment)
            .collect();
        if commitments.is_empty() {
            None
        } else {
            Some(LockToken {
                slate_id,
                commitments,
            })
        }
    }

    /// Applies chain evidence. Idempotent; returns the new status when it changed.
    pub fn observe(
        &mut self,
        commitment: &Commitment,
        observation: Observation,
    ) -> Option<OutputStatus> {
        let output = self.outputs.get_mut(commitment)?;
        match (output.status, observation) {
            (OutputStatus::Unconfirmed, Observation::Unspent { height }) => {
                output.status = OutputStatus::Unspent;
                output.height = height;
                Some(OutputStatus::Unspent)
            }
            (OutputStatus::Unspent, Observation::Unspent { height })
            | (OutputStatus::Locked, Observation::Unspent { height }) => {
                output.height = height;
                None
            }
            (OutputStatus::Unspent, Observation::Spent)
            | (OutputStatus::Locked, Observation::Spent) => {
                output.status = OutputStatus::Spent;
                output.locked_by = None;
                Some(OutputStatus::Spent)
            }
            _ => None,
        }
    }

    fn spendable_total(&self) -> u64 {
        self.iter()
            .filter(|o| o.status == OutputStatus::Unspent)
            .map(|o| o.value)
            .sum()
    }

    /// Summarizes the set at `current_height`. `awaiting_finalization` tells which
    /// unconfirmed outputs belong to slates the sender has not finalized yet.
    pub fn balances<F>(
        &self,
        current_height: u64,
        minimum_confirmations: u64,
        awaiting_finalization: F,
    ) -> Balances
    where
        F: Fn(&OutputData) -> bool,
    {
        let mut b = Balances::default();
        for o in self.iter() {
            match o.status {
                OutputStatus::Unspent => {
                    if o.is_spendable(current_height, minimum_confirmations) {
                        b.currently_spendable += o.value;
                    } else {
                        b.awaiting_confirmation += o.value;
                    }
                }
                OutputStatus::Unconfirmed => {
                    if awaiting_finalization(o) {
                        b.awaiting_finalization += o.value;
                    } else {
                        b.awaiting_confirmation += o.value;
                    }
                }
                OutputStatus::Locked => b.locked += o.value,
                OutputStatus::Spent => {}
            }
        }
        b.total = b.currently_spendable + b.awaiting_confirmation + b.locked;
        b
    }
}

fn pick<'a>(
    eligible: &[&'a OutputData],
    target: u64,
    params: &SelectionParams,
) -> Option<Vec<&'a OutputData>> {
    let total: u64 = eligible.iter().map(|o| o.value).sum();
    if total < target {
        return None;
    }
    match params.strategy {
        SelectionStrategy::All => {
            if eligible.len() > params.max_outputs {
                None
            } else {
                Some(eligible.to_vec())
            }
        }
        SelectionStrategy::Smallest => {
            let mut sum = 0u64;
            let mut chosen = Vec::new();
            for o in eligible {
                if sum >= target {
                    break;
                }
                sum += o.value;
                chosen.push(*o);
            }
            if chosen.len() <= params.max_outputs {
                return Some(chosen);
            }
            // Too many small outputs: fall back to the largest ones.
            let largest: Vec<_> = eligible
                .iter()
                .rev()
                .take(params.max_outputs)
                .cloned()
                .collect();
            let mut sum = 0u64;
            let mut chosen = Vec::new();
            for o in largest {
                if sum >= target {
                    break;
                }
                sum += o.value;
                chosen.push(o);
            }
            if sum >= target {
                Some(chosen)
            } else {
                None
            }
        }
    }
}

/// Splits `change` into at most `parts` non-zero values; the last one takes the remainder.
fn split_change(change: u64, parts: usize) -> Vec<u64> {
    if change == 0 {
        return Vec::new();
    }
    let parts = (parts.max(1) as u64).min(change);
    let share = change / parts;
    let mut values = vec![share; parts as usize];
    if let Some(last) = values.last_mut() {
        *last += change - share * parts;
    }
    values
}
