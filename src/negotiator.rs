//! The slate state machine.
//!
//! ```text
//!     Sender                                        Receiver
//!     ---------------------------------------------------------------
//!     create: select and lock inputs,
//!     derive change, pick offset,
//!     x_s = Σchange − Σinputs − offset,
//!     publish X_s, R_s            ---- Created ---->
//!                                                   receive: derive output r_r,
//!                                                   x_r = r_r, publish X_r, R_r,
//!                                                   s_r = k_r + e·x_r
//!                                 <-- ReceiverSigned --
//!     finalize: check s_r,
//!     s_s = k_s + e·x_s,
//!     s = s_s + s_r, verify under X_s + X_r
//!     ---------------------------------------------------------------
//! ```
//! where `e = H(fee, lock_height, R_s + R_r, X_s + X_r)`.
//!
//! Each round works on a copy of the wallet state; the caller persists the copy only
//! if the round succeeds, so a failed round leaves nothing behind.

use aggsig::{Counterparty, PartialSignature, Signature, Signer};
use curve25519_dalek::scalar::Scalar;
use keytree::Keychain;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::commit::{build_output, Commitment};
use crate::config::WalletConfig;
use crate::errors::{WalletError, WalletResult};
use crate::ledger::{Direction, RecordSummary};
use crate::output::{OutputData, OutputStatus, SelectionParams, SelectionStrategy};
use crate::slate::{ParticipantData, Slate, SlateStatus, CURRENT_VERSION};
use crate::state::WalletState;
use crate::transaction::{tx_fee, Input, Output, Transaction};

/// Arguments of a new outgoing transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitTxArgs {
    /// Amount the receiver gets.
    pub amount: u64,
    /// Input selection policy.
    pub selection_strategy: SelectionStrategy,
    /// Message for the receiver.
    pub message: Option<String>,
    /// Slate version to produce; defaults to the current one.
    pub target_slate_version: Option<u16>,
    /// Blocks after creation during which the slate may be completed. Version 3 only.
    pub ttl_blocks: Option<u64>,
}

impl InitTxArgs {
    /// Smallest-first send of `amount` with no message.
    pub fn new(amount: u64) -> Self {
        InitTxArgs {
            amount,
            selection_strategy: SelectionStrategy::Smallest,
            message: None,
            target_slate_version: None,
            ttl_blocks: None,
        }
    }
}

/// Sender secrets kept between `create` and `finalize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SenderContext {
    /// Slate the secrets belong to.
    pub slate_id: Uuid,
    /// Secret excess `x_s`.
    #[serde(with = "crate::serialization::scalar")]
    pub sec_key: Scalar,
    /// Secret nonce `k_s`.
    #[serde(with = "crate::serialization::scalar")]
    pub sec_nonce: Scalar,
    /// Agreed amount.
    pub amount: u64,
    /// Agreed fee.
    pub fee: u64,
    /// Inputs the sender put in.
    pub inputs: Vec<Commitment>,
    /// Change outputs the sender put in.
    pub change: Vec<Commitment>,
    /// Ledger record of the send.
    pub tx_log_id: u32,
    /// Height past which the send is abandoned.
    pub ttl_cutoff_height: Option<u64>,
}

impl SenderContext {
    fn signer(&self) -> Signer {
        Signer::from_secrets(self.sec_key, self.sec_nonce)
    }
}

/// Runs slate rounds for one wallet.
pub struct SlateNegotiator<'a> {
    keychain: &'a Keychain,
    config: &'a WalletConfig,
}

impl<'a> SlateNegotiator<'a> {
    /// Negotiator over the wallet's keys and policy.
    pub fn new(keychain: &'a Keychain, config: &'a WalletConfig) -> Self {
        SlateNegotiator { keychain, config }
    }

    /// Sender round 1: locks inputs, adds change and the sender's public data.
    pub fn create(
        &self,
        state: &mut WalletState,
        args: &InitTxArgs,
        current_height: u64,
    ) -> WalletResult<Slate> {
        if args.amount == 0 {
            return Err(WalletError::malformed("amount must be positive"));
        }
        let version = args.target_slate_version.unwrap_or(CURRENT_VERSION);

        let selection = state.outputs.select(&SelectionParams {
            amount: args.amount,
            current_height,
            minimum_confirmations: self.config.minimum_confirmations,
            max_outputs: self.config.max_outputs,
            num_change_outputs: self.config.num_change_outputs,
            base_fee: self.config.base_fee,
            strategy: args.selection_strategy,
        })?;

        let mut slate = Slate::blank(version, Transaction::new(selection.fee, 0))?;
        slate.amount = args.amount;
        slate.fee = selection.fee;
        slate.height = current_height;
        if version >= 3 {
            slate.ttl_cutoff_height = args.ttl_blocks.map(|ttl| current_height.saturating_add(ttl));
        }
        state.outputs.reserve(&selection, slate.id)?;

        let mut excess = Scalar::zero();
        for input in &selection.inputs {
            excess -= self.keychain.derive(input.derivation_index)?.blinding;
            slate.tx.body.inputs.push(Input {
                commit: input.commitment,
            });
        }

        let mut change = Vec::with_capacity(selection.change.len());
        for value in &selection.change {
            let index = state.next_unused_index()?;
            excess += self.keychain.derive(index)?.blinding;
            let (commit, proof) = build_output(self.keychain, index, *value)?;
            slate.tx.body.outputs.push(Output { commit, proof });
            change.push(OutputData {
                commitment: commit,
                value: *value,
                derivation_index: index,
                status: OutputStatus::Unconfirmed,
                height: 0,
                lock_height: 0,
                tx_log_id: None,
                locked_by: None,
            });
        }

        slate.tx.offset = Scalar::random(&mut rand::thread_rng());
        excess -= slate.tx.offset;

        let signer = Signer::new(excess);
        slate.participant_data.push(ParticipantData::new(
            0,
            &excess,
            signer.public_nonce(),
            args.message.clone(),
        ));

        let change_total: u64 = selection.change.iter().sum();
        let tx_log_id = state.ledger.record_pending(
            slate.id,
            Direction::Sent,
            RecordSummary {
                amount: args.amount,
                fee: selection.fee,
                num_inputs: selection.inputs.len(),
                num_outputs: change.len(),
                amount_credited: change_total,
                amount_debited: selection.total(),
            },
            args.message.iter().cloned().collect(),
        );
        let change_commits: Vec<_> = change.iter().map(|o| o.commitment).collect();
        for mut output in change {
            output.tx_log_id = Some(tx_log_id);
            state.outputs.insert(output);
        }
        state.contexts.insert(
            slate.id,
            SenderContext {
                slate_id: slate.id,
                sec_key: *signer.secret_excess(),
                sec_nonce: *signer.secret_nonce(),
                amount: args.amount,
                fee: selection.fee,
                inputs: selection.inputs.iter().map(|o| o.commitment).collect(),
                change: change_commits,
                tx_log_id,
                ttl_cutoff_height: slate.ttl_cutoff_height,
            },
        );

        info!(
            slate_id = %slate.id,
            amount = args.amount,
            fee = selection.fee,
            inputs = selection.inputs.len(),
            version,
            "slate created"
        );
        Ok(slate)
    }

    /// Receiver round: adds the receiver's output, public data and partial signature.
    ///
    /// `expected_amount`, when given, must equal the slate's amount. With `current_height`
    /// known, a slate past its TTL is refused. Resubmitting a slate that was already
    /// received returns the stored response while the receipt is pending.
    pub fn receive(
        &self,
        state: &mut WalletState,
        slate: &Slate,
        expected_amount: Option<u64>,
        message: Option<String>,
        current_height: Option<u64>,
    ) -> WalletResult<Slate> {
        if let Some(previous) = state.received_slates.get(&slate.id) {
            return replay_receive(previous, slate);
        }
        if let Some(record) = state.ledger.find(&slate.id, Direction::Received) {
            return Err(WalletError::invalid_state(if record.tx_type.is_cancelled() {
                format!("slate {} was received and then cancelled", slate.id)
            } else {
                format!("slate {} was already received and confirmed", slate.id)
            }));
        }

        if slate.status != SlateStatus::Created {
            return Err(WalletError::malformed(format!(
                "cannot receive a slate in status {:?}",
                slate.status
            )));
        }
        if slate.num_participants != 2 || slate.participant_data.len() != 1 {
            return Err(WalletError::malformed(format!(
                "receive expects 1 of 2 participants, found {} of {}",
                slate.participant_data.len(),
                slate.num_participants
            )));
        }
        slate.check_slots()?;
        if slate.participant_data[0].part_sig.is_some() {
            return Err(WalletError::malformed("sender signed before the receiver"));
        }
        if slate.amount == 0 {
            return Err(WalletError::malformed("amount must be positive"));
        }
        if let Some(expected) = expected_amount {
            if expected != slate.amount {
                return Err(WalletError::AmountMismatch {
                    expected,
                    actual: slate.amount,
                });
            }
        }
        let kernel = slate.tx.kernel()?;
        if kernel.fee != slate.fee {
            return Err(WalletError::malformed("kernel fee differs from slate fee"));
        }
        if kernel.lock_height != slate.lock_height {
            return Err(WalletError::malformed(
                "kernel lock height differs from slate lock height",
            ));
        }
        if let (Some(cutoff), Some(height)) = (slate.ttl_cutoff_height, current_height) {
            if height > cutoff {
                return Err(WalletError::invalid_state(format!(
                    "slate {} expired at height {}, chain is at {}",
                    slate.id, cutoff, height
                )));
            }
        }
        let required = tx_fee(
            slate.tx.body.inputs.len(),
            slate.tx.body.outputs.len() + 1,
            1,
            self.config.base_fee,
        );
        if slate.fee < required {
            return Err(WalletError::malformed(format!(
                "fee {} is below the required {}",
                slate.fee, required
            )));
        }
        slate.verify_messages()?;

        let mut response = slate.clone();
        let index = state.next_unused_index()?;
        let key = self.keychain.derive(index)?;
        let (commit, proof) = build_output(self.keychain, index, slate.amount)?;
        response.tx.body.outputs.push(Output { commit, proof });

        let signer = Signer::new(key.blinding);
        response.participant_data.push(ParticipantData::new(
            1,
            &key.blinding,
            signer.public_nonce(),
            message.clone(),
        ));
        let context = response.kernel_context()?;
        response.participant_data[1].part_sig = Some(signer.sign(&context));
        response.status = SlateStatus::ReceiverSigned;

        let messages = response
            .participant_data
            .iter()
            .filter_map(|p| p.message.clone())
            .collect();
        let tx_log_id = state.ledger.record_pending(
            slate.id,
            Direction::Received,
            RecordSummary {
                amount: slate.amount,
                fee: slate.fee,
                num_inputs: 0,
                num_outputs: 1,
                amount_credited: slate.amount,
                amount_debited: 0,
            },
            messages,
        );
        state.outputs.insert(OutputData {
            commitment: commit,
            value: slate.amount,
            derivation_index: index,
            status: OutputStatus::Unconfirmed,
            height: 0,
            lock_height: slate.lock_height,
            tx_log_id: Some(tx_log_id),
            locked_by: None,
        });
        state.received_slates.insert(slate.id, response.clone());

        info!(slate_id = %slate.id, amount = slate.amount, "slate received");
        Ok(response)
    }

    /// Sender round 2: verifies the receiver's partial signature, adds the sender's and
    /// aggregates them into the kernel signature.
    pub fn finalize(&self, state: &mut WalletState, slate: &Slate) -> WalletResult<Slate> {
        if let Some(previous) = state.finalized_slates.get(&slate.id) {
            return replay_finalize(previous, slate);
        }

        if slate.status != SlateStatus::ReceiverSigned {
            return Err(WalletError::malformed(format!(
                "cannot finalize a slate in status {:?}",
                slate.status
            )));
        }
        if slate.num_participants != 2 || slate.participant_data.len() != 2 {
            return Err(WalletError::malformed(format!(
                "finalize expects 2 of 2 participants, found {} of {}",
                slate.participant_data.len(),
                slate.num_participants
            )));
        }
        slate.check_slots()?;

        let context = match state.contexts.get(&slate.id) {
            Some(context) => context.clone(),
            None => {
                return Err(match state.ledger.find(&slate.id, Direction::Sent) {
                    Some(r) if r.tx_type.is_cancelled() => WalletError::invalid_state(format!(
                        "slate {} was cancelled",
                        slate.id
                    )),
                    Some(r) if r.confirmed => WalletError::invalid_state(format!(
                        "slate {} is already confirmed",
                        slate.id
                    )),
                    _ => WalletError::TransactionNotFound(slate.id.to_string()),
                })
            }
        };
        if slate.amount != context.amount {
            return Err(WalletError::AmountMismatch {
                expected: context.amount,
                actual: slate.amount,
            });
        }
        if slate.fee != context.fee || slate.tx.kernel()?.fee != context.fee {
            return Err(WalletError::AmountMismatch {
                expected: context.fee,
                actual: slate.fee,
            });
        }

        let signer = context.signer();
        let sender = &slate.participant_data[0];
        if sender.public_blind_excess != signer.public_excess()
            || sender.public_nonce != signer.public_nonce()
        {
            return Err(WalletError::malformed("sender public data was altered"));
        }
        check_body(slate, &context)?;
        slate.verify_messages()?;

        let receiver = &slate.participant_data[1];
        let receiver_sig = receiver
            .part_sig
            .ok_or_else(|| WalletError::malformed("receiver has not signed"))?;
        let kernel_context = slate.kernel_context()?;
        Counterparty::new(receiver.public_nonce, receiver.public_blind_excess)
            .verify_share(&receiver_sig, &kernel_context)?;

        let sender_sig = signer.sign(&kernel_context);
        let sig = Signature::aggregate(&kernel_context, &[sender_sig, receiver_sig])?;
        sig.verify(&kernel_context).map_err(|e| {
            WalletError::SignatureAggregationFailed(format!("aggregate signature: {}", e))
        })?;

        let mut finalized = slate.clone();
        finalized.participant_data[0].part_sig = Some(sender_sig);
        {
            let kernel = finalized.tx.kernel_mut()?;
            kernel.excess = kernel_context.key_sum();
            kernel.excess_sig = Some(sig);
        }
        finalized.tx.validate()?;
        finalized.status = SlateStatus::Finalized;

        if let Some(record) = state.ledger.get_mut(context.tx_log_id) {
            record.finalized = true;
            record.kernel_excess = Some(kernel_context.key_sum());
            record.stored_tx = Some(finalized.tx.clone());
            record.messages = finalized
                .participant_data
                .iter()
                .filter_map(|p| p.message.clone())
                .collect();
        }
        state.contexts.remove(&slate.id);
        state.finalized_slates.insert(slate.id, finalized.clone());

        info!(slate_id = %slate.id, "slate finalized");
        Ok(finalized)
    }
}

fn replay_receive(previous: &Slate, slate: &Slate) -> WalletResult<Slate> {
    let same_sender = match (slate.participant_data.first(), previous.participant_data.first()) {
        (Some(a), Some(b)) => a.same_keys(b),
        _ => false,
    };
    if same_sender && slate.amount == previous.amount && slate.fee == previous.fee {
        debug!(slate_id = %slate.id, "slate already received, replaying response");
        Ok(previous.clone())
    } else {
        Err(WalletError::invalid_state(format!(
            "slate {} was already received with different content",
            slate.id
        )))
    }
}

/// The returned body must hold exactly the sender's inputs, its change and one more output.
fn check_body(slate: &Slate, context: &SenderContext) -> WalletResult<()> {
    let inputs: HashSet<_> = slate.tx.body.inputs.iter().map(|i| i.commit).collect();
    let expected_inputs: HashSet<_> = context.inputs.iter().cloned().collect();
    if inputs != expected_inputs || slate.tx.body.inputs.len() != context.inputs.len() {
        return Err(WalletError::malformed("inputs were altered"));
    }
    let outputs: HashSet<_> = slate.tx.body.outputs.iter().map(|o| o.commit).collect();
    if !context.change.iter().all(|c| outputs.contains(c))
        || slate.tx.body.outputs.len() != context.change.len() + 1
    {
        return Err(WalletError::malformed("outputs were altered"));
    }
    Ok(())
}

fn replay_finalize(previous: &Slate, slate: &Slate) -> WalletResult<Slate> {
    let same_keys = previous.participant_data.len() == slate.participant_data.len()
        && previous
            .participant_data
            .iter()
            .zip(slate.participant_data.iter())
            .all(|(a, b)| a.same_keys(b));
    let receiver_sig = |s: &Slate| -> Option<PartialSignature> {
        s.participant_data.get(1).and_then(|p| p.part_sig)
    };
    if same_keys
        && receiver_sig(previous) == receiver_sig(slate)
        && previous.amount == slate.amount
        && previous.fee == slate.fee
    {
        debug!(slate_id = %slate.id, "slate already finalized, replaying result");
        Ok(previous.clone())
    } else {
        Err(WalletError::invalid_state(format!(
            "slate {} was already finalized with different content",
            slate.id
        )))
    }
}

#[cfg(test)]
mod tests;
