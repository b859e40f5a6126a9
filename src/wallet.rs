//! The wallet: one owner of keys, state, storage and collaborators.
//!
//! Every mutation runs under the write lock on a copy of the state, which is persisted
//! and then swapped in. Reads share the read lock. Calls to the chain node and to the
//! counterparty's transport happen outside the lock.

use keytree::{Keychain, Seed};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::NodeClient;
use crate::config::WalletConfig;
use crate::errors::{WalletError, WalletResult};
use crate::ledger::{Direction, TransactionRecord};
use crate::negotiator::{InitTxArgs, SlateNegotiator};
use crate::output::{OutputData, OutputStatus};
use crate::restore::{apply_batch, reconcile, tracked_commitments, BatchProgress, RestoreScanner};
use crate::slate::{Slate, SlateStatus};
use crate::state::WalletState;
use crate::storage::WalletBackend;
use crate::transport::{read_slate_file, write_slate_file, SlateTransport};

/// Balances as reported to callers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    /// Chain height the figures were computed at.
    pub last_confirmed_height: u64,
    /// Confirmations required before an output is spendable.
    pub minimum_confirmations: u64,
    /// Spendable, locked and awaiting confirmation.
    pub total: u64,
    /// Not yet confirmed, or below the confirmation threshold.
    pub amount_awaiting_confirmation: u64,
    /// Change of sends not finalized yet.
    pub amount_awaiting_finalization: u64,
    /// Spendable now.
    pub amount_currently_spendable: u64,
    /// Reserved by in-flight slates.
    pub amount_locked: u64,
}

/// A wallet opened with its password.
pub struct Wallet {
    config: WalletConfig,
    keychain: Keychain,
    backend: Box<dyn WalletBackend>,
    client: Arc<dyn NodeClient>,
    state: RwLock<WalletState>,
}

impl Wallet {
    /// Generates a fresh recovery phrase of 12 or 24 words without storing anything.
    pub fn generate_mnemonic(words: usize) -> WalletResult<String> {
        let len = match words {
            12 => Seed::SHORT_LEN,
            24 => Seed::LONG_LEN,
            n => {
                return Err(WalletError::Config(format!(
                    "recovery phrase must have 12 or 24 words, not {}",
                    n
                )))
            }
        };
        Ok(Seed::random(rand::thread_rng(), len)?.to_mnemonic()?)
    }

    /// Creates a wallet with a new 24-word seed. Returns the wallet and its phrase.
    pub fn init(
        config: WalletConfig,
        backend: Box<dyn WalletBackend>,
        client: Arc<dyn NodeClient>,
    ) -> WalletResult<(Self, String)> {
        let seed = Seed::random(rand::thread_rng(), Seed::LONG_LEN)?;
        let phrase = seed.to_mnemonic()?;
        let wallet = Self::create(config, backend, client, seed)?;
        Ok((wallet, phrase))
    }

    /// Creates a wallet from a recovery phrase. Outputs come back through [`Wallet::restore`].
    pub fn recover(
        config: WalletConfig,
        backend: Box<dyn WalletBackend>,
        client: Arc<dyn NodeClient>,
        phrase: &str,
    ) -> WalletResult<Self> {
        let seed = Seed::from_mnemonic(phrase)?;
        Self::create(config, backend, client, seed)
    }

    fn create(
        config: WalletConfig,
        backend: Box<dyn WalletBackend>,
        client: Arc<dyn NodeClient>,
        seed: Seed,
    ) -> WalletResult<Self> {
        if backend.exists() {
            return Err(WalletError::WalletAlreadyExists);
        }
        let state = WalletState::default();
        backend.store_seed(&seed, &config.password)?;
        backend.save_state(&state)?;
        let keychain = Keychain::from_seed(&seed);
        info!(account = %config.account, "wallet created");
        Ok(Wallet {
            config,
            keychain,
            backend,
            client,
            state: RwLock::new(state),
        })
    }

    /// Opens an existing wallet with the configured password.
    pub fn open(
        config: WalletConfig,
        backend: Box<dyn WalletBackend>,
        client: Arc<dyn NodeClient>,
    ) -> WalletResult<Self> {
        if !backend.exists() {
            return Err(WalletError::WalletNotInitialized);
        }
        let seed = backend.load_seed(&config.password)?;
        let state = backend.load_state()?.unwrap_or_default();
        debug!(outputs = state.outputs.len(), "wallet opened");
        Ok(Wallet {
            keychain: Keychain::from_seed(&seed),
            config,
            backend,
            client,
            state: RwLock::new(state),
        })
    }

    /// Whether `backend` holds a wallet.
    pub fn exists(backend: &dyn WalletBackend) -> bool {
        backend.exists()
    }

    /// Checks `password` against the stored seed.
    pub fn check_password(&self, password: &str) -> WalletResult<()> {
        self.backend.load_seed(password).map(|_| ())
    }

    /// The wallet's recovery phrase.
    pub fn mnemonic(&self) -> WalletResult<String> {
        Ok(self.backend.load_seed(&self.config.password)?.to_mnemonic()?)
    }

    /// The configuration the wallet was opened with.
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    fn update_state<F, T>(&self, closure: F) -> WalletResult<T>
    where
        F: FnOnce(&mut WalletState) -> WalletResult<T>,
    {
        let mut guard = self
            .state
            .write()
            .map_err(|_| WalletError::invalid_state("wallet lock poisoned"))?;
        let mut next = guard.clone();
        let r = closure(&mut next)?;
        self.backend.save_state(&next)?;
        *guard = next;
        Ok(r)
    }

    fn read_state<F, T>(&self, closure: F) -> WalletResult<T>
    where
        F: FnOnce(&WalletState) -> T,
    {
        let guard = self
            .state
            .read()
            .map_err(|_| WalletError::invalid_state("wallet lock poisoned"))?;
        Ok(closure(&guard))
    }

    fn negotiator(&self) -> SlateNegotiator<'_> {
        SlateNegotiator::new(&self.keychain, &self.config)
    }

    /// Scans one batch of the chain's outputs and adds the ones that are ours.
    /// Resume with `start_index = last_retrieved_index + 1`.
    pub fn restore(&self, start_index: u64, batch_size: u64) -> WalletResult<BatchProgress> {
        let batch =
            RestoreScanner::new(&self.keychain).scan(&*self.client, start_index, batch_size)?;
        let progress = batch.progress;
        self.update_state(|state| {
            apply_batch(state, &batch);
            Ok(())
        })?;
        info!(
            start_index,
            last_retrieved_index = progress.last_retrieved_index,
            highest_index = progress.highest_index,
            found = progress.number_found,
            "restore batch"
        );
        Ok(progress)
    }

    /// Like [`Wallet::restore`], and also reconciles the outputs the wallet already
    /// tracks with the chain. With `update_outputs`, locks held by abandoned slates are
    /// released.
    pub fn check(
        &self,
        start_index: u64,
        batch_size: u64,
        update_outputs: bool,
    ) -> WalletResult<BatchProgress> {
        let batch =
            RestoreScanner::new(&self.keychain).scan(&*self.client, start_index, batch_size)?;
        let queried = self.read_state(tracked_commitments)?;
        let on_chain = self.client.get_outputs_from_node(&queried)?;
        let progress = batch.progress;
        self.update_state(|state| {
            apply_batch(state, &batch);
            reconcile(state, &queried, &on_chain, update_outputs);
            Ok(())
        })?;
        info!(
            start_index,
            last_retrieved_index = progress.last_retrieved_index,
            highest_index = progress.highest_index,
            update_outputs,
            "check batch"
        );
        Ok(progress)
    }

    /// Runs [`Wallet::restore`] batches until the whole chain is covered.
    pub fn restore_all(&self, batch_size: u64) -> WalletResult<BatchProgress> {
        let mut start = self
            .restore_progress()?
            .map(|p| p.next_start())
            .unwrap_or(1);
        loop {
            let progress = self.restore(start, batch_size)?;
            if progress.is_complete() {
                return Ok(progress);
            }
            start = progress.next_start();
        }
    }

    /// Cursor of the last restore or check batch.
    pub fn restore_progress(&self) -> WalletResult<Option<BatchProgress>> {
        self.read_state(|s| s.restore_progress)
    }

    /// Reconciles tracked outputs with the chain and cancels sends whose TTL has passed.
    /// Returns the chain height.
    pub fn refresh(&self) -> WalletResult<u64> {
        let height = self.client.get_chain_height()?;
        let queried = self.read_state(tracked_commitments)?;
        let on_chain = self.client.get_outputs_from_node(&queried)?;
        let expired = self.update_state(|state| {
            reconcile(state, &queried, &on_chain, false);
            state.last_confirmed_height = height;
            state.cancel_expired(height)
        })?;
        debug!(
            height,
            tracked = queried.len(),
            expired = expired.len(),
            "refreshed from node"
        );
        Ok(height)
    }

    fn try_refresh(&self) -> bool {
        match self.refresh() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "refresh failed, using stored state");
                false
            }
        }
    }

    /// Balances. With `refresh_from_node`, the wallet first reconciles with the chain;
    /// the flag returned tells whether that succeeded.
    pub fn info(&self, refresh_from_node: bool) -> WalletResult<(bool, WalletInfo)> {
        let refreshed = refresh_from_node && self.try_refresh();
        let minimum_confirmations = self.config.minimum_confirmations;
        let info = self.read_state(|state| {
            let height = state.last_confirmed_height;
            let b = state
                .outputs
                .balances(height, minimum_confirmations, |o| awaiting_finalization(state, o));
            WalletInfo {
                last_confirmed_height: height,
                minimum_confirmations,
                total: b.total,
                amount_awaiting_confirmation: b.awaiting_confirmation,
                amount_awaiting_finalization: b.awaiting_finalization,
                amount_currently_spendable: b.currently_spendable,
                amount_locked: b.locked,
            }
        })?;
        Ok((refreshed, info))
    }

    /// Starts a send: locks inputs and returns the slate for the receiver.
    pub fn tx_create(&self, args: &InitTxArgs) -> WalletResult<Slate> {
        let height = self.client.get_chain_height()?;
        self.update_state(|state| self.negotiator().create(state, args, height))
    }

    /// Creates a slate, delivers it through `transport` and finalizes the reply.
    /// If delivery fails the send is cancelled and its inputs released.
    pub fn tx_send(
        &self,
        args: &InitTxArgs,
        dest: &str,
        transport: &dyn SlateTransport,
    ) -> WalletResult<Slate> {
        let slate = self.tx_create(args)?;
        match transport.send_tx_sync(dest, &slate) {
            Ok(response) => self.finalize_slate(&response),
            Err(e) => {
                warn!(slate_id = %slate.id, error = %e, "delivery failed, cancelling");
                if let Err(cancel_err) = self.tx_cancel_slate(&slate.id) {
                    warn!(slate_id = %slate.id, error = %cancel_err, "cancel after failed delivery");
                }
                Err(e)
            }
        }
    }

    /// Receiver round on a slate already parsed. A slate with a TTL is checked against
    /// the chain height, so receiving it needs the node.
    pub fn receive_slate(
        &self,
        slate: &Slate,
        expected_amount: Option<u64>,
        message: Option<String>,
    ) -> WalletResult<Slate> {
        let height = match slate.ttl_cutoff_height {
            Some(_) => Some(self.client.get_chain_height()?),
            None => None,
        };
        self.update_state(|state| {
            self.negotiator()
                .receive(state, slate, expected_amount, message, height)
        })
    }

    /// Receiver round on a slate file. The response is also written next to the
    /// request as `{id}.grinslate.response` in the slates directory.
    pub fn tx_receive(&self, path: impl AsRef<Path>, message: Option<String>) -> WalletResult<Slate> {
        let slate = read_slate_file(path)?;
        let response = self.receive_slate(&slate, None, message)?;
        write_slate_file(self.slate_file_path(&response.id, true), &response)?;
        Ok(response)
    }

    /// Sender's final round on a slate already parsed.
    pub fn finalize_slate(&self, slate: &Slate) -> WalletResult<Slate> {
        self.update_state(|state| self.negotiator().finalize(state, slate))
    }

    /// Sender's final round on a response file.
    pub fn tx_finalize(&self, path: impl AsRef<Path>) -> WalletResult<Slate> {
        let slate = read_slate_file(path)?;
        self.finalize_slate(&slate)
    }

    /// Posts the finalized transaction of `slate_id` to the node. The outcome is kept on
    /// the record (`posted`) and on the finalized slate (`PostedFailed` until a post
    /// succeeds).
    pub fn tx_post(&self, slate_id: &Uuid) -> WalletResult<()> {
        let tx = self.read_state(|state| {
            let record = state
                .ledger
                .find(slate_id, Direction::Sent)
                .ok_or_else(|| WalletError::TransactionNotFound(slate_id.to_string()))?;
            if record.confirmed {
                return Err(WalletError::invalid_state(format!(
                    "transaction {} is already confirmed",
                    slate_id
                )));
            }
            record.stored_tx.clone().ok_or_else(|| {
                WalletError::invalid_state(format!(
                    "transaction {} has not been finalized",
                    slate_id
                ))
            })
        })??;

        let result = self.client.post_tx(&tx);
        match &result {
            Ok(()) => info!(slate_id = %slate_id, "transaction posted"),
            Err(e) => warn!(slate_id = %slate_id, error = %e, "post failed"),
        }
        let posted = result.is_ok();
        self.update_state(|state| {
            if let Some(slate) = state.finalized_slates.get_mut(slate_id) {
                slate.status = if posted {
                    SlateStatus::Finalized
                } else {
                    SlateStatus::PostedFailed
                };
            }
            let id = state.ledger.find(slate_id, Direction::Sent).map(|r| r.id);
            if let Some(record) = id.and_then(|id| state.ledger.get_mut(id)) {
                record.posted = posted;
            }
            Ok(())
        })?;
        result
    }

    /// Cancels record `id`. Cancelling twice is a no-op.
    pub fn tx_cancel(&self, id: u32) -> WalletResult<TransactionRecord> {
        self.update_state(|state| state.cancel_tx(id))
    }

    /// Cancels this wallet's record of `slate_id`, the send if there is one.
    pub fn tx_cancel_slate(&self, slate_id: &Uuid) -> WalletResult<TransactionRecord> {
        self.update_state(|state| {
            let id = state
                .ledger
                .find(slate_id, Direction::Sent)
                .or_else(|| state.ledger.get(slate_id))
                .map(|r| r.id)
                .ok_or_else(|| WalletError::TransactionNotFound(slate_id.to_string()))?;
            state.cancel_tx(id)
        })
    }

    /// Records of `slate_id` (two when the wallet paid itself).
    pub fn tx_get(&self, slate_id: &Uuid) -> WalletResult<Vec<TransactionRecord>> {
        let records = self.read_state(|state| {
            state
                .ledger
                .list()
                .iter()
                .filter(|r| r.tx_slate_id.as_ref() == Some(slate_id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        if records.is_empty() {
            return Err(WalletError::TransactionNotFound(slate_id.to_string()));
        }
        Ok(records)
    }

    /// All records in creation order.
    pub fn txs_get(&self) -> WalletResult<Vec<TransactionRecord>> {
        self.read_state(|state| state.ledger.list().to_vec())
    }

    /// Outputs ordered by derivation index, optionally only those of record `tx_id`.
    pub fn outputs_get(&self, tx_id: Option<u32>) -> WalletResult<Vec<OutputData>> {
        self.read_state(|state| {
            let mut outputs: Vec<_> = state
                .outputs
                .iter()
                .filter(|o| tx_id.is_none() || o.tx_log_id == tx_id)
                .cloned()
                .collect();
            outputs.sort_by_key(|o| o.derivation_index);
            outputs
        })
    }

    /// Height of the chain tip.
    pub fn chain_height(&self) -> WalletResult<u64> {
        self.client.get_chain_height()
    }

    /// Path of the request or response file of `slate_id` in the slates directory.
    pub fn slate_file_path(&self, slate_id: &Uuid, is_response: bool) -> PathBuf {
        self.config
            .slates_dir()
            .join(Slate::file_name(slate_id, is_response))
    }
}

fn awaiting_finalization(state: &WalletState, output: &OutputData) -> bool {
    output.status == OutputStatus::Unconfirmed
        && output
            .tx_log_id
            .and_then(|id| state.ledger.get_by_id(id))
            .map(|r| r.tx_type.direction() == Direction::Sent && !r.finalized)
            .unwrap_or(false)
}
