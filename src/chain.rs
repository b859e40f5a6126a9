//! Chain node collaborator.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::commit::{Commitment, OutputProof};
use crate::errors::{WalletError, WalletResult};
use crate::transaction::{Transaction, TxKernel};

/// An unspent output as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOutput {
    /// Commitment.
    pub commitment: Commitment,
    /// Ownership proof carried by the output.
    pub proof: OutputProof,
    /// Height of the block that created it.
    pub height: u64,
    /// Position in the chain's output insertion order, starting at 1.
    pub mmr_index: u64,
}

/// One page of the chain's output index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputListing {
    /// Highest output index the chain has assigned.
    pub highest_index: u64,
    /// Last index covered by this page.
    pub last_retrieved_index: u64,
    /// Unspent outputs within the page.
    pub outputs: Vec<ChainOutput>,
}

/// Access to a chain node. Every method may fail with `ChainUnavailable`.
pub trait NodeClient: Send + Sync {
    /// Height of the chain tip.
    fn get_chain_height(&self) -> WalletResult<u64>;

    /// Unspent outputs whose index lies in `[start_index, end_index]`.
    fn get_outputs_by_pmmr_index(
        &self,
        start_index: u64,
        end_index: u64,
    ) -> WalletResult<OutputListing>;

    /// For each commitment still unspent on chain: `(height, mmr_index)`.
    /// Spent or unknown commitments are absent from the result.
    fn get_outputs_from_node(
        &self,
        commitments: &[Commitment],
    ) -> WalletResult<HashMap<Commitment, (u64, u64)>>;

    /// Submits a finalized transaction.
    fn post_tx(&self, tx: &Transaction) -> WalletResult<()>;
}

#[derive(Debug, Default)]
struct ChainInner {
    height: u64,
    highest_index: u64,
    unspent: BTreeMap<u64, ChainOutput>,
    index_by_commit: HashMap<Commitment, u64>,
    kernels: Vec<TxKernel>,
    available: bool,
}

impl ChainInner {
    fn append(&mut self, commitment: Commitment, proof: OutputProof, height: u64) -> u64 {
        self.highest_index += 1;
        let mmr_index = self.highest_index;
        self.unspent.insert(
            mmr_index,
            ChainOutput {
                commitment,
                proof,
                height,
                mmr_index,
            },
        );
        self.index_by_commit.insert(commitment, mmr_index);
        mmr_index
    }

    fn check_available(&self) -> WalletResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(WalletError::ChainUnavailable("node is not reachable".into()))
        }
    }
}

/// A chain kept in memory: one unspent set, blocks mined on demand.
/// Transactions are validated and mined into a new block when posted.
#[derive(Debug)]
pub struct InMemoryChain {
    inner: Mutex<ChainInner>,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChain {
    /// Empty chain at height 0.
    pub fn new() -> Self {
        InMemoryChain {
            inner: Mutex::new(ChainInner {
                available: true,
                ..ChainInner::default()
            }),
        }
    }

    fn lock(&self) -> WalletResult<std::sync::MutexGuard<'_, ChainInner>> {
        self.inner
            .lock()
            .map_err(|_| WalletError::ChainUnavailable("chain state poisoned".into()))
    }

    /// Adds an output in a new block (a coinbase, or a payment made by a third party).
    /// Returns its index.
    pub fn push_output(&self, commitment: Commitment, proof: OutputProof) -> WalletResult<u64> {
        let mut inner = self.lock()?;
        inner.height += 1;
        let height = inner.height;
        Ok(inner.append(commitment, proof, height))
    }

    /// Mines `blocks` empty blocks.
    pub fn mine(&self, blocks: u64) -> WalletResult<u64> {
        let mut inner = self.lock()?;
        inner.height += blocks;
        Ok(inner.height)
    }

    /// Simulates the node going offline or coming back.
    pub fn set_available(&self, available: bool) -> WalletResult<()> {
        self.lock()?.available = available;
        Ok(())
    }

    /// Kernels of all posted transactions.
    pub fn kernels(&self) -> WalletResult<Vec<TxKernel>> {
        Ok(self.lock()?.kernels.clone())
    }
}

impl NodeClient for InMemoryChain {
    fn get_chain_height(&self) -> WalletResult<u64> {
        let inner = self.lock()?;
        inner.check_available()?;
        Ok(inner.height)
    }

    fn get_outputs_by_pmmr_index(
        &self,
        start_index: u64,
        end_index: u64,
    ) -> WalletResult<OutputListing> {
        let inner = self.lock()?;
        inner.check_available()?;
        let outputs = if start_index > end_index {
            Vec::new()
        } else {
            inner
                .unspent
                .range(start_index..=end_index)
                .map(|(_, o)| o.clone())
                .collect()
        };
        debug!(start_index, end_index, found = outputs.len(), "outputs by index");
        Ok(OutputListing {
            highest_index: inner.highest_index,
            last_retrieved_index: end_index.min(inner.highest_index),
            outputs,
        })
    }

    fn get_outputs_from_node(
        &self,
        commitments: &[Commitment],
    ) -> WalletResult<HashMap<Commitment, (u64, u64)>> {
        let inner = self.lock()?;
        inner.check_available()?;
        Ok(commitments
            .iter()
            .filter_map(|c| {
                let index = inner.index_by_commit.get(c)?;
                let output = inner.unspent.get(index)?;
                Some((*c, (output.height, output.mmr_index)))
            })
            .collect())
    }

    fn post_tx(&self, tx: &Transaction) -> WalletResult<()> {
        let mut inner = self.lock()?;
        inner.check_available()?;
        tx.validate().map_err(|e| {
            WalletError::invalid_state(format!("transaction rejected by node: {}", e))
        })?;
        for input in &tx.body.inputs {
            if !inner.index_by_commit.contains_key(&input.commit) {
                return Err(WalletError::invalid_state(format!(
                    "transaction rejected by node: input {} is not unspent",
                    input.commit
                )));
            }
        }
        for output in &tx.body.outputs {
            if inner.index_by_commit.contains_key(&output.commit) {
                return Err(WalletError::invalid_state(format!(
                    "transaction rejected by node: duplicate output {}",
                    output.commit
                )));
            }
        }

        inner.height += 1;
        let height = inner.height;
        for input in &tx.body.inputs {
            if let Some(index) = inner.index_by_commit.remove(&input.commit) {
                inner.unspent.remove(&index);
            }
        }
        for output in &tx.body.outputs {
            inner.append(output.commit, output.proof.clone(), height);
        }
        inner.kernels.extend(tx.body.kernels.iter().cloned());
        info!(
            height,
            inputs = tx.body.inputs.len(),
            outputs = tx.body.outputs.len(),
            "transaction mined"
        );
        Ok(())
    }
}
