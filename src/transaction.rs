//! Mimblewimble transaction: inputs, outputs, kernels and the kernel offset.

use aggsig::{KernelMessage, Signature, VerificationKey};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::commit::{Commitment, OutputProof, VALUE_GENERATOR};
use crate::errors::{WalletError, WalletResult};

/// Fee for a transaction of the given shape: `max(4·outputs + kernels − inputs, 1) · base_fee`.
pub fn tx_fee(num_inputs: usize, num_outputs: usize, num_kernels: usize, base_fee: u64) -> u64 {
    let weight = (4 * num_outputs as i64 + num_kernels as i64 - num_inputs as i64).max(1);
    (weight as u64).saturating_mul(base_fee)
}

/// A spent output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Commitment of the output being spent.
    pub commit: Commitment,
}

/// A new output with its ownership proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Value commitment.
    pub commit: Commitment,
    /// Rewindable proof of the owner.
    pub proof: OutputProof,
}

/// Public summary of a transaction: excess, fee and the aggregated signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxKernel {
    /// Fee paid.
    pub fee: u64,
    /// Lock height, 0 for none.
    pub lock_height: u64,
    /// Public excess `X_s + X_r`; the identity until both parties contributed.
    pub excess: VerificationKey,
    /// Signature over the kernel message under `excess`.
    pub excess_sig: Option<Signature>,
}

impl TxKernel {
    /// Kernel with no excess or signature yet.
    pub fn empty(fee: u64, lock_height: u64) -> Self {
        TxKernel {
            fee,
            lock_height,
            excess: VerificationKey::from(RistrettoPoint::default()),
            excess_sig: None,
        }
    }

    /// Message the excess signature commits to.
    pub fn message(&self) -> KernelMessage {
        KernelMessage {
            fee: self.fee,
            lock_height: self.lock_height,
        }
    }

    /// Verifies the excess signature.
    pub fn verify(&self) -> WalletResult<()> {
        let sig = self
            .excess_sig
            .as_ref()
            .ok_or_else(|| WalletError::SignatureAggregationFailed("kernel is not signed".into()))?;
        sig.verify_kernel(self.message(), &self.excess)?;
        Ok(())
    }
}

/// Inputs, outputs and kernels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    /// Spent outputs.
    pub inputs: Vec<Input>,
    /// Created outputs.
    pub outputs: Vec<Output>,
    /// Kernels.
    pub kernels: Vec<TxKernel>,
}

/// A transaction under construction or ready to post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Kernel offset, a blinding share split off the sender's excess.
    #[serde(with = "crate::serialization::scalar")]
    pub offset: Scalar,
    /// Body.
    pub body: TransactionBody,
}

impl Transaction {
    /// Transaction with a single unsigned kernel.
    pub fn new(fee: u64, lock_height: u64) -> Self {
        Transaction {
            offset: Scalar::zero(),
            body: TransactionBody {
                inputs: Vec::new(),
                outputs: Vec::new(),
                kernels: vec![TxKernel::empty(fee, lock_height)],
            },
        }
    }

    /// Total fee over all kernels.
    pub fn fee(&self) -> u64 {
        self.body.kernels.iter().map(|k| k.fee).sum()
    }

    /// The single kernel of a two-party transaction.
    pub fn kernel(&self) -> WalletResult<&TxKernel> {
        match self.body.kernels.as_slice() {
            [k] => Ok(k),
            _ => Err(WalletError::malformed("expected exactly one kernel")),
        }
    }

    /// Mutable access to the single kernel.
    pub fn kernel_mut(&mut self) -> WalletResult<&mut TxKernel> {
        match self.body.kernels.as_mut_slice() {
            [k] => Ok(k),
            _ => Err(WalletError::malformed("expected exactly one kernel")),
        }
    }

    /// `Σ outputs − Σ inputs + fee·H − offset·G`, which must equal the sum of kernel excesses.
    pub fn excess_sum(&self) -> WalletResult<RistrettoPoint> {
        let mut sum = RistrettoPoint::default();
        for o in &self.body.outputs {
            sum += o.commit.to_point()?;
        }
        for i in &self.body.inputs {
            sum -= i.commit.to_point()?;
        }
        Ok(sum + Scalar::from(self.fee()) * *VALUE_GENERATOR
            - self.offset * RISTRETTO_BASEPOINT_POINT)
    }

    /// Checks that commitments are unique, the transaction balances and every kernel
    /// signature verifies.
    pub fn validate(&self) -> WalletResult<()> {
        let mut seen = HashSet::new();
        let commits = self
            .body
            .inputs
            .iter()
            .map(|i| i.commit)
            .chain(self.body.outputs.iter().map(|o| o.commit));
        for c in commits {
            if !seen.insert(c) {
                return Err(WalletError::malformed(format!(
                    "duplicate commitment {}",
                    c
                )));
            }
        }
        if self.body.kernels.is_empty() {
            return Err(WalletError::malformed("transaction has no kernels"));
        }

        let mut kernel_sum = RistrettoPoint::default();
        for k in &self.body.kernels {
            k.verify()?;
            kernel_sum += k
                .excess
                .to_point()
                .map_err(|_| WalletError::malformed("invalid kernel excess"))?;
        }
        if self.excess_sum()? != kernel_sum {
            return Err(WalletError::malformed("transaction does not balance"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit;
    use aggsig::{KernelContext, Signer};

    #[test]
    fn fee_weights() {
        assert_eq!(tx_fee(1, 2, 1, 1_000_000), 8_000_000);
        assert_eq!(tx_fee(2, 1, 1, 1_000_000), 3_000_000);
        // never below one unit of weight
        assert_eq!(tx_fee(10, 1, 1, 1_000_000), 1_000_000);
    }

    fn signed_tx(value: u64, fee: u64) -> Transaction {
        let r_in = Scalar::from(1234u64);
        let r_out = Scalar::from(5678u64);
        let offset = Scalar::from(99u64);
        let excess = r_out - r_in - offset;

        let mut tx = Transaction::new(fee, 0);
        tx.offset = offset;
        tx.body.inputs.push(Input {
            commit: commit(value + fee, &r_in).into(),
        });
        tx.body.outputs.push(Output {
            commit: commit(value, &r_out).into(),
            proof: OutputProof::create(&[0u8; 32], &Commitment::default(), 0, 0),
        });

        let signer = Signer::new(excess);
        let context = KernelContext::new(
            KernelMessage { fee, lock_height: 0 },
            &[signer.public_nonce()],
            &[signer.public_excess()],
        )
        .unwrap();
        let sig = Signature::aggregate(&context, &[signer.sign(&context)]).unwrap();
        let kernel = tx.kernel_mut().unwrap();
        kernel.excess = signer.public_excess();
        kernel.excess_sig = Some(sig);
        tx
    }

    #[test]
    fn balanced_transaction_validates() {
        signed_tx(10, 3).validate().unwrap();
    }

    #[test]
    fn inflation_detected() {
        let mut tx = signed_tx(10, 3);
        tx.body.outputs[0].commit = commit(11, &Scalar::from(5678u64)).into();
        assert!(matches!(tx.validate(), Err(WalletError::MalformedSlate(_))));
    }

    #[test]
    fn unsigned_kernel_rejected() {
        let mut tx = signed_tx(10, 3);
        tx.kernel_mut().unwrap().excess_sig = None;
        assert!(matches!(
            tx.validate(),
            Err(WalletError::SignatureAggregationFailed(_))
        ));
    }

    #[test]
    fn fee_change_breaks_signature() {
        let mut tx = signed_tx(10, 3);
        tx.kernel_mut().unwrap().fee = 4;
        assert!(tx.validate().is_err());
    }
}
