//! The slate: the document two wallets pass back and forth to build one transaction.

use aggsig::{KernelContext, PartialSignature, Signature, VerificationKey};
use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};
use crate::transaction::Transaction;

/// Slate versions this wallet reads and writes.
pub const SUPPORTED_VERSIONS: [u16; 2] = [2, 3];

/// Version used when the caller does not ask for one.
pub const CURRENT_VERSION: u16 = 3;

const BLOCK_HEADER_VERSION: u16 = 2;

/// Domain label of participant message signatures.
const MESSAGE_LABEL: &[u8] = b"slate.participant_message";

/// Extension of the request slate file.
pub const SLATE_EXTENSION: &str = "grinslate";

/// Versioning of the slate document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCompatInfo {
    /// Version the document is encoded in.
    pub version: u16,
    /// Version the slate was created with.
    pub orig_version: u16,
    /// Block header version the transaction targets.
    pub block_header_version: u16,
}

/// Round reached by the slate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlateStatus {
    /// Sender added inputs, change and its public data.
    Created,
    /// Sender's partial signature is present.
    SenderSigned,
    /// Receiver added its output, public data and partial signature.
    ReceiverSigned,
    /// Both partials aggregated into a verified kernel signature.
    Finalized,
    /// The finalized transaction was rejected when posted.
    PostedFailed,
}

/// One participant's public contribution. Slot 0 is the sender, slot 1 the receiver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantData {
    /// Position of the participant.
    pub id: u64,
    /// Public excess `X_i`.
    pub public_blind_excess: VerificationKey,
    /// Public nonce `R_i`.
    pub public_nonce: VerificationKey,
    /// Partial signature, once contributed.
    pub part_sig: Option<PartialSignature>,
    /// Free text for the counterparty.
    pub message: Option<String>,
    /// Signature of `message` by the participant's excess key.
    pub message_sig: Option<Signature>,
}

impl ParticipantData {
    /// Builds the participant's public data, signing `message` if present.
    pub fn new(
        id: u64,
        sec_key: &Scalar,
        public_nonce: VerificationKey,
        message: Option<String>,
    ) -> Self {
        let message_sig = message
            .as_ref()
            .map(|m| Signature::sign_message(MESSAGE_LABEL, m.as_bytes(), sec_key));
        ParticipantData {
            id,
            public_blind_excess: VerificationKey::from_secret(sec_key),
            public_nonce,
            part_sig: None,
            message,
            message_sig,
        }
    }

    /// Whether both carry the same public excess and nonce.
    pub fn same_keys(&self, other: &ParticipantData) -> bool {
        self.public_blind_excess == other.public_blind_excess
            && self.public_nonce == other.public_nonce
    }

    fn verify_message(&self) -> WalletResult<()> {
        match (&self.message, &self.message_sig) {
            (None, None) => Ok(()),
            (Some(m), Some(sig)) => sig
                .verify_message(MESSAGE_LABEL, m.as_bytes(), &self.public_blind_excess)
                .map_err(|_| {
                    WalletError::malformed(format!(
                        "message signature of participant {} is invalid",
                        self.id
                    ))
                }),
            _ => Err(WalletError::malformed(format!(
                "participant {} message and signature must come together",
                self.id
            ))),
        }
    }
}

/// Shared transport state of one transaction negotiation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slate {
    /// Versioning.
    pub version_info: VersionCompatInfo,
    /// Number of participants the transaction needs.
    pub num_participants: usize,
    /// Identity shared by both wallets.
    pub id: Uuid,
    /// Transaction being built.
    pub tx: Transaction,
    /// Amount the receiver gets.
    pub amount: u64,
    /// Fee paid by the sender.
    pub fee: u64,
    /// Chain height at creation.
    pub height: u64,
    /// Kernel lock height.
    pub lock_height: u64,
    /// Height after which the slate should be abandoned (version 3 only).
    pub ttl_cutoff_height: Option<u64>,
    /// Round reached.
    pub status: SlateStatus,
    /// Participants in positional order.
    pub participant_data: Vec<ParticipantData>,
}

impl Slate {
    /// Starts a new two-party slate encoded in `version`.
    pub fn blank(version: u16, tx: Transaction) -> WalletResult<Self> {
        check_version(version)?;
        Ok(Slate {
            version_info: VersionCompatInfo {
                version,
                orig_version: version,
                block_header_version: BLOCK_HEADER_VERSION,
            },
            num_participants: 2,
            id: Uuid::new_v4(),
            tx,
            amount: 0,
            fee: 0,
            height: 0,
            lock_height: 0,
            ttl_cutoff_height: None,
            status: SlateStatus::Created,
            participant_data: Vec::new(),
        })
    }

    /// Kernel context from all participants in slot order.
    pub fn kernel_context(&self) -> WalletResult<KernelContext> {
        if self.participant_data.len() != self.num_participants {
            return Err(WalletError::malformed(format!(
                "expected {} participants, found {}",
                self.num_participants,
                self.participant_data.len()
            )));
        }
        let nonces: Vec<_> = self
            .participant_data
            .iter()
            .map(|p| p.public_nonce)
            .collect();
        let excesses: Vec<_> = self
            .participant_data
            .iter()
            .map(|p| p.public_blind_excess)
            .collect();
        let kernel = self.tx.kernel()?;
        Ok(KernelContext::new(kernel.message(), &nonces, &excesses)?)
    }

    /// Checks the signature of every participant message.
    pub fn verify_messages(&self) -> WalletResult<()> {
        for p in &self.participant_data {
            p.verify_message()?;
        }
        Ok(())
    }

    /// Checks that participants sit in their positional slots.
    pub fn check_slots(&self) -> WalletResult<()> {
        for (i, p) in self.participant_data.iter().enumerate() {
            if p.id != i as u64 {
                return Err(WalletError::malformed(format!(
                    "participant {} found in slot {}",
                    p.id, i
                )));
            }
        }
        Ok(())
    }

    /// Re-encodes the slate in `version`. Version 2 has no TTL.
    pub fn set_version(&mut self, version: u16) -> WalletResult<()> {
        check_version(version)?;
        self.version_info.version = version;
        if version < 3 {
            self.ttl_cutoff_height = None;
        }
        Ok(())
    }

    /// Parses a slate document, rejecting unsupported versions.
    pub fn from_json(json: &str) -> WalletResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| WalletError::malformed(format!("slate is not valid JSON: {}", e)))?;
        let version = value
            .get("version_info")
            .and_then(|v| v.get("version"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| WalletError::malformed("slate has no version"))?;
        if version > u64::from(u16::MAX) {
            return Err(WalletError::malformed(format!(
                "unsupported slate version {}",
                version
            )));
        }
        check_version(version as u16)?;
        let slate: Slate = serde_json::from_value(value)
            .map_err(|e| WalletError::malformed(format!("invalid slate: {}", e)))?;
        if slate.version_info.version < 3 && slate.ttl_cutoff_height.is_some() {
            return Err(WalletError::malformed("version 2 slates carry no TTL"));
        }
        Ok(slate)
    }

    /// Encodes the slate as pretty-printed JSON.
    pub fn to_json(&self) -> WalletResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// File name of the request (`{id}.grinslate`) or response (`{id}.grinslate.response`).
    pub fn file_name(id: &Uuid, is_response: bool) -> String {
        if is_response {
            format!("{}.{}.response", id, SLATE_EXTENSION)
        } else {
            format!("{}.{}", id, SLATE_EXTENSION)
        }
    }
}

fn check_version(version: u16) -> WalletResult<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(WalletError::malformed(format!(
            "unsupported slate version {}",
            version
        )))
    }
}
