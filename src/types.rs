// Wallet-facing transaction types
// This file defines the mutable per-path transaction state, the user-level
// multi-transaction intent record, send arguments, and the signing-protocol
// request/response shapes exchanged with the external signer.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, Signature, B256, U256};
use serde::Serialize;

use crate::errors::RouterError;
use crate::routes::Path;

/// Identifier correlating every chain-level transaction spawned by one
/// user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct MultiTransactionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MultiTransactionType {
    Send,
    Swap,
    Bridge,
    Approve,
}

/// The user-level intent record. Created once per user action; its id is
/// stamped onto every chain-level transaction it spawns.
#[derive(Debug, Clone)]
pub struct MultiTransaction {
    pub id: MultiTransactionId,
    pub ty: MultiTransactionType,
    pub from_address: Address,
    pub to_address: Address,
    pub from_asset: String,
    pub to_asset: String,
    pub from_amount: U256,
    pub to_amount: U256,
    pub timestamp: u64,
    pub cross_tx_id: String,
}

/// Source of monotonic multi-transaction ids. Injectable so hosts can back
/// ids with their own persistence.
pub trait MultiTxIdSource: Send + Sync {
    fn next_id(&self) -> MultiTransactionId;
}

/// Default id source: process-local monotonic counter.
#[derive(Debug, Default)]
pub struct AtomicIdSource {
    next: AtomicU64,
}

impl MultiTxIdSource for AtomicIdSource {
    fn next_id(&self) -> MultiTransactionId {
        MultiTransactionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Unsigned transaction arguments handed to the transactor. The manager
/// keeps its own copy per leg; multi-transaction id stamping happens only on
/// that private copy.
#[derive(Debug, Clone, Default)]
pub struct SendTxArgs {
    pub from: Address,
    /// None for contract deployments.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    /// Requested nonce; the transactor resolves the actual one.
    pub nonce: Option<u64>,
    pub gas: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token_id: String,
    pub to_token_id: String,
    /// Token or protocol contract the call is directed at, if any.
    pub to_contract_address: Option<Address>,
    pub value_in: U256,
    pub value_out: U256,
    pub slippage_percentage: f32,
    pub multi_transaction_id: Option<MultiTransactionId>,
}

/// Per-leg mutable state: unsigned args, the built transaction, the hash the
/// external signer must sign, and the signature/broadcast progress.
#[derive(Debug, Clone)]
pub struct TransactionData {
    pub tx_args: SendTxArgs,
    pub tx: TxEip1559,
    pub hash_to_sign: B256,
    pub signature: Option<Signature>,
    pub sent_hash: Option<B256>,
}

impl TransactionData {
    pub fn is_placed(&self) -> bool {
        self.sent_hash.is_some()
    }
}

/// Per-path mutable state owned by the transaction manager, created on first
/// reference to a path identity and discarded when the route completes.
#[derive(Debug, Clone)]
pub struct RouterTransactionDetails {
    pub router_path: Path,
    pub approval_tx_data: Option<TransactionData>,
    pub tx_data: Option<TransactionData>,
}

impl RouterTransactionDetails {
    pub fn new(path: Path) -> Self {
        Self {
            router_path: path,
            approval_tx_data: None,
            tx_data: None,
        }
    }

    pub fn is_approval_placed(&self) -> bool {
        self.approval_tx_data
            .as_ref()
            .is_some_and(|d| d.is_placed())
    }

    pub fn is_tx_placed(&self) -> bool {
        self.tx_data.as_ref().is_some_and(|d| d.is_placed())
    }
}

/// The signing account and mode resolved for a from-address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerAccount {
    pub address: Address,
    pub derivation_path: String,
    pub key_uid: String,
    pub sign_on_keycard: bool,
}

/// Signing request handed to the external signer: the account plus every
/// hash produced during one build pass, in path order.
#[derive(Debug, Clone, Serialize)]
pub struct SigningDetails {
    pub address: Address,
    pub derivation_path: String,
    pub key_uid: String,
    pub sign_on_keycard: bool,
    pub hashes: Vec<B256>,
}

/// An r/s/v triple as hex strings, as delivered by the signing UI. Validated
/// structurally before any send; decoding never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDetails {
    pub r: String,
    pub s: String,
    pub v: String,
}

impl SignatureDetails {
    pub fn validate(&self) -> Result<(), RouterError> {
        let check = |name: &str, value: &str, len: usize| -> Result<(), RouterError> {
            if value.len() != len {
                return Err(RouterError::InvalidSignatureDetails(format!(
                    "{name} must be {len} hex characters, got {}",
                    value.len()
                )));
            }
            if hex::decode(value).is_err() {
                return Err(RouterError::InvalidSignatureDetails(format!(
                    "{name} is not valid hex"
                )));
            }
            Ok(())
        };
        check("r", &self.r, 64)?;
        check("s", &self.s, 64)?;
        if self.v != "00" && self.v != "01" {
            return Err(RouterError::InvalidSignatureDetails(format!(
                "v must be 00 or 01, got {}",
                self.v
            )));
        }
        Ok(())
    }

    pub fn to_signature(&self) -> Result<Signature, RouterError> {
        self.validate()?;
        let r_bytes = hex::decode(&self.r)
            .map_err(|e| RouterError::InvalidSignatureDetails(e.to_string()))?;
        let s_bytes = hex::decode(&self.s)
            .map_err(|e| RouterError::InvalidSignatureDetails(e.to_string()))?;
        let r = U256::from_be_slice(&r_bytes);
        let s = U256::from_be_slice(&s_bytes);
        Ok(Signature::new(r, s, self.v == "01"))
    }
}

/// Outcome record for one broadcast chain-level transaction.
#[derive(Debug, Clone, Serialize)]
pub struct RouterSentTransaction {
    pub from_address: Address,
    pub to_address: Option<Address>,
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: String,
    pub to_token: String,
    pub amount_in: U256,
    pub amount_out: U256,
    pub hash: B256,
    pub approval_tx: bool,
    pub multi_transaction_id: Option<MultiTransactionId>,
}

impl RouterSentTransaction {
    pub fn from_args(args: &SendTxArgs, hash: B256, approval_tx: bool) -> Self {
        Self {
            from_address: args.from,
            to_address: args.to,
            from_chain: args.from_chain_id,
            to_chain: args.to_chain_id,
            from_token: args.from_token_id.clone(),
            to_token: args.to_token_id.clone(),
            amount_in: args.value_in,
            amount_out: args.value_out,
            hash,
            approval_tx,
            multi_transaction_id: args.multi_transaction_id,
        }
    }
}

/// Call message for gas estimation and read-only contract calls.
#[derive(Debug, Clone, Default)]
pub struct CallMsg {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_details_structural_validation() {
        let good = SignatureDetails {
            r: "11".repeat(32),
            s: "22".repeat(32),
            v: "01".into(),
        };
        assert!(good.validate().is_ok());
        let sig = good.to_signature().unwrap();
        assert!(sig.v());

        let short_r = SignatureDetails {
            r: "11".repeat(31),
            ..good.clone()
        };
        assert!(matches!(
            short_r.validate(),
            Err(RouterError::InvalidSignatureDetails(_))
        ));

        let bad_hex = SignatureDetails {
            s: "zz".repeat(32),
            ..good.clone()
        };
        assert!(matches!(
            bad_hex.validate(),
            Err(RouterError::InvalidSignatureDetails(_))
        ));

        let bad_v = SignatureDetails {
            v: "02".into(),
            ..good
        };
        assert!(matches!(
            bad_v.validate(),
            Err(RouterError::InvalidSignatureDetails(_))
        ));
    }

    #[test]
    fn atomic_id_source_is_monotonic() {
        let source = AtomicIdSource::default();
        let first = source.next_id();
        let second = source.next_id();
        assert!(second.0 > first.0);
    }
}
