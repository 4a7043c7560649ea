// Transaction building and submission module
// This file defines the transactor seam: nonce resolution, EIP-1559
// assembly, signature attachment and raw broadcast over JSON-RPC

use std::collections::HashMap;

use alloy::consensus::{TxEip1559, TxEnvelope};
use alloy::primitives::{Address, Bytes, Signature, TxKind, B256};
use async_trait::async_trait;
use tracing::warn;

use crate::errors::TransactorError;
use crate::signing;
use crate::transport::jsonrpc::JsonRpc;
use crate::types::{CallMsg, SendTxArgs, SignerAccount};

/// Gas estimation and read-only calls, split out so processors can be tested
/// without a node.
#[async_trait]
pub trait GasSource: Send + Sync {
    async fn estimate_gas(&self, chain_id: u64, msg: &CallMsg) -> Result<u64, TransactorError>;
    async fn call(&self, chain_id: u64, msg: &CallMsg) -> Result<Bytes, TransactorError>;
}

/// Nonce-and-broadcast collaborator. One instance serializes nonce use per
/// account within a process; across processes the node's pending count is
/// the only arbiter.
#[async_trait]
pub trait Transactor: Send + Sync {
    /// Validates args, resolves the effective nonce and assembles the
    /// unsigned transaction. Returns the transaction with the nonce used.
    async fn validate_and_build_transaction(
        &self,
        chain_id: u64,
        args: &SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(TxEip1559, u64), TransactorError>;

    /// Pure attachment; rejects a chain-id mismatch, performs no recovery.
    fn add_signature_to_transaction(
        &self,
        chain_id: u64,
        tx: TxEip1559,
        signature: Signature,
    ) -> Result<TxEnvelope, TransactorError>;

    async fn send_transaction_with_signature(
        &self,
        chain_id: u64,
        envelope: &TxEnvelope,
    ) -> Result<B256, TransactorError>;

    /// One-shot build-sign-send with a locally held key. Not available in
    /// this crate; signing is external.
    async fn send_transaction_with_chain_id(
        &self,
        chain_id: u64,
        args: &SendTxArgs,
        last_used_nonce: Option<u64>,
        account: &SignerAccount,
    ) -> Result<(B256, u64), TransactorError>;
}

/// Maps a from-address onto the signing account and mode.
pub trait AccountResolver: Send + Sync {
    fn resolve(&self, address: Address) -> Result<SignerAccount, TransactorError>;
}

/// Resolver for hosts driving a single account.
#[derive(Debug, Clone)]
pub struct SingleAccountResolver {
    pub account: SignerAccount,
}

impl AccountResolver for SingleAccountResolver {
    fn resolve(&self, address: Address) -> Result<SignerAccount, TransactorError> {
        if self.account.address != address {
            return Err(TransactorError::InvalidTxData(format!(
                "unknown account {address}"
            )));
        }
        Ok(self.account.clone())
    }
}

/// Requested nonce is used only when no nonce was used earlier in the pass.
pub fn resolve_nonce(last_used: Option<u64>, requested: Option<u64>) -> Option<u64> {
    last_used.map(|n| n + 1).or(requested)
}

#[derive(Debug, Clone)]
pub struct RpcTransactor {
    rpcs: HashMap<u64, JsonRpc>,
}

impl RpcTransactor {
    pub fn new(rpcs: HashMap<u64, JsonRpc>) -> Self {
        Self { rpcs }
    }

    fn rpc(&self, chain_id: u64) -> Result<&JsonRpc, TransactorError> {
        self.rpcs
            .get(&chain_id)
            .ok_or_else(|| TransactorError::Rpc(format!("no endpoint for chain {chain_id}")))
    }

    fn validate(args: &SendTxArgs) -> Result<(), TransactorError> {
        if args.gas == 0 {
            return Err(TransactorError::InvalidTxData("gas limit not set".into()));
        }
        if args.max_fee_per_gas == 0 {
            return Err(TransactorError::InvalidTxData(
                "max fee per gas not set".into(),
            ));
        }
        if args.max_priority_fee_per_gas > args.max_fee_per_gas {
            return Err(TransactorError::InvalidTxData(
                "priority fee exceeds max fee".into(),
            ));
        }
        Ok(())
    }
}

pub fn assemble_tx(chain_id: u64, args: &SendTxArgs, nonce: u64) -> TxEip1559 {
    TxEip1559 {
        chain_id,
        nonce,
        gas_limit: args.gas,
        max_fee_per_gas: args.max_fee_per_gas,
        max_priority_fee_per_gas: args.max_priority_fee_per_gas,
        to: match args.to {
            Some(addr) => TxKind::Call(addr),
            None => TxKind::Create,
        },
        value: args.value,
        input: args.data.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl Transactor for RpcTransactor {
    async fn validate_and_build_transaction(
        &self,
        chain_id: u64,
        args: &SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(TxEip1559, u64), TransactorError> {
        Self::validate(args)?;
        let nonce = match resolve_nonce(last_used_nonce, args.nonce) {
            Some(n) => n,
            None => self.rpc(chain_id)?.transaction_count(args.from).await?,
        };
        Ok((assemble_tx(chain_id, args, nonce), nonce))
    }

    fn add_signature_to_transaction(
        &self,
        chain_id: u64,
        tx: TxEip1559,
        signature: Signature,
    ) -> Result<TxEnvelope, TransactorError> {
        if tx.chain_id != chain_id {
            return Err(TransactorError::InvalidTxData(format!(
                "transaction built for chain {}, signature attach requested for {}",
                tx.chain_id, chain_id
            )));
        }
        Ok(signing::into_envelope(tx, signature))
    }

    async fn send_transaction_with_signature(
        &self,
        chain_id: u64,
        envelope: &TxEnvelope,
    ) -> Result<B256, TransactorError> {
        let raw = signing::raw_transaction(envelope);
        let local_hash = signing::transaction_hash(&raw);
        let node_hash = self.rpc(chain_id)?.send_raw_transaction(&raw).await?;
        if node_hash != local_hash {
            warn!(%local_hash, %node_hash, chain_id, "node returned unexpected tx hash");
        }
        Ok(local_hash)
    }

    async fn send_transaction_with_chain_id(
        &self,
        _chain_id: u64,
        _args: &SendTxArgs,
        _last_used_nonce: Option<u64>,
        _account: &SignerAccount,
    ) -> Result<(B256, u64), TransactorError> {
        Err(TransactorError::InvalidTxData(
            "local signing is not available; use the build/sign/send flow".into(),
        ))
    }
}

#[async_trait]
impl GasSource for RpcTransactor {
    async fn estimate_gas(&self, chain_id: u64, msg: &CallMsg) -> Result<u64, TransactorError> {
        self.rpc(chain_id)?.estimate_gas(msg).await
    }

    async fn call(&self, chain_id: u64, msg: &CallMsg) -> Result<Bytes, TransactorError> {
        self.rpc(chain_id)?.call(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[test]
    fn nonce_resolution_prefers_pass_sequence() {
        assert_eq!(resolve_nonce(Some(4), Some(9)), Some(5));
        assert_eq!(resolve_nonce(None, Some(9)), Some(9));
        assert_eq!(resolve_nonce(None, None), None);
    }

    #[test]
    fn deployment_args_assemble_to_create() {
        let args = SendTxArgs {
            from: Address::repeat_byte(1),
            to: None,
            value: U256::ZERO,
            gas: 2_000_000,
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
            ..Default::default()
        };
        let tx = assemble_tx(10, &args, 3);
        assert_eq!(tx.to, TxKind::Create);
        assert_eq!(tx.nonce, 3);
        assert_eq!(tx.chain_id, 10);
    }

    #[test]
    fn invalid_fee_settings_are_rejected() {
        let args = SendTxArgs {
            gas: 21_000,
            max_fee_per_gas: 5,
            max_priority_fee_per_gas: 10,
            ..Default::default()
        };
        assert!(matches!(
            RpcTransactor::validate(&args),
            Err(TransactorError::InvalidTxData(_))
        ));
    }
}
