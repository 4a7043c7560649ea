// Route transaction manager
// This file drives a planned route through its lifecycle: building
// unsigned transactions with sequenced nonces, attaching external
// signatures, broadcasting in path order and tracking the results

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, B256, U256};
use tracing::{debug, info};

use crate::errors::{RouteStepError, RouterError, SendRouteError};
use crate::metrics::{SEND_ERRORS, TX_BUILT, TX_SENT};
use crate::processors::{ProcessorInputParams, ProcessorKind, ProcessorRegistry};
use crate::routes::{Path, Route};
use crate::signing;
use crate::transactor::{AccountResolver, Transactor};
use crate::types::{
    MultiTransaction, MultiTransactionId, MultiTransactionType, MultiTxIdSource,
    RouterSentTransaction, RouterTransactionDetails, SendTxArgs, SignatureDetails, SigningDetails,
    TransactionData,
};
use crate::watcher::{PendingEntry, PendingTxTracker, TxStatus};

/// Owns the per-route transaction state between `build`, `sign` and `send`.
/// One route per account at a time; callers clear the state before reusing
/// the manager for a new route.
pub struct TransactionManager {
    transactor: Arc<dyn Transactor>,
    account_resolver: Arc<dyn AccountResolver>,
    processors: ProcessorRegistry,
    tracker: PendingTxTracker,
    id_source: Arc<dyn MultiTxIdSource>,
    /// Processor names beyond the built-in set whose main transaction is
    /// deferred until the approval confirms.
    approval_confirmation_overrides: HashSet<String>,
    router_transactions: Vec<RouterTransactionDetails>,
}

impl TransactionManager {
    pub fn new(
        transactor: Arc<dyn Transactor>,
        account_resolver: Arc<dyn AccountResolver>,
        processors: ProcessorRegistry,
        tracker: PendingTxTracker,
        id_source: Arc<dyn MultiTxIdSource>,
        approval_confirmation_overrides: HashSet<String>,
    ) -> Self {
        Self {
            transactor,
            account_resolver,
            processors,
            tracker,
            id_source,
            approval_confirmation_overrides,
            router_transactions: Vec::new(),
        }
    }

    pub fn clear_local_router_transactions_data(&mut self) {
        self.router_transactions.clear();
    }

    pub fn router_transactions(&self) -> &[RouterTransactionDetails] {
        &self.router_transactions
    }

    pub fn approval_required_for_path(&self, kind: ProcessorKind) -> bool {
        self.router_transactions
            .iter()
            .any(|d| d.router_path.processor == kind && d.router_path.approval_required)
    }

    pub fn approval_placed_for_path(&self, kind: ProcessorKind) -> bool {
        self.router_transactions
            .iter()
            .any(|d| d.router_path.processor == kind && d.is_approval_placed())
    }

    pub fn tx_placed_for_path(&self, kind: ProcessorKind) -> bool {
        self.router_transactions
            .iter()
            .any(|d| d.router_path.processor == kind && d.is_tx_placed())
    }

    fn requires_approval_confirmation(&self, kind: ProcessorKind) -> bool {
        kind.requires_approval_confirmation()
            || self.approval_confirmation_overrides.contains(kind.as_str())
    }

    /// Index of the details entry for this path identity, creating it on
    /// first reference. Repeat builds of the same route reuse entries.
    fn ensure_details_for_path(&mut self, path: &Path) -> usize {
        let identity = path.identity();
        if let Some(idx) = self
            .router_transactions
            .iter()
            .position(|d| d.router_path.identity() == identity)
        {
            return idx;
        }
        self.router_transactions
            .push(RouterTransactionDetails::new(path.clone()));
        self.router_transactions.len() - 1
    }

    /// Builds every buildable transaction of the route in path order, one
    /// nonce sequence per chain, and returns the signing request. Fails fast
    /// on the first path error; transactions built so far stay recorded.
    pub async fn build_transactions_from_route(
        &mut self,
        route: &Route,
        params: &ProcessorInputParams,
    ) -> Result<SigningDetails, RouteStepError> {
        if route.is_empty() {
            return Err(RouteStepError::for_route(RouterError::NoRoute));
        }

        let account = self
            .account_resolver
            .resolve(params.from_addr)
            .map_err(|e| RouteStepError::for_route(RouterError::Transactor(e)))?;
        let mut response = SigningDetails {
            address: account.address,
            derivation_path: account.derivation_path,
            key_uid: account.key_uid,
            sign_on_keycard: account.sign_on_keycard,
            hashes: Vec::new(),
        };

        let mut used_nonces: HashMap<u64, u64> = HashMap::new();
        for path in route {
            let step = |source: RouterError| RouteStepError {
                processor: Some(path.processor),
                from_chain_id: path.from_chain.chain_id,
                to_chain_id: path.to_chain.chain_id,
                source,
            };
            if !self.processors.contains(path.processor) {
                return Err(step(RouterError::ProcessorNotAvailable(
                    path.processor.as_str(),
                )));
            }

            let approval_placed = self.approval_placed_for_path(path.processor);
            let idx = self.ensure_details_for_path(path);

            // the approval always goes first for a path that needs one
            if path.approval_required && !approval_placed {
                let tx_data =
                    build_approval_tx_for_path(&*self.transactor, path, params.from_addr, &mut used_nonces)
                        .await
                        .map_err(step)?;
                response.hashes.push(tx_data.hash_to_sign);
                TX_BUILT.with_label_values(&[path.processor.as_str()]).inc();
                self.router_transactions[idx].approval_tx_data = Some(tx_data);

                // the main swap spends the allowance; it cannot be built
                // until the approval is mined
                if self.requires_approval_confirmation(path.processor) {
                    continue;
                }
            }

            let tx_data =
                build_tx_for_path(&*self.transactor, path, params, &mut used_nonces)
                    .await
                    .map_err(step)?;
            response.hashes.push(tx_data.hash_to_sign);
            TX_BUILT.with_label_values(&[path.processor.as_str()]).inc();
            self.router_transactions[idx].tx_data = Some(tx_data);
        }

        info!(
            paths = route.len(),
            hashes = response.hashes.len(),
            "built route transactions"
        );
        Ok(response)
    }

    /// Attaches externally produced signatures to every unplaced built
    /// transaction. Pure bookkeeping; nothing is broadcast.
    pub fn validate_and_add_signatures_to_router_transactions(
        &mut self,
        signatures: &HashMap<B256, SignatureDetails>,
    ) -> Result<(), RouteStepError> {
        if self.router_transactions.is_empty() {
            return Err(RouteStepError::for_route(RouterError::NoTransactionsBuilt));
        }

        for details in &mut self.router_transactions {
            let step = |source: RouterError| RouteStepError {
                processor: Some(details.router_path.processor),
                from_chain_id: details.router_path.from_chain.chain_id,
                to_chain_id: details.router_path.to_chain.chain_id,
                source,
            };
            attach_signature(&mut details.approval_tx_data, signatures).map_err(step)?;
            attach_signature(&mut details.tx_data, signatures).map_err(step)?;
        }
        Ok(())
    }

    /// Mints the user-level record the sent transactions are correlated
    /// under.
    pub fn create_multi_transaction(
        &self,
        ty: MultiTransactionType,
        from_address: Address,
        to_address: Address,
        from_asset: String,
        to_asset: String,
        from_amount: U256,
        to_amount: U256,
    ) -> MultiTransaction {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        MultiTransaction {
            id: self.id_source.next_id(),
            ty,
            from_address,
            to_address,
            from_asset,
            to_asset,
            from_amount,
            to_amount,
            timestamp,
            cross_tx_id: String::new(),
        }
    }

    /// Broadcasts the signed transactions in path order, approval before
    /// main. Aborts on the first failure; submissions already accepted are
    /// not rolled back and their records ride along in the error.
    pub async fn send_router_transactions(
        &mut self,
        multi_tx: &MultiTransaction,
    ) -> Result<Vec<RouterSentTransaction>, SendRouteError> {
        let mut sent: Vec<RouterSentTransaction> = Vec::new();

        for idx in 0..self.router_transactions.len() {
            let (kind, from_chain_id, to_chain_id) = {
                let path = &self.router_transactions[idx].router_path;
                (
                    path.processor,
                    path.from_chain.chain_id,
                    path.to_chain.chain_id,
                )
            };
            let step = |source: RouterError| RouteStepError {
                processor: Some(kind),
                from_chain_id,
                to_chain_id,
                source,
            };

            let approval_pending = self.router_transactions[idx].approval_tx_data.is_some()
                && !self.router_transactions[idx].is_approval_placed();
            if approval_pending {
                let result = self.send_one(idx, true, multi_tx.id).await;
                match result {
                    Ok(record) => sent.push(record),
                    Err(source) => {
                        SEND_ERRORS.with_label_values(&[kind.as_str()]).inc();
                        return Err(SendRouteError {
                            sent,
                            step: step(source),
                        });
                    }
                }

                // deferred swap leg is built in a later pass, once the
                // approval is mined
                if self.requires_approval_confirmation(kind) {
                    continue;
                }
            }

            let tx_pending = self.router_transactions[idx].tx_data.is_some()
                && !self.router_transactions[idx].is_tx_placed();
            if tx_pending {
                let result = self.send_one(idx, false, multi_tx.id).await;
                match result {
                    Ok(record) => sent.push(record),
                    Err(source) => {
                        SEND_ERRORS.with_label_values(&[kind.as_str()]).inc();
                        return Err(SendRouteError {
                            sent,
                            step: step(source),
                        });
                    }
                }
            }
        }

        info!(count = sent.len(), multi_tx_id = multi_tx.id.0, "route transactions sent");
        Ok(sent)
    }

    async fn send_one(
        &mut self,
        idx: usize,
        approval: bool,
        multi_tx_id: MultiTransactionId,
    ) -> Result<RouterSentTransaction, RouterError> {
        let kind = self.router_transactions[idx].router_path.processor;
        let transactor = Arc::clone(&self.transactor);

        let details = &mut self.router_transactions[idx];
        let tx_data = if approval {
            details.approval_tx_data.as_mut()
        } else {
            details.tx_data.as_mut()
        };
        let tx_data = tx_data.ok_or(RouterError::NoTransactionsBuilt)?;

        let signature = tx_data
            .signature
            .ok_or(RouterError::MissingSignatureForTx(tx_data.hash_to_sign))?;
        let chain_id = tx_data.tx_args.from_chain_id;
        let envelope =
            transactor.add_signature_to_transaction(chain_id, tx_data.tx.clone(), signature)?;
        let hash = transactor
            .send_transaction_with_signature(chain_id, &envelope)
            .await?;

        tx_data.sent_hash = Some(hash);
        tx_data.tx_args.multi_transaction_id = Some(multi_tx_id);
        // deployments get their future contract address as the recipient
        if tx_data.tx_args.to.is_none() {
            tx_data.tx_args.to = Some(tx_data.tx_args.from.create(tx_data.tx.nonce));
        }

        TX_SENT.with_label_values(&[kind.as_str()]).inc();
        debug!(%hash, chain_id, approval, "route transaction sent");

        let record = RouterSentTransaction::from_args(&tx_data.tx_args, hash, approval);
        let entry = PendingEntry {
            chain_id,
            hash,
            from: tx_data.tx_args.from,
            multi_transaction_id: Some(multi_tx_id),
        };
        self.tracker.store_and_track(entry).await;
        Ok(record)
    }

    /// Blocks until the transaction reports any status, or the tracker's
    /// deadline passes.
    pub async fn watch_transaction(
        &self,
        chain_id: u64,
        hash: B256,
    ) -> Result<TxStatus, RouterError> {
        self.tracker.watch(chain_id, hash).await
    }

    pub fn tracker(&self) -> &PendingTxTracker {
        &self.tracker
    }
}

fn attach_signature(
    tx_data: &mut Option<TransactionData>,
    signatures: &HashMap<B256, SignatureDetails>,
) -> Result<(), RouterError> {
    let Some(tx_data) = tx_data else {
        return Ok(());
    };
    if tx_data.is_placed() {
        return Ok(());
    }
    let details = signatures
        .get(&tx_data.hash_to_sign)
        .ok_or(RouterError::MissingSignatureForTx(tx_data.hash_to_sign))?;
    tx_data.signature = Some(details.to_signature()?);
    Ok(())
}

fn last_used_nonce(used_nonces: &HashMap<u64, u64>, chain_id: u64) -> Option<u64> {
    used_nonces.get(&chain_id).copied()
}

/// Send args for a path's approval leg: directed at the token contract,
/// zero value, allowance call data planned upstream.
fn approval_send_args(path: &Path, from: Address) -> Result<SendTxArgs, RouterError> {
    let token = path
        .from_token
        .as_ref()
        .ok_or(RouterError::MissingParam("from token"))?;
    let spender = path
        .approval_contract_address
        .ok_or(RouterError::MissingParam("approval contract address"))?;
    if path.used_contract_address != Some(spender) {
        return Err(RouterError::ApprovalSpenderMismatch);
    }
    Ok(SendTxArgs {
        from,
        to: Some(token.address),
        value: U256::ZERO,
        data: path.approval_packed_data.clone(),
        nonce: path.approval_tx_nonce,
        gas: path.approval_gas_amount,
        max_fee_per_gas: path.approval_max_fees_per_gas,
        max_priority_fee_per_gas: path.approval_priority_fee,
        from_chain_id: path.from_chain.chain_id,
        to_chain_id: path.from_chain.chain_id,
        from_token_id: token.symbol.clone(),
        ..Default::default()
    })
}

/// Send args for a path's main leg, applying the recipient rules: raw
/// deployments carry no recipient, non-native send-type operations go to
/// the token contract with zero value, community admin operations go to
/// the contract the path names.
fn send_args_for_path(
    path: &Path,
    params: &ProcessorInputParams,
) -> Result<SendTxArgs, RouterError> {
    let kind = path.processor;
    let mut args = SendTxArgs {
        from: params.from_addr,
        to: (!kind.is_contract_deployment()).then_some(params.to_addr),
        value: path.amount_in,
        data: path.tx_packed_data.clone(),
        nonce: path.tx_nonce,
        gas: path.tx_gas_amount,
        max_fee_per_gas: path.tx_max_fees_per_gas,
        max_priority_fee_per_gas: path.tx_priority_fee,
        from_chain_id: path.from_chain.chain_id,
        to_chain_id: path.to_chain.chain_id,
        value_in: path.amount_in,
        value_out: path.amount_out,
        slippage_percentage: params.slippage_percentage,
        ..Default::default()
    };

    if let Some(token) = &path.from_token {
        args.from_token_id = token.symbol.clone();
        args.to_contract_address = Some(token.address);

        if !token.is_native() {
            args.value = U256::ZERO;
            if kind.sends_to_token_contract() {
                args.to = Some(token.address);
            }
        } else if kind.is_community_admin() {
            let contract = path
                .used_contract_address
                .ok_or(RouterError::MissingParam("used contract address"))?;
            args.to = Some(contract);
            args.to_contract_address = Some(contract);
        }
    }
    if let Some(token) = &path.to_token {
        args.to_token_id = token.symbol.clone();
    }
    Ok(args)
}

async fn build_approval_tx_for_path(
    transactor: &dyn Transactor,
    path: &Path,
    from: Address,
    used_nonces: &mut HashMap<u64, u64>,
) -> Result<TransactionData, RouterError> {
    if path.approval_gas_amount == 0 {
        return Err(RouterError::NoEstimationFound);
    }
    let args = approval_send_args(path, from)?;
    let chain_id = path.from_chain.chain_id;
    let (tx, used_nonce) = transactor
        .validate_and_build_transaction(chain_id, &args, last_used_nonce(used_nonces, chain_id))
        .await?;
    used_nonces.insert(chain_id, used_nonce);
    let hash_to_sign = signing::hash_to_sign(&tx);
    Ok(TransactionData {
        tx_args: args,
        tx,
        hash_to_sign,
        signature: None,
        sent_hash: None,
    })
}

async fn build_tx_for_path(
    transactor: &dyn Transactor,
    path: &Path,
    params: &ProcessorInputParams,
    used_nonces: &mut HashMap<u64, u64>,
) -> Result<TransactionData, RouterError> {
    if path.tx_gas_amount == 0 {
        return Err(RouterError::NoEstimationFound);
    }
    let args = send_args_for_path(path, params)?;
    let chain_id = path.from_chain.chain_id;
    let (tx, used_nonce) = transactor
        .validate_and_build_transaction(chain_id, &args, last_used_nonce(used_nonces, chain_id))
        .await?;
    used_nonces.insert(chain_id, used_nonce);
    let hash_to_sign = signing::hash_to_sign(&tx);
    Ok(TransactionData {
        tx_args: args,
        tx,
        hash_to_sign,
        signature: None,
        sent_hash: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{Network, Token};

    fn token(native: bool) -> Token {
        Token {
            symbol: if native { "ETH".into() } else { "DAI".into() },
            address: if native {
                Address::ZERO
            } else {
                Address::repeat_byte(3)
            },
            decimals: 18,
            chain_id: 1,
        }
    }

    fn base_path(kind: ProcessorKind, native_token: bool) -> Path {
        Path {
            input_params_id: "req-1".into(),
            processor: kind,
            from_chain: Network::new(1, "mainnet"),
            to_chain: Network::new(1, "mainnet"),
            from_token: Some(token(native_token)),
            amount_in: U256::from(100u64),
            amount_out: U256::from(100u64),
            tx_gas_amount: 21_000,
            tx_max_fees_per_gas: 50,
            tx_priority_fee: 2,
            ..Default::default()
        }
    }

    fn input_params() -> ProcessorInputParams {
        ProcessorInputParams {
            from_addr: Address::repeat_byte(1),
            to_addr: Address::repeat_byte(2),
            ..Default::default()
        }
    }

    #[test]
    fn erc20_transfer_goes_to_the_token_contract() {
        let args = send_args_for_path(&base_path(ProcessorKind::Transfer, false), &input_params())
            .unwrap();
        assert_eq!(args.to, Some(Address::repeat_byte(3)));
        assert_eq!(args.value, U256::ZERO);
        assert_eq!(args.value_in, U256::from(100u64));
    }

    #[test]
    fn native_transfer_keeps_the_recipient_and_value() {
        let args = send_args_for_path(&base_path(ProcessorKind::Transfer, true), &input_params())
            .unwrap();
        assert_eq!(args.to, Some(Address::repeat_byte(2)));
        assert_eq!(args.value, U256::from(100u64));
    }

    #[test]
    fn deployment_carries_no_recipient() {
        let args = send_args_for_path(
            &base_path(ProcessorKind::CommunityDeployCollectibles, true),
            &input_params(),
        )
        .unwrap();
        assert_eq!(args.to, None);
    }

    #[test]
    fn community_admin_targets_the_named_contract() {
        let mut path = base_path(ProcessorKind::CommunityMintTokens, true);
        path.used_contract_address = Some(Address::repeat_byte(9));
        let args = send_args_for_path(&path, &input_params()).unwrap();
        assert_eq!(args.to, Some(Address::repeat_byte(9)));
        assert_eq!(args.to_contract_address, Some(Address::repeat_byte(9)));
    }

    #[test]
    fn approval_spender_must_match_the_tx_contract() {
        let mut path = base_path(ProcessorKind::Paraswap, false);
        path.approval_required = true;
        path.approval_contract_address = Some(Address::repeat_byte(0xaa));
        path.used_contract_address = Some(Address::repeat_byte(0xbb));
        assert!(matches!(
            approval_send_args(&path, Address::repeat_byte(1)),
            Err(RouterError::ApprovalSpenderMismatch)
        ));

        path.used_contract_address = Some(Address::repeat_byte(0xaa));
        let args = approval_send_args(&path, Address::repeat_byte(1)).unwrap();
        assert_eq!(args.to, Some(Address::repeat_byte(3)));
        assert_eq!(args.value, U256::ZERO);
    }
}
