// Error types and error handling module
// This file defines the typed error catalog for the route-executor crate:
// planning, estimation, signing-protocol, submission and tracking failures,
// plus the per-step context attached to every route-level error.

use alloy::primitives::B256;
use thiserror::Error;

use crate::processors::ProcessorKind;

/// Failures raised by the nonce-and-broadcast transactor and the gas/RPC
/// client. `Rpc` marks transport problems (retriable), `Provider` marks
/// node-side rejections (permanent), so callers can tell a flaky endpoint
/// apart from a validation failure such as nonce-too-low.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactorError {
    #[error("rpc transport error: {0}")]
    Rpc(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("nonce too low")]
    NonceTooLow,
    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    // planning
    #[error("route has no paths")]
    NoRoute,
    #[error("no transactions are being built")]
    NoTransactionsBuilt,
    #[error("unsupported community token type")]
    CommunityTokenType,
    #[error("burn amount exceeds the remaining supply")]
    BurnAmountTooHigh,
    #[error("token deployment signature is required")]
    MissingDeploymentSignature,
    #[error("ENS resolver not found")]
    EnsResolverNotFound,
    #[error("approval spender does not match the transaction contract")]
    ApprovalSpenderMismatch,
    #[error("missing parameter: {0}")]
    MissingParam(&'static str),
    #[error("no processor registered for {0}")]
    ProcessorNotAvailable(&'static str),
    #[error("{0} contract not available on this chain")]
    ContractNotAvailable(&'static str),
    #[error("call data encoding failed: {0}")]
    Encode(String),

    // estimation
    #[error("no gas estimation found")]
    NoEstimationFound,
    #[error("{processor} gas estimation failed: {source}")]
    Estimation {
        processor: &'static str,
        source: TransactorError,
    },

    // signing protocol
    #[error("missing signature for transaction {0}")]
    MissingSignatureForTx(B256),
    #[error("invalid signature details: {0}")]
    InvalidSignatureDetails(String),

    // submission; kept transparent so broadcast failures surface unwrapped
    #[error(transparent)]
    Transactor(#[from] TransactorError),

    // tracking
    #[error("timed out waiting for pending transaction status")]
    WatchPendingTxTimeout,
}

/// A route-level failure annotated with the offending path's processor and
/// chain-id pair, so callers can report "step N on chain X failed" without
/// re-deriving which step it was. Route-wide failures (empty route, signing
/// on an empty state) carry no processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStepError {
    pub processor: Option<ProcessorKind>,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub source: RouterError,
}

impl RouteStepError {
    pub fn for_route(source: RouterError) -> Self {
        Self {
            processor: None,
            from_chain_id: 0,
            to_chain_id: 0,
            source,
        }
    }
}

impl std::fmt::Display for RouteStepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.processor {
            Some(kind) => write!(
                f,
                "{} path (chain {} -> {}): {}",
                kind.as_str(),
                self.from_chain_id,
                self.to_chain_id,
                self.source
            ),
            None => write!(f, "route: {}", self.source),
        }
    }
}

impl std::error::Error for RouteStepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Returned by `SendRouterTransactions` when broadcasting aborts mid-route:
/// carries whatever sent-transaction records were already produced (blockchain
/// submissions are irrevocable, there is no rollback) next to the step error.
#[derive(Debug, Error)]
#[error("{step}")]
pub struct SendRouteError {
    pub sent: Vec<crate::types::RouterSentTransaction>,
    #[source]
    pub step: RouteStepError,
}
