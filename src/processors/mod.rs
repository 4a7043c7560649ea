// Path processor module
// This file defines the processor kind enum, the strategy trait every
// chain-operation implements, and the registry the manager dispatches on

pub mod bridge_celer;
pub mod bridge_hop;
pub mod community;
pub mod ens;
pub mod nft;
pub mod stickers;
pub mod swap_paraswap;
pub mod transfer;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use crate::errors::{RouterError, TransactorError};
use crate::routes::{CommunityParams, Network, Token};

/// Headroom applied to node gas estimates.
pub const INCREASE_ESTIMATED_GAS_FACTOR: f64 = 1.05;
/// Bridges get extra headroom; their gas use varies with L1 data costs.
pub const INCREASE_ESTIMATED_GAS_FACTOR_FOR_BRIDGES: f64 = 1.2;

pub(crate) fn increased_estimation(estimation: u64, factor: f64) -> u64 {
    (estimation as f64 * factor) as u64
}

pub(crate) fn estimation_error(
    processor: ProcessorKind,
    source: TransactorError,
) -> RouterError {
    RouterError::Estimation {
        processor: processor.as_str(),
        source,
    }
}

/// Closed set of chain operations a path can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessorKind {
    #[default]
    Transfer,
    Hop,
    CBridge,
    Paraswap,
    Erc721Transfer,
    Erc1155Transfer,
    EnsRegister,
    EnsRelease,
    EnsPublicKey,
    StickersBuy,
    CommunityDeployCollectibles,
    CommunityDeployAssets,
    CommunityDeployOwnerToken,
    CommunityBurn,
    CommunityMintTokens,
    CommunityRemoteBurn,
    CommunitySetSignerPubKey,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Transfer => "Transfer",
            ProcessorKind::Hop => "Hop",
            ProcessorKind::CBridge => "CBridge",
            ProcessorKind::Paraswap => "Paraswap",
            ProcessorKind::Erc721Transfer => "ERC721Transfer",
            ProcessorKind::Erc1155Transfer => "ERC1155Transfer",
            ProcessorKind::EnsRegister => "ENSRegister",
            ProcessorKind::EnsRelease => "ENSRelease",
            ProcessorKind::EnsPublicKey => "ENSPublicKey",
            ProcessorKind::StickersBuy => "StickersBuy",
            ProcessorKind::CommunityDeployCollectibles => "CommunityDeployCollectibles",
            ProcessorKind::CommunityDeployAssets => "CommunityDeployAssets",
            ProcessorKind::CommunityDeployOwnerToken => "CommunityDeployOwnerToken",
            ProcessorKind::CommunityBurn => "CommunityBurn",
            ProcessorKind::CommunityMintTokens => "CommunityMintTokens",
            ProcessorKind::CommunityRemoteBurn => "CommunityRemoteBurn",
            ProcessorKind::CommunitySetSignerPubKey => "CommunitySetSignerPubKey",
        }
    }

    /// Collectibles and assets deploy raw bytecode; the transaction carries
    /// no recipient. Owner-token deployment goes through the deployer
    /// contract and is not in this set.
    pub fn is_contract_deployment(&self) -> bool {
        matches!(
            self,
            ProcessorKind::CommunityDeployCollectibles | ProcessorKind::CommunityDeployAssets
        )
    }

    /// Send-type operations whose non-native leg is directed at the token
    /// contract with zero value.
    pub fn sends_to_token_contract(&self) -> bool {
        matches!(
            self,
            ProcessorKind::Transfer
                | ProcessorKind::StickersBuy
                | ProcessorKind::EnsRegister
                | ProcessorKind::EnsRelease
                | ProcessorKind::EnsPublicKey
                | ProcessorKind::Erc721Transfer
                | ProcessorKind::Erc1155Transfer
        )
    }

    /// Community admin operations are directed at the contract the path
    /// names in `used_contract_address`.
    pub fn is_community_admin(&self) -> bool {
        matches!(
            self,
            ProcessorKind::CommunityDeployOwnerToken
                | ProcessorKind::CommunityMintTokens
                | ProcessorKind::CommunityRemoteBurn
                | ProcessorKind::CommunityBurn
                | ProcessorKind::CommunitySetSignerPubKey
        )
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self, ProcessorKind::Hop | ProcessorKind::CBridge)
    }

    /// Swap integrations whose main transaction cannot be built until the
    /// allowance it consumes is confirmed on chain.
    pub fn requires_approval_confirmation(&self) -> bool {
        matches!(self, ProcessorKind::Paraswap)
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs a processor needs to pack call data and estimate gas. Planned
/// upstream; the manager passes them through unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProcessorInputParams {
    pub from_addr: Address,
    pub to_addr: Address,
    pub from_chain: Network,
    pub to_chain: Network,
    pub from_token: Option<Token>,
    pub to_token: Option<Token>,
    pub amount_in: U256,
    pub amount_out: U256,
    /// ERC-721/1155 token id, or sticker pack id.
    pub token_id: U256,
    /// ENS username, without the domain suffix.
    pub username: String,
    /// Compressed public key for the ENS pubkey operation, hex with 0x.
    pub public_key: String,
    pub community_params: Option<CommunityParams>,
    /// Accepted slippage for swaps, in percent.
    pub slippage_percentage: f32,
}

/// One chain operation strategy. Packing and address resolution are pure;
/// estimation and amount-out may reach the chain through the gas source the
/// processor was constructed with.
#[async_trait]
pub trait PathProcessor: Send + Sync {
    fn kind(&self) -> ProcessorKind;

    /// See `ProcessorKind::requires_approval_confirmation`; individual
    /// processors may widen this based on construction-time settings.
    fn requires_approval_confirmation(&self) -> bool {
        self.kind().requires_approval_confirmation()
    }

    fn available_for(&self, _params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(true)
    }

    /// (protocol fee, bonder fee) in wei.
    fn calculate_fees(&self, _params: &ProcessorInputParams) -> Result<(U256, U256), RouterError> {
        Ok((U256::ZERO, U256::ZERO))
    }

    /// Async because some integrations pack against live chain state (supply
    /// reads, aggregator quotes).
    async fn pack_tx_input_data(&self, params: &ProcessorInputParams)
        -> Result<Bytes, RouterError>;

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError>;

    /// Contract the main transaction is directed at; `None` for plain sends
    /// and raw deployments. Async because ENS paths resolve it on chain.
    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError>;

    async fn calculate_amount_out(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<U256, RouterError> {
        Ok(params.amount_in)
    }
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ProcessorKind, Arc<dyn PathProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn PathProcessor>) {
        self.processors.insert(processor.kind(), processor);
    }

    pub fn get(&self, kind: ProcessorKind) -> Result<&Arc<dyn PathProcessor>, RouterError> {
        self.processors
            .get(&kind)
            .ok_or(RouterError::ProcessorNotAvailable(kind.as_str()))
    }

    pub fn contains(&self, kind: ProcessorKind) -> bool {
        self.processors.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_predicates_partition_the_recipient_rules() {
        assert!(ProcessorKind::CommunityDeployAssets.is_contract_deployment());
        assert!(!ProcessorKind::CommunityDeployOwnerToken.is_contract_deployment());
        assert!(ProcessorKind::CommunityDeployOwnerToken.is_community_admin());
        assert!(ProcessorKind::Transfer.sends_to_token_contract());
        assert!(ProcessorKind::Erc1155Transfer.sends_to_token_contract());
        assert!(!ProcessorKind::Paraswap.sends_to_token_contract());
        assert!(ProcessorKind::Hop.is_bridge());
        assert!(ProcessorKind::Paraswap.requires_approval_confirmation());
        assert!(!ProcessorKind::CBridge.requires_approval_confirmation());
    }

    #[test]
    fn registry_reports_missing_processor() {
        let registry = ProcessorRegistry::new();
        assert!(matches!(
            registry.get(ProcessorKind::Hop),
            Err(RouterError::ProcessorNotAvailable("Hop"))
        ));
    }
}
