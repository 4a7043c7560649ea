// Contract registry module
// This file holds the well-known per-chain contract deployments the
// processors direct their calls at

use std::collections::HashMap;

use alloy::primitives::{address, Address};

use crate::errors::RouterError;

pub const ETHEREUM_MAINNET: u64 = 1;
pub const OPTIMISM_MAINNET: u64 = 10;
pub const BASE_MAINNET: u64 = 8453;
pub const ARBITRUM_MAINNET: u64 = 42161;
pub const ETHEREUM_SEPOLIA: u64 = 11155111;
pub const OPTIMISM_SEPOLIA: u64 = 11155420;
pub const ARBITRUM_SEPOLIA: u64 = 421614;
pub const BASE_SEPOLIA: u64 = 84532;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    CommunityDeployer,
    EnsRegistry,
    EnsUsernameRegistrar,
    StickerMarket,
    HopBridge,
    CelerBridge,
    ParaswapRouter,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::CommunityDeployer => "community token deployer",
            ContractKind::EnsRegistry => "ENS registry",
            ContractKind::EnsUsernameRegistrar => "ENS username registrar",
            ContractKind::StickerMarket => "sticker market",
            ContractKind::HopBridge => "Hop bridge",
            ContractKind::CelerBridge => "cBridge",
            ContractKind::ParaswapRouter => "Paraswap router",
        }
    }
}

/// Per-chain deployment addresses, seeded with the registries that are fixed
/// across installations. Bridge and swap-router entries vary by integration
/// and are inserted by the host.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    entries: HashMap<(ContractKind, u64), Address>,
}

impl ContractRegistry {
    // deployments listed at https://github.com/status-im/communities-contracts#deployments
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        let deployers = [
            (ETHEREUM_MAINNET, address!("B3Ef5B0825D5f665bE14394eea41E684CE96A4c5")),
            (OPTIMISM_MAINNET, address!("31463D22750324C8721FF7751584EF62F2ff93b3")),
            (ARBITRUM_MAINNET, address!("744Fd6e98dad09Fb8CCF530B5aBd32B56D64943b")),
            (BASE_MAINNET, address!("898331B756EE1f29302DeF227a4471e960c50612")),
            (ETHEREUM_SEPOLIA, address!("CDE984e57cdb88c70b53437cc694345B646371f9")),
            (ARBITRUM_SEPOLIA, address!("7Ff554af5b6624db2135E4364F416d1D397f43e6")),
            (OPTIMISM_SEPOLIA, address!("cE2A896eEA2F585BC0C3753DC8116BbE2AbaE541")),
            (BASE_SEPOLIA, address!("7Ff554af5b6624db2135E4364F416d1D397f43e6")),
        ];
        for (chain, addr) in deployers {
            registry.insert(ContractKind::CommunityDeployer, chain, addr);
        }
        for chain in [ETHEREUM_MAINNET, ETHEREUM_SEPOLIA] {
            registry.insert(
                ContractKind::EnsRegistry,
                chain,
                address!("00000000000C2E074eC69A0dFb2997BA6C7d2e1e"),
            );
        }
        registry
    }

    pub fn insert(&mut self, kind: ContractKind, chain_id: u64, address: Address) {
        self.entries.insert((kind, chain_id), address);
    }

    pub fn get(&self, kind: ContractKind, chain_id: u64) -> Option<Address> {
        self.entries.get(&(kind, chain_id)).copied()
    }

    pub fn require(&self, kind: ContractKind, chain_id: u64) -> Result<Address, RouterError> {
        self.get(kind, chain_id)
            .ok_or(RouterError::ContractNotAvailable(kind.as_str()))
    }
}
