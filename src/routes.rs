// Route and path types
// This file defines the chain-level step (Path) produced by upstream route
// planning, the ordered Route realizing one user-level intent, and the
// community-token parameters a path may carry.

use alloy::primitives::{Address, Bytes, U256};

use crate::processors::ProcessorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
    pub native_currency_symbol: String,
}

impl Network {
    pub fn new(chain_id: u64, name: impl Into<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
            native_currency_symbol: "ETH".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    pub chain_id: u64,
}

impl Token {
    /// The native currency is modelled as the zero address.
    pub fn is_native(&self) -> bool {
        self.address == Address::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommunityTokenType {
    #[default]
    Unknown,
    Erc20,
    Erc721,
}

/// Constructor parameters for a community token deployment.
#[derive(Debug, Clone, Default)]
pub struct DeploymentParameters {
    pub name: String,
    pub symbol: String,
    pub supply: U256,
    pub infinite_supply: bool,
    pub transferable: bool,
    pub remote_self_destruct: bool,
    pub token_uri: String,
    pub owner_token_address: Address,
    pub master_token_address: Address,
    pub decimals: u8,
}

pub const INFINITE_SUPPLY_EXPONENT: usize = 34;

impl DeploymentParameters {
    /// Effective supply passed to the constructor; infinite supply maps to
    /// the registry-wide sentinel of 10^34.
    pub fn effective_supply(&self) -> U256 {
        if self.infinite_supply {
            U256::from(10u8).pow(U256::from(INFINITE_SUPPLY_EXPONENT))
        } else {
            self.supply
        }
    }
}

/// Community-token inputs threaded through a path for the community
/// processor family (deploy, mint, burn, admin ops).
#[derive(Debug, Clone, Default)]
pub struct CommunityParams {
    pub community_id: String,
    /// Ethereum address derived from the community's public key; signs
    /// owner-token deployments.
    pub community_eth_address: Address,
    pub token_type: CommunityTokenType,
    pub token_contract_address: Address,
    pub amount: U256,
    pub signer_pub_key: String,
    pub token_ids: Vec<U256>,
    pub wallet_addresses: Vec<Address>,
    pub token_deployment_signature: Bytes,
    pub deployment: Option<DeploymentParameters>,
    pub owner_token: Option<DeploymentParameters>,
    pub master_token: Option<DeploymentParameters>,
}

impl CommunityParams {
    /// Uniquely identifies community inputs within a path identity.
    pub fn id(&self) -> String {
        format!("{}-{}", self.community_id, self.token_contract_address)
    }
}

/// One chain-level step of a route, bound to one path processor. Produced
/// upstream with precomputed call data, gas and fee fields; the transaction
/// manager only consumes it.
#[derive(Debug, Clone, Default)]
pub struct Path {
    /// UUID of the route input params this path was planned from.
    pub input_params_id: String,
    pub processor: ProcessorKind,
    pub from_chain: Network,
    pub to_chain: Network,
    pub from_token: Option<Token>,
    pub to_token: Option<Token>,
    pub amount_in: U256,
    pub amount_out: U256,

    pub tx_packed_data: Bytes,
    pub tx_nonce: Option<u64>,
    pub tx_max_fees_per_gas: u128,
    pub tx_priority_fee: u128,
    pub tx_gas_amount: u64,

    pub approval_required: bool,
    pub approval_amount_required: U256,
    /// Spender granted the allowance; must equal `used_contract_address`.
    pub approval_contract_address: Option<Address>,
    pub approval_packed_data: Bytes,
    pub approval_tx_nonce: Option<u64>,
    pub approval_max_fees_per_gas: u128,
    pub approval_priority_fee: u128,
    pub approval_gas_amount: u64,

    /// Contract the main transaction is directed at, when not a plain send.
    pub used_contract_address: Option<Address>,
    pub community_params: Option<CommunityParams>,
}

impl Path {
    /// Composite identity: stable across repeated builds of the same route,
    /// used for get-or-init of per-path transaction details.
    pub fn identity(&self) -> String {
        let community_id = self
            .community_params
            .as_ref()
            .map(|c| c.id())
            .unwrap_or_default();
        format!(
            "{}-{}-{}-{}",
            self.input_params_id,
            self.processor.as_str(),
            self.from_chain.chain_id,
            community_id
        )
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::new(0, "")
    }
}

/// Ordered paths realizing one user-level intent.
pub type Route = Vec<Path>;

/// Chain-id pair of the first path, used for error reporting on route-wide
/// failures.
pub fn first_path_chains(route: &Route) -> (u64, u64) {
    route
        .first()
        .map(|p| (p.from_chain.chain_id, p.to_chain.chain_id))
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_identity_is_stable_and_community_scoped() {
        let mut path = Path {
            input_params_id: "uuid-1".into(),
            processor: ProcessorKind::Transfer,
            from_chain: Network::new(1, "mainnet"),
            to_chain: Network::new(1, "mainnet"),
            ..Default::default()
        };
        assert_eq!(path.identity(), path.clone().identity());

        let without_community = path.identity();
        path.community_params = Some(CommunityParams {
            community_id: "c1".into(),
            ..Default::default()
        });
        assert_ne!(path.identity(), without_community);
    }
}
