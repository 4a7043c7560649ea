// ENS path processors
// This file implements username registration, release and public key
// updates against the username registrar and public resolver

use std::sync::Arc;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::contracts::{
    ContractKind, ContractRegistry, ETHEREUM_MAINNET, ETHEREUM_SEPOLIA,
};
use crate::errors::RouterError;
use crate::processors::{
    estimation_error, increased_estimation, PathProcessor, ProcessorInputParams, ProcessorKind,
    INCREASE_ESTIMATED_GAS_FACTOR,
};
use crate::transactor::GasSource;
use crate::types::CallMsg;

const USERNAME_DOMAIN: &str = "stateofus.eth";

mod abi {
    use super::sol;
    sol! {
        function register(bytes32 label, address account, bytes32 pubkeyA, bytes32 pubkeyB) external;
        function release(bytes32 label) external;
        function setPubkey(bytes32 node, bytes32 x, bytes32 y) external;
        function resolver(bytes32 node) external view returns (address);
    }
}

/// EIP-137 recursive name hash.
pub fn namehash(name: &str) -> B256 {
    if name.is_empty() {
        return B256::ZERO;
    }
    let mut node = B256::ZERO;
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.as_bytes());
        let mut packed = [0u8; 64];
        packed[..32].copy_from_slice(node.as_slice());
        packed[32..].copy_from_slice(label_hash.as_slice());
        node = keccak256(packed);
    }
    node
}

fn fully_qualified(username: &str) -> String {
    if username.contains('.') {
        username.to_string()
    } else {
        format!("{username}.{USERNAME_DOMAIN}")
    }
}

fn username_label(username: &str) -> B256 {
    let bare = username
        .strip_suffix(&format!(".{USERNAME_DOMAIN}"))
        .unwrap_or(username);
    keccak256(bare.as_bytes())
}

/// Splits an uncompressed secp256k1 public key into its affine coordinates.
/// Accepts the 65-byte 0x04-prefixed form or the raw 64-byte form.
pub fn extract_coordinates(public_key: &str) -> Result<(B256, B256), RouterError> {
    let trimmed = public_key.strip_prefix("0x").unwrap_or(public_key);
    let bytes =
        hex::decode(trimmed).map_err(|e| RouterError::Encode(format!("public key hex: {e}")))?;
    let raw = match bytes.len() {
        65 if bytes[0] == 0x04 => &bytes[1..],
        64 => &bytes[..],
        n => {
            return Err(RouterError::Encode(format!(
                "unexpected public key length {n}"
            )))
        }
    };
    Ok((
        B256::from_slice(&raw[..32]),
        B256::from_slice(&raw[32..]),
    ))
}

fn on_supported_chain(params: &ProcessorInputParams) -> bool {
    matches!(
        params.from_chain.chain_id,
        ETHEREUM_MAINNET | ETHEREUM_SEPOLIA
    )
}

async fn estimate(
    gas: &Arc<dyn GasSource>,
    kind: ProcessorKind,
    params: &ProcessorInputParams,
    to: Option<Address>,
    data: Bytes,
) -> Result<u64, RouterError> {
    let msg = CallMsg {
        from: params.from_addr,
        to,
        value: U256::ZERO,
        data,
    };
    let estimation = gas
        .estimate_gas(params.from_chain.chain_id, &msg)
        .await
        .map_err(|e| estimation_error(kind, e))?;
    Ok(increased_estimation(
        estimation,
        INCREASE_ESTIMATED_GAS_FACTOR,
    ))
}

pub struct EnsRegisterProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
}

impl EnsRegisterProcessor {
    pub fn new(gas: Arc<dyn GasSource>, contracts: Arc<ContractRegistry>) -> Self {
        Self { gas, contracts }
    }
}

#[async_trait]
impl PathProcessor for EnsRegisterProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::EnsRegister
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(on_supported_chain(params))
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        if params.username.is_empty() {
            return Err(RouterError::MissingParam("username"));
        }
        let (x, y) = extract_coordinates(&params.public_key)?;
        Ok(abi::registerCall {
            label: username_label(&params.username),
            account: params.from_addr,
            pubkeyA: x,
            pubkeyB: y,
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let to = self.contract_address(params).await?;
        estimate(&self.gas, self.kind(), params, to, data).await
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        self.contracts
            .require(ContractKind::EnsUsernameRegistrar, params.from_chain.chain_id)
            .map(Some)
    }
}

pub struct EnsReleaseProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
}

impl EnsReleaseProcessor {
    pub fn new(gas: Arc<dyn GasSource>, contracts: Arc<ContractRegistry>) -> Self {
        Self { gas, contracts }
    }
}

#[async_trait]
impl PathProcessor for EnsReleaseProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::EnsRelease
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(on_supported_chain(params))
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        if params.username.is_empty() {
            return Err(RouterError::MissingParam("username"));
        }
        Ok(abi::releaseCall {
            label: username_label(&params.username),
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let to = self.contract_address(params).await?;
        estimate(&self.gas, self.kind(), params, to, data).await
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        self.contracts
            .require(ContractKind::EnsUsernameRegistrar, params.from_chain.chain_id)
            .map(Some)
    }
}

pub struct EnsPublicKeyProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
}

impl EnsPublicKeyProcessor {
    pub fn new(gas: Arc<dyn GasSource>, contracts: Arc<ContractRegistry>) -> Self {
        Self { gas, contracts }
    }

    /// Resolver registered for the username's node, looked up on chain.
    async fn resolver_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Address, RouterError> {
        let registry = self
            .contracts
            .require(ContractKind::EnsRegistry, params.from_chain.chain_id)?;
        let node = namehash(&fully_qualified(&params.username));
        let msg = CallMsg {
            from: params.from_addr,
            to: Some(registry),
            value: U256::ZERO,
            data: abi::resolverCall { node }.abi_encode().into(),
        };
        let returned = self
            .gas
            .call(params.from_chain.chain_id, &msg)
            .await
            .map_err(|e| estimation_error(self.kind(), e))?;
        if returned.len() < 32 {
            return Err(RouterError::EnsResolverNotFound);
        }
        let resolver = Address::from_slice(&returned[12..32]);
        if resolver == Address::ZERO {
            return Err(RouterError::EnsResolverNotFound);
        }
        Ok(resolver)
    }
}

#[async_trait]
impl PathProcessor for EnsPublicKeyProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::EnsPublicKey
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(on_supported_chain(params))
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        if params.username.is_empty() {
            return Err(RouterError::MissingParam("username"));
        }
        let (x, y) = extract_coordinates(&params.public_key)?;
        Ok(abi::setPubkeyCall {
            node: namehash(&fully_qualified(&params.username)),
            x,
            y,
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let to = self.contract_address(params).await?;
        estimate(&self.gas, self.kind(), params, to, data).await
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        self.resolver_address(params).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransactorError;
    use crate::routes::Network;

    #[test]
    fn namehash_matches_reference_vectors() {
        assert_eq!(namehash(""), B256::ZERO);
        assert_eq!(
            namehash("eth"),
            "0x93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn coordinates_accept_both_pubkey_forms() {
        let raw = format!("0x{}{}", "11".repeat(32), "22".repeat(32));
        let prefixed = format!("0x04{}{}", "11".repeat(32), "22".repeat(32));
        assert_eq!(
            extract_coordinates(&raw).unwrap(),
            extract_coordinates(&prefixed).unwrap()
        );
        assert!(extract_coordinates("0x1234").is_err());
    }

    #[test]
    fn label_strips_the_username_domain() {
        assert_eq!(username_label("alice"), username_label("alice.stateofus.eth"));
    }

    struct ZeroResolver;

    #[async_trait]
    impl GasSource for ZeroResolver {
        async fn estimate_gas(
            &self,
            _chain_id: u64,
            _msg: &CallMsg,
        ) -> Result<u64, TransactorError> {
            Ok(50_000)
        }
        async fn call(&self, _chain_id: u64, _msg: &CallMsg) -> Result<Bytes, TransactorError> {
            Ok(vec![0u8; 32].into())
        }
    }

    #[tokio::test]
    async fn missing_resolver_is_an_error() {
        let processor = EnsPublicKeyProcessor::new(
            Arc::new(ZeroResolver),
            Arc::new(ContractRegistry::with_defaults()),
        );
        let params = ProcessorInputParams {
            from_chain: Network::new(ETHEREUM_MAINNET, "mainnet"),
            username: "alice".into(),
            ..Default::default()
        };
        assert!(matches!(
            processor.contract_address(&params).await,
            Err(RouterError::EnsResolverNotFound)
        ));
    }
}
