// Community token path processors
// This file implements the community token family: collectibles and
// assets deployment, owner token deployment through the deployer
// contract, minting, burning and signer key rotation

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;

use crate::contracts::{ContractKind, ContractRegistry};
use crate::errors::RouterError;
use crate::processors::{
    estimation_error, increased_estimation, PathProcessor, ProcessorInputParams, ProcessorKind,
    INCREASE_ESTIMATED_GAS_FACTOR,
};
use crate::routes::{CommunityParams, CommunityTokenType, DeploymentParameters};
use crate::transactor::GasSource;
use crate::transport::jsonrpc::parse_u256;
use crate::types::CallMsg;

/// Assets are always deployed with 18 decimals.
pub const COMMUNITY_DEPLOYMENT_TOKEN_DECIMALS: u8 = 18;

mod abi {
    use super::sol;
    sol! {
        function setMaxSupply(uint256 newMaxSupply) external;
        function maxSupply() external view returns (uint256);
        function mintedCount() external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function remoteBurn(uint256[] tokenIds) external;
        function setSignerPublicKey(bytes newSignerPublicKey) external;
    }
}

mod abi_collectibles {
    use super::sol;
    sol! {
        function mintTo(address[] addresses) external;
    }
}

mod abi_assets {
    use super::sol;
    sol! {
        function mintTo(address[] addresses, uint256[] amounts) external;
    }
}

mod abi_deployer {
    use super::sol;
    sol! {
        struct TokenConfig {
            string name;
            string symbol;
            string baseURI;
        }

        struct DeploymentSignature {
            uint8 v;
            bytes32 r;
            bytes32 s;
            address deployer;
            address signer;
        }

        function deploy(
            TokenConfig ownerToken,
            TokenConfig masterToken,
            DeploymentSignature signature,
            bytes signerPublicKey
        ) external;
    }
}

/// Compiled contract artifacts, supplied by the host build.
#[derive(Debug, Clone, Default)]
pub struct CommunityContracts {
    pub collectibles_bytecode: Bytes,
    pub assets_bytecode: Bytes,
}

fn community(params: &ProcessorInputParams) -> Result<&CommunityParams, RouterError> {
    params
        .community_params
        .as_ref()
        .ok_or(RouterError::MissingParam("community params"))
}

fn deployment(community: &CommunityParams) -> Result<&DeploymentParameters, RouterError> {
    community
        .deployment
        .as_ref()
        .ok_or(RouterError::MissingParam("deployment parameters"))
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

async fn read_supply_value(
    gas: &Arc<dyn GasSource>,
    kind: ProcessorKind,
    chain_id: u64,
    contract: Address,
    selector_call: Bytes,
) -> Result<U256, RouterError> {
    let msg = CallMsg {
        from: Address::ZERO,
        to: Some(contract),
        value: U256::ZERO,
        data: selector_call,
    };
    let returned = gas
        .call(chain_id, &msg)
        .await
        .map_err(|e| estimation_error(kind, e))?;
    parse_u256(&returned).map_err(|e| estimation_error(kind, e))
}

pub struct CommunityDeployCollectiblesProcessor {
    gas: Arc<dyn GasSource>,
    artifacts: Arc<CommunityContracts>,
}

impl CommunityDeployCollectiblesProcessor {
    pub fn new(gas: Arc<dyn GasSource>, artifacts: Arc<CommunityContracts>) -> Self {
        Self { gas, artifacts }
    }
}

#[async_trait]
impl PathProcessor for CommunityDeployCollectiblesProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunityDeployCollectibles
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let deploy = deployment(community(params)?)?;
        let args = (
            deploy.name.clone(),
            deploy.symbol.clone(),
            deploy.effective_supply(),
            deploy.remote_self_destruct,
            deploy.transferable,
            deploy.token_uri.clone(),
            deploy.owner_token_address,
            deploy.master_token_address,
        )
            .abi_encode_params();
        let mut data = self.artifacts.collectibles_bytecode.to_vec();
        data.extend_from_slice(&args);
        Ok(data.into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        estimate(&self.gas, self.kind(), params, None, data).await
    }

    async fn contract_address(
        &self,
        _params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        Ok(None)
    }
}

pub struct CommunityDeployAssetsProcessor {
    gas: Arc<dyn GasSource>,
    artifacts: Arc<CommunityContracts>,
}

impl CommunityDeployAssetsProcessor {
    pub fn new(gas: Arc<dyn GasSource>, artifacts: Arc<CommunityContracts>) -> Self {
        Self { gas, artifacts }
    }
}

#[async_trait]
impl PathProcessor for CommunityDeployAssetsProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunityDeployAssets
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let deploy = deployment(community(params)?)?;
        // the constructor takes uint8; any uint width pads to the same word
        let args = (
            deploy.name.clone(),
            deploy.symbol.clone(),
            u16::from(COMMUNITY_DEPLOYMENT_TOKEN_DECIMALS),
            deploy.effective_supply(),
            deploy.token_uri.clone(),
            deploy.owner_token_address,
            deploy.master_token_address,
        )
            .abi_encode_params();
        let mut data = self.artifacts.assets_bytecode.to_vec();
        data.extend_from_slice(&args);
        Ok(data.into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        estimate(&self.gas, self.kind(), params, None, data).await
    }

    async fn contract_address(
        &self,
        _params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        Ok(None)
    }
}

pub struct CommunityDeployOwnerTokenProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
}

impl CommunityDeployOwnerTokenProcessor {
    pub fn new(gas: Arc<dyn GasSource>, contracts: Arc<ContractRegistry>) -> Self {
        Self { gas, contracts }
    }

    fn token_config(params: &DeploymentParameters) -> abi_deployer::TokenConfig {
        abi_deployer::TokenConfig {
            name: params.name.clone(),
            symbol: params.symbol.clone(),
            baseURI: params.token_uri.clone(),
        }
    }

    fn deployment_signature(
        community: &CommunityParams,
        deployer: Address,
    ) -> Result<abi_deployer::DeploymentSignature, RouterError> {
        let sig = &community.token_deployment_signature;
        if sig.len() != 65 {
            return Err(RouterError::MissingDeploymentSignature);
        }
        Ok(abi_deployer::DeploymentSignature {
            v: sig[64] + 27,
            r: B256::from_slice(&sig[..32]),
            s: B256::from_slice(&sig[32..64]),
            deployer,
            signer: community.community_eth_address,
        })
    }
}

#[async_trait]
impl PathProcessor for CommunityDeployOwnerTokenProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunityDeployOwnerToken
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let community = community(params)?;
        let owner = community
            .owner_token
            .as_ref()
            .ok_or(RouterError::MissingParam("owner token parameters"))?;
        let master = community
            .master_token
            .as_ref()
            .ok_or(RouterError::MissingParam("master token parameters"))?;
        let signer_pub_key = hex::decode(
            community.signer_pub_key.strip_prefix("0x").unwrap_or(&community.signer_pub_key),
        )
        .map_err(|e| RouterError::Encode(format!("signer public key: {e}")))?;
        Ok(abi_deployer::deployCall {
            ownerToken: Self::token_config(owner),
            masterToken: Self::token_config(master),
            signature: Self::deployment_signature(community, params.from_addr)?,
            signerPublicKey: signer_pub_key.into(),
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
            .require(ContractKind::CommunityDeployer, params.from_chain.chain_id)
            .map(Some)
    }
}

/// If two tokens go to addresses [a, b], the collectibles contract expects
/// the flattened table [a, a, b, b].
fn multiply_wallet_addresses(
    amount: U256,
    addresses: &[Address],
) -> Result<Vec<Address>, RouterError> {
    let count = u64::try_from(amount)
        .map_err(|_| RouterError::Encode("mint amount out of range".into()))?;
    let mut result = Vec::with_capacity(addresses.len() * count as usize);
    for address in addresses {
        for _ in 0..count {
            result.push(*address);
        }
    }
    Ok(result)
}

pub struct CommunityMintTokensProcessor {
    gas: Arc<dyn GasSource>,
}

impl CommunityMintTokensProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }
}

#[async_trait]
impl PathProcessor for CommunityMintTokensProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunityMintTokens
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let community = community(params)?;
        match community.token_type {
            CommunityTokenType::Erc721 => {
                let addresses =
                    multiply_wallet_addresses(community.amount, &community.wallet_addresses)?;
                Ok(abi_collectibles::mintToCall { addresses }.abi_encode().into())
            }
            CommunityTokenType::Erc20 => {
                let amounts = vec![community.amount; community.wallet_addresses.len()];
                Ok(abi_assets::mintToCall {
                    addresses: community.wallet_addresses.clone(),
                    amounts,
                }
                .abi_encode()
                .into())
            }
            CommunityTokenType::Unknown => Err(RouterError::CommunityTokenType),
        }
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
        Ok(Some(community(params)?.token_contract_address))
    }
}

pub struct CommunityBurnProcessor {
    gas: Arc<dyn GasSource>,
}

impl CommunityBurnProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }

    async fn max_supply(&self, params: &ProcessorInputParams) -> Result<U256, RouterError> {
        let community = community(params)?;
        read_supply_value(
            &self.gas,
            self.kind(),
            params.from_chain.chain_id,
            community.token_contract_address,
            abi::maxSupplyCall {}.abi_encode().into(),
        )
        .await
    }

    /// Collectibles: max supply minus minted count. Assets: max supply minus
    /// total supply.
    async fn remaining_supply(&self, params: &ProcessorInputParams) -> Result<U256, RouterError> {
        let community = community(params)?;
        let minted_call: Bytes = match community.token_type {
            CommunityTokenType::Erc721 => abi::mintedCountCall {}.abi_encode().into(),
            CommunityTokenType::Erc20 => abi::totalSupplyCall {}.abi_encode().into(),
            CommunityTokenType::Unknown => return Err(RouterError::CommunityTokenType),
        };
        let max_supply = self.max_supply(params).await?;
        let used = read_supply_value(
            &self.gas,
            self.kind(),
            params.from_chain.chain_id,
            community.token_contract_address,
            minted_call,
        )
        .await?;
        Ok(max_supply.saturating_sub(used))
    }
}

#[async_trait]
impl PathProcessor for CommunityBurnProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunityBurn
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let community = community(params)?;
        let remaining = self.remaining_supply(params).await?;
        if community.amount > remaining {
            return Err(RouterError::BurnAmountTooHigh);
        }
        let max_supply = self.max_supply(params).await?;
        Ok(abi::setMaxSupplyCall {
            newMaxSupply: max_supply - community.amount,
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
        Ok(Some(community(params)?.token_contract_address))
    }
}

pub struct CommunityRemoteBurnProcessor {
    gas: Arc<dyn GasSource>,
}

impl CommunityRemoteBurnProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }
}

#[async_trait]
impl PathProcessor for CommunityRemoteBurnProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunityRemoteBurn
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let community = community(params)?;
        // remote burn exists on the collectibles contract only
        if community.token_type != CommunityTokenType::Erc721 {
            return Err(RouterError::CommunityTokenType);
        }
        Ok(abi::remoteBurnCall {
            tokenIds: community.token_ids.clone(),
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
        Ok(Some(community(params)?.token_contract_address))
    }
}

pub struct CommunitySetSignerPubKeyProcessor {
    gas: Arc<dyn GasSource>,
}

impl CommunitySetSignerPubKeyProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }
}

#[async_trait]
impl PathProcessor for CommunitySetSignerPubKeyProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CommunitySetSignerPubKey
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let community = community(params)?;
        let key = hex::decode(
            community.signer_pub_key.strip_prefix("0x").unwrap_or(&community.signer_pub_key),
        )
        .map_err(|e| RouterError::Encode(format!("signer public key: {e}")))?;
        if key.is_empty() {
            return Err(RouterError::MissingParam("signer public key"));
        }
        Ok(abi::setSignerPublicKeyCall {
            newSignerPublicKey: key.into(),
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
        Ok(Some(community(params)?.token_contract_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransactorError;
    use crate::routes::Network;

    /// Answers supply reads by selector: maxSupply 100, mintedCount 60,
    /// totalSupply 75.
    struct SupplyChain;

    #[async_trait]
    impl GasSource for SupplyChain {
        async fn estimate_gas(
            &self,
            _chain_id: u64,
            _msg: &CallMsg,
        ) -> Result<u64, TransactorError> {
            Ok(70_000)
        }

        async fn call(&self, _chain_id: u64, msg: &CallMsg) -> Result<Bytes, TransactorError> {
            let selector: [u8; 4] = msg.data[..4].try_into().unwrap();
            let value = if selector == abi::maxSupplyCall::SELECTOR {
                100u64
            } else if selector == abi::mintedCountCall::SELECTOR {
                60
            } else if selector == abi::totalSupplyCall::SELECTOR {
                75
            } else {
                return Err(TransactorError::Provider("unexpected call".into()));
            };
            Ok(U256::from(value).abi_encode().into())
        }
    }

    fn burn_params(token_type: CommunityTokenType, amount: u64) -> ProcessorInputParams {
        ProcessorInputParams {
            from_chain: Network::new(10, "optimism"),
            community_params: Some(CommunityParams {
                community_id: "c1".into(),
                token_type,
                token_contract_address: Address::repeat_byte(9),
                amount: U256::from(amount),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn burn_rejects_amounts_above_remaining_supply() {
        let processor = CommunityBurnProcessor::new(Arc::new(SupplyChain));
        // collectibles: remaining = 100 - 60 = 40
        let result = processor
            .pack_tx_input_data(&burn_params(CommunityTokenType::Erc721, 41))
            .await;
        assert!(matches!(result, Err(RouterError::BurnAmountTooHigh)));
    }

    #[tokio::test]
    async fn burn_packs_the_lowered_max_supply() {
        let processor = CommunityBurnProcessor::new(Arc::new(SupplyChain));
        let data = processor
            .pack_tx_input_data(&burn_params(CommunityTokenType::Erc721, 40))
            .await
            .unwrap();
        let call = abi::setMaxSupplyCall::abi_decode(&data).unwrap();
        assert_eq!(call.newMaxSupply, U256::from(60u64));
    }

    #[tokio::test]
    async fn asset_burn_uses_total_supply() {
        let processor = CommunityBurnProcessor::new(Arc::new(SupplyChain));
        // assets: remaining = 100 - 75 = 25
        assert!(processor
            .pack_tx_input_data(&burn_params(CommunityTokenType::Erc20, 26))
            .await
            .is_err());
        assert!(processor
            .pack_tx_input_data(&burn_params(CommunityTokenType::Erc20, 25))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn mint_multiplies_collectible_recipients() {
        let addresses = multiply_wallet_addresses(
            U256::from(2u64),
            &[Address::repeat_byte(1), Address::repeat_byte(2)],
        )
        .unwrap();
        assert_eq!(
            addresses,
            vec![
                Address::repeat_byte(1),
                Address::repeat_byte(1),
                Address::repeat_byte(2),
                Address::repeat_byte(2),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_token_type_is_rejected() {
        let processor = CommunityMintTokensProcessor::new(Arc::new(SupplyChain));
        let result = processor
            .pack_tx_input_data(&burn_params(CommunityTokenType::Unknown, 1))
            .await;
        assert!(matches!(result, Err(RouterError::CommunityTokenType)));
    }

    #[tokio::test]
    async fn owner_token_deploy_requires_a_signature() {
        let processor = CommunityDeployOwnerTokenProcessor::new(
            Arc::new(SupplyChain),
            Arc::new(ContractRegistry::with_defaults()),
        );
        let mut params = burn_params(CommunityTokenType::Erc721, 0);
        {
            let community = params.community_params.as_mut().unwrap();
            community.owner_token = Some(DeploymentParameters::default());
            community.master_token = Some(DeploymentParameters::default());
        }
        let result = processor.pack_tx_input_data(&params).await;
        assert!(matches!(
            result,
            Err(RouterError::MissingDeploymentSignature)
        ));
    }

    #[tokio::test]
    async fn assets_deploy_appends_constructor_args_with_fixed_decimals() {
        let processor = CommunityDeployAssetsProcessor::new(
            Arc::new(SupplyChain),
            Arc::new(CommunityContracts {
                collectibles_bytecode: Bytes::new(),
                assets_bytecode: vec![0xfe].into(),
            }),
        );
        let mut params = burn_params(CommunityTokenType::Erc20, 0);
        params.community_params.as_mut().unwrap().deployment =
            Some(DeploymentParameters {
                name: "Asset".into(),
                symbol: "AST".into(),
                supply: U256::from(1_000u64),
                token_uri: "ipfs://asset".into(),
                ..Default::default()
            });
        let data = processor.pack_tx_input_data(&params).await.unwrap();
        assert_eq!(data[0], 0xfe);
        let decoded =
            <(String, String, u16, U256, String, Address, Address)>::abi_decode_params(&data[1..])
                .unwrap();
        assert_eq!(decoded.0, "Asset");
        assert_eq!(decoded.2, u16::from(COMMUNITY_DEPLOYMENT_TOKEN_DECIMALS));
        assert_eq!(decoded.3, U256::from(1_000u64));
    }

    #[tokio::test]
    async fn collectibles_deploy_has_no_recipient() {
        let processor = CommunityDeployCollectiblesProcessor::new(
            Arc::new(SupplyChain),
            Arc::new(CommunityContracts {
                collectibles_bytecode: vec![0x60, 0x80].into(),
                assets_bytecode: Bytes::new(),
            }),
        );
        let mut params = burn_params(CommunityTokenType::Erc721, 0);
        params.community_params.as_mut().unwrap().deployment =
            Some(DeploymentParameters {
                name: "Coll".into(),
                symbol: "CLL".into(),
                supply: U256::from(10u64),
                ..Default::default()
            });
        let data = processor.pack_tx_input_data(&params).await.unwrap();
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(processor.contract_address(&params).await.unwrap(), None);
    }
}
