// Sticker pack purchase path processor
// This file packs sticker market buys paid in the network's utility token

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
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

mod abi {
    use super::sol;
    sol! {
        function buyToken(uint256 packId, address address_, uint256 price) external returns (uint256);
    }
}

pub struct StickersBuyProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
}

impl StickersBuyProcessor {
    pub fn new(gas: Arc<dyn GasSource>, contracts: Arc<ContractRegistry>) -> Self {
        Self { gas, contracts }
    }
}

#[async_trait]
impl PathProcessor for StickersBuyProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::StickersBuy
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(matches!(
            params.from_chain.chain_id,
            ETHEREUM_MAINNET | ETHEREUM_SEPOLIA
        ))
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        Ok(abi::buyTokenCall {
            packId: params.token_id,
            address_: params.from_addr,
            price: params.amount_in,
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let msg = CallMsg {
            from: params.from_addr,
            to: self.contract_address(params).await?,
            value: U256::ZERO,
            data,
        };
        let estimation = self
            .gas
            .estimate_gas(params.from_chain.chain_id, &msg)
            .await
            .map_err(|e| estimation_error(self.kind(), e))?;
        Ok(increased_estimation(
            estimation,
            INCREASE_ESTIMATED_GAS_FACTOR,
        ))
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        self.contracts
            .require(ContractKind::StickerMarket, params.from_chain.chain_id)
            .map(Some)
    }
}
