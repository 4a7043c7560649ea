// Collectible transfer path processors
// This file implements same-chain ERC-721 and ERC-1155 transfers

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::errors::RouterError;
use crate::processors::{
    estimation_error, increased_estimation, PathProcessor, ProcessorInputParams, ProcessorKind,
    INCREASE_ESTIMATED_GAS_FACTOR,
};
use crate::transactor::GasSource;
use crate::types::CallMsg;

mod abi721 {
    use super::sol;
    sol! {
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
    }
}

mod abi1155 {
    use super::sol;
    sol! {
        function safeTransferFrom(address from, address to, uint256 id, uint256 value, bytes data) external;
    }
}

fn token_contract(params: &ProcessorInputParams) -> Result<Option<Address>, RouterError> {
    let token = params
        .from_token
        .as_ref()
        .ok_or(RouterError::MissingParam("from token"))?;
    Ok(Some(token.address))
}

async fn estimate(
    gas: &Arc<dyn GasSource>,
    kind: ProcessorKind,
    params: &ProcessorInputParams,
    data: Bytes,
) -> Result<u64, RouterError> {
    let msg = CallMsg {
        from: params.from_addr,
        to: token_contract(params)?,
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

pub struct Erc721TransferProcessor {
    gas: Arc<dyn GasSource>,
}

impl Erc721TransferProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }
}

#[async_trait]
impl PathProcessor for Erc721TransferProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Erc721Transfer
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(params.from_chain.chain_id == params.to_chain.chain_id)
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        Ok(abi721::safeTransferFromCall {
            from: params.from_addr,
            to: params.to_addr,
            tokenId: params.token_id,
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        estimate(&self.gas, self.kind(), params, data).await
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        token_contract(params)
    }
}

pub struct Erc1155TransferProcessor {
    gas: Arc<dyn GasSource>,
}

impl Erc1155TransferProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }
}

#[async_trait]
impl PathProcessor for Erc1155TransferProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Erc1155Transfer
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(params.from_chain.chain_id == params.to_chain.chain_id)
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        Ok(abi1155::safeTransferFromCall {
            from: params.from_addr,
            to: params.to_addr,
            id: params.token_id,
            value: params.amount_in,
            data: Bytes::new(),
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        estimate(&self.gas, self.kind(), params, data).await
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        token_contract(params)
    }
}
