// Transfer path processor
// This file implements native and ERC-20 transfers on a single chain

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

mod abi {
    use super::sol;
    sol! {
        function transfer(address to, uint256 value) external returns (bool);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

/// ERC-20 allowance call data, used for the approval leg of any path that
/// spends tokens through a contract.
pub fn pack_approval(spender: Address, amount: U256) -> Bytes {
    abi::approveCall {
        spender,
        value: amount,
    }
    .abi_encode()
    .into()
}

pub struct TransferProcessor {
    gas: Arc<dyn GasSource>,
}

impl TransferProcessor {
    pub fn new(gas: Arc<dyn GasSource>) -> Self {
        Self { gas }
    }

    fn is_native(params: &ProcessorInputParams) -> bool {
        params.from_token.as_ref().is_none_or(|t| t.is_native())
    }
}

#[async_trait]
impl PathProcessor for TransferProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Transfer
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        if Self::is_native(params) {
            return Ok(Bytes::new());
        }
        Ok(abi::transferCall {
            to: params.to_addr,
            value: params.amount_in,
        }
        .abi_encode()
        .into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let (to, value) = if Self::is_native(params) {
            (Some(params.to_addr), params.amount_in)
        } else {
            (self.contract_address(params).await?, U256::ZERO)
        };
        let msg = CallMsg {
            from: params.from_addr,
            to,
            value,
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
        if Self::is_native(params) {
            return Ok(None);
        }
        let token = params
            .from_token
            .as_ref()
            .ok_or(RouterError::MissingParam("from token"))?;
        Ok(Some(token.address))
    }
}
