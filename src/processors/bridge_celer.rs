// cBridge path processor
// This file packs Celer cBridge sends for native and ERC-20 assets

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::contracts::{ContractKind, ContractRegistry};
use crate::errors::RouterError;
use crate::processors::{
    estimation_error, increased_estimation, PathProcessor, ProcessorInputParams, ProcessorKind,
    INCREASE_ESTIMATED_GAS_FACTOR_FOR_BRIDGES,
};
use crate::transactor::GasSource;
use crate::types::CallMsg;

mod abi {
    use super::sol;
    sol! {
        function send(
            address receiver,
            address token,
            uint256 amount,
            uint64 dstChainId,
            uint64 nonce,
            uint32 maxSlippage
        ) external;

        function sendNative(
            address receiver,
            uint256 amount,
            uint64 dstChainId,
            uint64 nonce,
            uint32 maxSlippage
        ) external payable;
    }
}

// dedupes resubmissions on the bridge side
fn transfer_nonce() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub struct CelerBridgeProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
    max_slippage_bps: u32,
}

impl CelerBridgeProcessor {
    pub fn new(
        gas: Arc<dyn GasSource>,
        contracts: Arc<ContractRegistry>,
        max_slippage_bps: u32,
    ) -> Self {
        Self {
            gas,
            contracts,
            max_slippage_bps,
        }
    }

    fn is_native(params: &ProcessorInputParams) -> bool {
        params.from_token.as_ref().is_none_or(|t| t.is_native())
    }
}

#[async_trait]
impl PathProcessor for CelerBridgeProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::CBridge
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(params.from_chain.chain_id != params.to_chain.chain_id)
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let dst_chain = params.to_chain.chain_id;
        let data = if Self::is_native(params) {
            abi::sendNativeCall {
                receiver: params.to_addr,
                amount: params.amount_in,
                dstChainId: dst_chain,
                nonce: transfer_nonce(),
                maxSlippage: self.max_slippage_bps,
            }
            .abi_encode()
        } else {
            let token = params
                .from_token
                .as_ref()
                .ok_or(RouterError::MissingParam("from token"))?;
            abi::sendCall {
                receiver: params.to_addr,
                token: token.address,
                amount: params.amount_in,
                dstChainId: dst_chain,
                nonce: transfer_nonce(),
                maxSlippage: self.max_slippage_bps,
            }
            .abi_encode()
        };
        Ok(data.into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let msg = CallMsg {
            from: params.from_addr,
            to: self.contract_address(params).await?,
            value: if Self::is_native(params) {
                params.amount_in
            } else {
                U256::ZERO
            },
            data,
        };
        let estimation = self
            .gas
            .estimate_gas(params.from_chain.chain_id, &msg)
            .await
            .map_err(|e| estimation_error(self.kind(), e))?;
        Ok(increased_estimation(
            estimation,
            INCREASE_ESTIMATED_GAS_FACTOR_FOR_BRIDGES,
        ))
    }

    async fn contract_address(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Option<Address>, RouterError> {
        self.contracts
            .require(ContractKind::CelerBridge, params.from_chain.chain_id)
            .map(Some)
    }

    async fn calculate_amount_out(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<U256, RouterError> {
        let (fee, tip) = self.calculate_fees(params)?;
        Ok(params.amount_in.saturating_sub(fee + tip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransactorError;
    use crate::routes::{Network, Token};

    struct NoGas;

    #[async_trait]
    impl GasSource for NoGas {
        async fn estimate_gas(
            &self,
            _chain_id: u64,
            _msg: &CallMsg,
        ) -> Result<u64, TransactorError> {
            Ok(80_000)
        }
        async fn call(&self, _chain_id: u64, _msg: &CallMsg) -> Result<Bytes, TransactorError> {
            Ok(Bytes::new())
        }
    }

    fn processor() -> CelerBridgeProcessor {
        let mut contracts = ContractRegistry::default();
        contracts.insert(ContractKind::CelerBridge, 1, Address::repeat_byte(0xce));
        CelerBridgeProcessor::new(Arc::new(NoGas), Arc::new(contracts), 500)
    }

    fn params(token: Option<Token>) -> ProcessorInputParams {
        ProcessorInputParams {
            from_addr: Address::repeat_byte(1),
            to_addr: Address::repeat_byte(2),
            from_chain: Network::new(1, "mainnet"),
            to_chain: Network::new(10, "optimism"),
            from_token: token,
            amount_in: U256::from(5_000u64),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn native_send_uses_send_native() {
        let data = processor().pack_tx_input_data(&params(None)).await.unwrap();
        assert_eq!(&data[..4], &abi::sendNativeCall::SELECTOR);
    }

    #[tokio::test]
    async fn erc20_send_names_the_token() {
        let token = Token {
            symbol: "USDC".into(),
            address: Address::repeat_byte(4),
            decimals: 6,
            chain_id: 1,
        };
        let data = processor()
            .pack_tx_input_data(&params(Some(token)))
            .await
            .unwrap();
        assert_eq!(&data[..4], &abi::sendCall::SELECTOR);
    }

    #[tokio::test]
    async fn amount_out_follows_the_declared_fees() {
        let processor = processor();
        let input = params(None);
        let (fee, tip) = processor.calculate_fees(&input).unwrap();
        let out = processor.calculate_amount_out(&input).await.unwrap();
        assert_eq!(out, input.amount_in - fee - tip);
    }

    #[tokio::test]
    async fn missing_contract_is_reported() {
        let bare = CelerBridgeProcessor::new(
            Arc::new(NoGas),
            Arc::new(ContractRegistry::default()),
            500,
        );
        assert!(matches!(
            bare.contract_address(&params(None)).await,
            Err(RouterError::ContractNotAvailable(_))
        ));
    }
}
