// Paraswap swap path processor
// This file routes same-chain token swaps through an injected aggregator
// encoder; the swap leg is only built once its allowance is confirmed

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use crate::errors::RouterError;
use crate::processors::{
    estimation_error, increased_estimation, PathProcessor, ProcessorInputParams, ProcessorKind,
    INCREASE_ESTIMATED_GAS_FACTOR,
};
use crate::transactor::GasSource;
use crate::types::CallMsg;

/// A fully encoded aggregator call.
#[derive(Debug, Clone)]
pub struct SwapCallData {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Aggregator-API seam. The production encoder talks to the Paraswap
/// transactions endpoint; tests supply canned call data.
#[async_trait]
pub trait SwapEncoder: Send + Sync {
    /// Expected amount out for the pair at current prices.
    async fn quote(&self, params: &ProcessorInputParams) -> Result<U256, RouterError>;

    async fn encode(&self, params: &ProcessorInputParams) -> Result<SwapCallData, RouterError>;

    fn router_address(&self, chain_id: u64) -> Result<Address, RouterError>;
}

pub struct ParaswapProcessor {
    encoder: Arc<dyn SwapEncoder>,
    gas: Arc<dyn GasSource>,
}

impl ParaswapProcessor {
    pub fn new(encoder: Arc<dyn SwapEncoder>, gas: Arc<dyn GasSource>) -> Self {
        Self { encoder, gas }
    }
}

#[async_trait]
impl PathProcessor for ParaswapProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Paraswap
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        if params.from_chain.chain_id != params.to_chain.chain_id {
            return Ok(false);
        }
        match (&params.from_token, &params.to_token) {
            (Some(from), Some(to)) => Ok(from.address != to.address),
            _ => Ok(false),
        }
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        Ok(self.encoder.encode(params).await?.data)
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let call = self.encoder.encode(params).await?;
        let msg = CallMsg {
            from: params.from_addr,
            to: Some(call.to),
            value: call.value,
            data: call.data,
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
        self.encoder
            .router_address(params.from_chain.chain_id)
            .map(Some)
    }

    async fn calculate_amount_out(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<U256, RouterError> {
        self.encoder.quote(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransactorError;
    use crate::routes::{Network, Token};

    struct FixedEncoder;

    #[async_trait]
    impl SwapEncoder for FixedEncoder {
        async fn quote(&self, params: &ProcessorInputParams) -> Result<U256, RouterError> {
            Ok(params.amount_in - U256::from(1u64))
        }
        async fn encode(&self, _params: &ProcessorInputParams) -> Result<SwapCallData, RouterError> {
            Ok(SwapCallData {
                to: Address::repeat_byte(0xdd),
                data: Bytes::from(vec![1, 2, 3, 4]),
                value: U256::ZERO,
            })
        }
        fn router_address(&self, _chain_id: u64) -> Result<Address, RouterError> {
            Ok(Address::repeat_byte(0xdd))
        }
    }

    struct NoGas;

    #[async_trait]
    impl GasSource for NoGas {
        async fn estimate_gas(
            &self,
            _chain_id: u64,
            _msg: &CallMsg,
        ) -> Result<u64, TransactorError> {
            Ok(200_000)
        }
        async fn call(&self, _chain_id: u64, _msg: &CallMsg) -> Result<Bytes, TransactorError> {
            Ok(Bytes::new())
        }
    }

    fn token(byte: u8) -> Token {
        Token {
            symbol: "T".into(),
            address: Address::repeat_byte(byte),
            decimals: 18,
            chain_id: 1,
        }
    }

    fn swap_params() -> ProcessorInputParams {
        ProcessorInputParams {
            from_chain: Network::new(1, "mainnet"),
            to_chain: Network::new(1, "mainnet"),
            from_token: Some(token(1)),
            to_token: Some(token(2)),
            amount_in: U256::from(100u64),
            ..Default::default()
        }
    }

    #[test]
    fn requires_a_same_chain_token_pair() {
        let processor = ParaswapProcessor::new(Arc::new(FixedEncoder), Arc::new(NoGas));
        assert!(processor.available_for(&swap_params()).unwrap());

        let mut cross = swap_params();
        cross.to_chain = Network::new(10, "optimism");
        assert!(!processor.available_for(&cross).unwrap());

        let mut same_token = swap_params();
        same_token.to_token = Some(token(1));
        assert!(!processor.available_for(&same_token).unwrap());
    }

    #[test]
    fn swap_leg_waits_for_approval_confirmation() {
        let processor = ParaswapProcessor::new(Arc::new(FixedEncoder), Arc::new(NoGas));
        assert!(processor.requires_approval_confirmation());
    }

    #[tokio::test]
    async fn amount_out_comes_from_the_encoder_quote() {
        let processor = ParaswapProcessor::new(Arc::new(FixedEncoder), Arc::new(NoGas));
        let out = processor.calculate_amount_out(&swap_params()).await.unwrap();
        assert_eq!(out, U256::from(99u64));
    }
}
