// Hop bridge path processor
// This file packs Hop sends: sendToL2 when leaving mainnet, the AMM
// wrapper's swapAndSend between rollups

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::contracts::{ContractKind, ContractRegistry, ETHEREUM_MAINNET, ETHEREUM_SEPOLIA};
use crate::errors::RouterError;
use crate::processors::{
    estimation_error, increased_estimation, PathProcessor, ProcessorInputParams, ProcessorKind,
    INCREASE_ESTIMATED_GAS_FACTOR_FOR_BRIDGES,
};
use crate::transactor::GasSource;
use crate::types::CallMsg;

const SEND_DEADLINE: u64 = 30 * 60;

mod abi {
    use super::sol;
    sol! {
        function sendToL2(
            uint256 chainId,
            address recipient,
            uint256 amount,
            uint256 amountOutMin,
            uint256 deadline,
            address relayer,
            uint256 relayerFee
        ) external payable;

        function swapAndSend(
            uint256 chainId,
            address recipient,
            uint256 amount,
            uint256 bonderFee,
            uint256 amountOutMin,
            uint256 deadline,
            uint256 destinationAmountOutMin,
            uint256 destinationDeadline
        ) external payable;
    }
}

fn deadline() -> U256 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    U256::from(now + SEND_DEADLINE)
}

pub struct HopProcessor {
    gas: Arc<dyn GasSource>,
    contracts: Arc<ContractRegistry>,
    /// Bonder fee in basis points of the bridged amount.
    bonder_fee_bps: u64,
}

impl HopProcessor {
    pub fn new(gas: Arc<dyn GasSource>, contracts: Arc<ContractRegistry>, bonder_fee_bps: u64) -> Self {
        Self {
            gas,
            contracts,
            bonder_fee_bps,
        }
    }

    fn bonder_fee(&self, amount: U256) -> U256 {
        amount * U256::from(self.bonder_fee_bps) / U256::from(10_000u64)
    }

    fn leaving_l1(params: &ProcessorInputParams) -> bool {
        matches!(
            params.from_chain.chain_id,
            ETHEREUM_MAINNET | ETHEREUM_SEPOLIA
        )
    }
}

#[async_trait]
impl PathProcessor for HopProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Hop
    }

    fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, RouterError> {
        Ok(params.from_chain.chain_id != params.to_chain.chain_id)
    }

    fn calculate_fees(&self, params: &ProcessorInputParams) -> Result<(U256, U256), RouterError> {
        Ok((U256::ZERO, self.bonder_fee(params.amount_in)))
    }

    async fn pack_tx_input_data(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<Bytes, RouterError> {
        let to_chain = U256::from(params.to_chain.chain_id);
        let data = if Self::leaving_l1(params) {
            abi::sendToL2Call {
                chainId: to_chain,
                recipient: params.to_addr,
                amount: params.amount_in,
                amountOutMin: params.amount_out,
                deadline: deadline(),
                relayer: Address::ZERO,
                relayerFee: U256::ZERO,
            }
            .abi_encode()
        } else {
            abi::swapAndSendCall {
                chainId: to_chain,
                recipient: params.to_addr,
                amount: params.amount_in,
                bonderFee: self.bonder_fee(params.amount_in),
                amountOutMin: params.amount_out,
                deadline: deadline(),
                destinationAmountOutMin: params.amount_out,
                destinationDeadline: deadline(),
            }
            .abi_encode()
        };
        Ok(data.into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams) -> Result<u64, RouterError> {
        let data = self.pack_tx_input_data(params).await?;
        let native = params.from_token.as_ref().is_none_or(|t| t.is_native());
        let msg = CallMsg {
            from: params.from_addr,
            to: self.contract_address(params).await?,
            value: if native { params.amount_in } else { U256::ZERO },
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
            .require(ContractKind::HopBridge, params.from_chain.chain_id)
            .map(Some)
    }

    async fn calculate_amount_out(
        &self,
        params: &ProcessorInputParams,
    ) -> Result<U256, RouterError> {
        let (fee, bonder_fee) = self.calculate_fees(params)?;
        Ok(params.amount_in.saturating_sub(fee + bonder_fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransactorError;
    use crate::routes::Network;

    struct NoGas;

    #[async_trait]
    impl GasSource for NoGas {
        async fn estimate_gas(
            &self,
            _chain_id: u64,
            _msg: &CallMsg,
        ) -> Result<u64, TransactorError> {
            Ok(100_000)
        }
        async fn call(&self, _chain_id: u64, _msg: &CallMsg) -> Result<Bytes, TransactorError> {
            Ok(Bytes::new())
        }
    }

    fn processor() -> HopProcessor {
        let mut contracts = ContractRegistry::with_defaults();
        contracts.insert(ContractKind::HopBridge, 1, Address::repeat_byte(0xb1));
        contracts.insert(ContractKind::HopBridge, 10, Address::repeat_byte(0xb2));
        HopProcessor::new(Arc::new(NoGas), Arc::new(contracts), 25)
    }

    fn params(from: u64, to: u64) -> ProcessorInputParams {
        ProcessorInputParams {
            from_addr: Address::repeat_byte(1),
            to_addr: Address::repeat_byte(2),
            from_chain: Network::new(from, "from"),
            to_chain: Network::new(to, "to"),
            amount_in: U256::from(10_000u64),
            amount_out: U256::from(9_900u64),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn l1_exit_uses_send_to_l2() {
        let data = processor().pack_tx_input_data(&params(1, 10)).await.unwrap();
        assert_eq!(&data[..4], &abi::sendToL2Call::SELECTOR);
    }

    #[tokio::test]
    async fn rollup_to_rollup_uses_swap_and_send() {
        let data = processor().pack_tx_input_data(&params(10, 42161)).await.unwrap();
        assert_eq!(&data[..4], &abi::swapAndSendCall::SELECTOR);
    }

    #[tokio::test]
    async fn bridge_estimation_uses_the_larger_factor() {
        let gas = processor().estimate_gas(&params(1, 10)).await.unwrap();
        assert_eq!(gas, (100_000f64 * 1.2) as u64);
    }

    #[test]
    fn bonder_fee_is_proportional() {
        let (protocol, bonder) = processor().calculate_fees(&params(10, 42161)).unwrap();
        assert_eq!(protocol, U256::ZERO);
        assert_eq!(bonder, U256::from(25u64));
    }

    #[tokio::test]
    async fn amount_out_subtracts_the_bonder_fee() {
        let out = processor()
            .calculate_amount_out(&params(10, 42161))
            .await
            .unwrap();
        assert_eq!(out, U256::from(9_975u64));
    }

    #[test]
    fn same_chain_is_unavailable() {
        assert!(!processor().available_for(&params(1, 1)).unwrap());
    }
}
