// JSON-RPC transport layer implementation
// This file implements the Ethereum JSON-RPC client used for gas
// estimation, nonce queries, read-only calls and raw submission

use std::time::{Duration, Instant};

use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde_json::json;

use crate::errors::TransactorError;
use crate::metrics::{RPC_ERRORS, RPC_LATENCY};
use crate::types::CallMsg;
use alloy::primitives::{Address, Bytes, B256, U256};

#[derive(Debug, Clone)]
pub struct JsonRpc {
    http: Client,
    url: String,
    chain_id: u64,
}

impl JsonRpc {
    pub fn new(chain_id: u64, url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            chain_id,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, TransactorError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let started = Instant::now();
        let chain = self.chain_id.to_string();
        let result = async {
            let resp = self
                .http
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| TransactorError::Rpc(format!("jsonrpc send: {e}")))?;
            if !resp.status().is_success() {
                return Err(TransactorError::Rpc(format!("http {}", resp.status())));
            }
            let body: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| TransactorError::Rpc(format!("json parse: {e}")))?;
            if let Some(err) = body.get("error") {
                let message = err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                if message.contains("nonce too low") {
                    return Err(TransactorError::NonceTooLow);
                }
                return Err(TransactorError::Provider(err.to_string()));
            }
            Ok(body["result"].clone())
        }
        .await;
        RPC_LATENCY
            .with_label_values(&[&chain, method])
            .observe(started.elapsed().as_secs_f64());
        if result.is_err() {
            RPC_ERRORS.with_label_values(&[&chain, method]).inc();
        }
        result
    }

    /// Read calls retry transport failures; provider rejections are final.
    async fn request_with_retry(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, TransactorError> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(30)),
            multiplier: 2.0,
            ..Default::default()
        };
        retry(backoff, || async {
            self.request(method, params.clone()).await.map_err(|e| match e {
                TransactorError::Rpc(_) => backoff::Error::transient(e),
                other => backoff::Error::permanent(other),
            })
        })
        .await
    }

    pub async fn estimate_gas(&self, msg: &CallMsg) -> Result<u64, TransactorError> {
        let result = self
            .request_with_retry("eth_estimateGas", json!([call_object(msg)]))
            .await?;
        parse_quantity(&result)
    }

    /// Next nonce including pending transactions.
    pub async fn transaction_count(&self, address: Address) -> Result<u64, TransactorError> {
        let result = self
            .request_with_retry("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&result)
    }

    pub async fn call(&self, msg: &CallMsg) -> Result<Bytes, TransactorError> {
        let result = self
            .request_with_retry("eth_call", json!([call_object(msg), "latest"]))
            .await?;
        parse_bytes(&result)
    }

    /// Submission is never retried here; a resend after an ambiguous failure
    /// could double-spend the nonce.
    pub async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, TransactorError> {
        let result = self
            .request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await?;
        let bytes = parse_bytes(&result)?;
        if bytes.len() != 32 {
            return Err(TransactorError::Provider(format!(
                "unexpected tx hash length {}",
                bytes.len()
            )));
        }
        Ok(B256::from_slice(&bytes))
    }
}

fn call_object(msg: &CallMsg) -> serde_json::Value {
    let mut obj = json!({
        "from": msg.from,
        "value": format!("0x{:x}", msg.value),
        "data": format!("0x{}", hex::encode(&msg.data)),
    });
    if let Some(to) = msg.to {
        obj["to"] = json!(to);
    }
    obj
}

fn parse_quantity(value: &serde_json::Value) -> Result<u64, TransactorError> {
    let text = value
        .as_str()
        .ok_or_else(|| TransactorError::Provider(format!("expected quantity, got {value}")))?;
    let trimmed = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| TransactorError::Provider(format!("bad quantity {text}: {e}")))
}

fn parse_bytes(value: &serde_json::Value) -> Result<Bytes, TransactorError> {
    let text = value
        .as_str()
        .ok_or_else(|| TransactorError::Provider(format!("expected hex data, got {value}")))?;
    let trimmed = text.strip_prefix("0x").unwrap_or(text);
    let bytes =
        hex::decode(trimmed).map_err(|e| TransactorError::Provider(format!("bad hex: {e}")))?;
    Ok(bytes.into())
}

/// U256 read results, for supply queries.
pub fn parse_u256(data: &Bytes) -> Result<U256, TransactorError> {
    if data.len() < 32 {
        return Err(TransactorError::Provider(format!(
            "short return data: {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quantities_and_bytes() {
        assert_eq!(parse_quantity(&json!("0x15")).unwrap(), 21);
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert!(parse_quantity(&json!(21)).is_err());

        let bytes = parse_bytes(&json!("0xdeadbeef")).unwrap();
        assert_eq!(bytes.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn nonce_error_is_detected() {
        // only the shape matters here
        let err = json!({"code": -32000, "message": "nonce too low"});
        let message = err["message"].as_str().unwrap();
        assert!(message.contains("nonce too low"));
    }
}
