//! JSON-RPC implementation of the signer and chain collaborators.

use std::{str::FromStr, time::Duration};

use alloy_core::primitives::{Address, Bytes};
use backon::{ConstantBuilder, Retryable};
use derive_more::{Display, Error};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    chain::{ChainRpc, Confirmation, Connector, DeploymentTx, Signer, TxId},
    error::{DeployError, Result},
    target::TargetConfig,
};

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single JSON-RPC call.
#[derive(Debug, Display, Error)]
pub enum CallError {
    /// The request could not be sent or the response could not be read.
    #[display("transport: {_0}")]
    Transport(#[error(not(source))] String),
    /// The node answered with an error object.
    #[display("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The result did not have the expected shape.
    #[display("decode: {_0}")]
    Decode(#[error(not(source))] String),
}

impl From<CallError> for DeployError {
    fn from(err: CallError) -> Self {
        DeployError::network(err)
    }
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| DeployError::network(format!("failed to create HTTP client: {e}")))
}

/// Make a JSON-RPC call and deserialize the result.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, CallError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| CallError::Transport(format!("failed to send {method} request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| CallError::Transport(format!("failed to parse {method} response: {e}")))?;

    if let Some(error) = result.get("error") {
        return Err(CallError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| CallError::Decode(format!("no result in {method} response")))?;

    serde_json::from_value(result_value)
        .map_err(|e| CallError::Decode(format!("failed to deserialize {method} result: {e}")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<String>,
    contract_address: Option<Address>,
}

#[derive(Debug)]
enum ReceiptPoll {
    NotYetIncluded,
    Failed(CallError),
}

/// Collaborator talking to a node over HTTP JSON-RPC.
///
/// Signing goes through `eth_sendTransaction`, so the key identifier must be the
/// address of an account the node holds unlocked.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
}

impl JsonRpcClient {
    pub fn new(url: Url, poll_interval: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            poll_interval,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, CallError> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn fetch_receipt(&self, tx_id: TxId) -> Result<Receipt, ReceiptPoll> {
        let receipt: Option<Receipt> = self
            .call("eth_getTransactionReceipt", vec![serde_json::json!(tx_id)])
            .await
            .map_err(ReceiptPoll::Failed)?;
        receipt.ok_or(ReceiptPoll::NotYetIncluded)
    }
}

impl Signer for JsonRpcClient {
    async fn sign_and_submit(&self, key_id: &str, tx: &DeploymentTx) -> Result<TxId> {
        let from = Address::from_str(key_id).map_err(|_| DeployError::Authorization {
            reason: format!("no signer available for key `{key_id}` on this endpoint"),
        })?;

        tracing::debug!(
            contract = %tx.contract,
            %from,
            data_len = tx.data.len(),
            "Submitting deployment transaction"
        );

        self.call(
            "eth_sendTransaction",
            vec![serde_json::json!({
                "from": from,
                "data": tx.data,
                "chainId": format!("0x{:x}", tx.chain_id),
            })],
        )
        .await
        .map_err(|e| match e {
            CallError::Rpc { code, message } => DeployError::Authorization {
                reason: format!("node rejected transaction from {from} ({code}): {message}"),
            },
            other => other.into(),
        })
    }
}

impl ChainRpc for JsonRpcClient {
    async fn await_confirmation(&self, tx_id: TxId) -> Result<Confirmation> {
        let receipt = (|| async { self.fetch_receipt(tx_id).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(usize::MAX),
            )
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, ReceiptPoll::NotYetIncluded))
            .notify(|_, delay| {
                tracing::trace!(tx_id = %tx_id, ?delay, "Receipt not available yet, polling...");
            })
            .await
            .map_err(|e| match e {
                ReceiptPoll::Failed(err) => DeployError::from(err),
                ReceiptPoll::NotYetIncluded => {
                    DeployError::network(format!("transaction {tx_id} never included"))
                }
            })?;

        if receipt.status.as_deref() == Some("0x0") {
            return Ok(Confirmation::Reverted {
                reason: "execution reverted (receipt status 0x0)".to_string(),
            });
        }

        match receipt.contract_address {
            Some(deployed_address) => Ok(Confirmation::Success { deployed_address }),
            None => Ok(Confirmation::Reverted {
                reason: "receipt carries no contract address".to_string(),
            }),
        }
    }

    async fn read_code(&self, address: Address) -> Result<Bytes> {
        Ok(self
            .call(
                "eth_getCode",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await?)
    }
}

/// Opens a [`JsonRpcClient`] on the endpoint configured for a target.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    pub poll_interval: Duration,
}

impl Connector for JsonRpcConnector {
    type Chain = JsonRpcClient;

    fn connect(&self, config: &TargetConfig) -> Result<Self::Chain> {
        JsonRpcClient::new(config.rpc_url.clone(), self.poll_interval)
    }
}
