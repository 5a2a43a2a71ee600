//! JSON-RPC client of a gas station that co-signs transactions as fee payer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use velox_types::{Address, FeePayerSignature, SimpleTransaction, SponsorshipResult};

use crate::{DeliveryError, SponsorInterface};

const SPONSOR_METHOD: &str = "gas_sponsorTransaction";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
	jsonrpc: &'static str,
	method: &'static str,
	params: [&'a str; 1],
	id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
	#[serde(default)]
	result: Option<SponsorResult>,
	#[serde(default)]
	error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
	#[serde(default)]
	code: Option<i64>,
	message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SponsorResult {
	fee_payer: FeePayerResponse,
}

#[derive(Debug, Deserialize)]
struct FeePayerResponse {
	address: Address,
	signature: SignatureBytes,
}

/// Fee payer signature as a byte array or a hex string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignatureBytes {
	Array(Vec<u8>),
	Hex(String),
}

impl SignatureBytes {
	fn into_bytes(self) -> Result<Vec<u8>, String> {
		match self {
			SignatureBytes::Array(bytes) => Ok(bytes),
			SignatureBytes::Hex(s) => hex::decode(s.trim_start_matches("0x"))
				.map_err(|e| format!("Invalid fee payer signature hex: {}", e)),
		}
	}
}

pub struct GasStationClient {
	client: Client,
	endpoint: String,
	api_key: String,
}

impl GasStationClient {
	pub fn new(
		endpoint: impl Into<String>,
		api_key: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, DeliveryError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DeliveryError::Client(e.to_string()))?;

		Ok(Self {
			client,
			endpoint: endpoint.into(),
			api_key: api_key.into(),
		})
	}

	async fn request_sponsorship(&self, txn: &SimpleTransaction) -> Result<FeePayerSignature, String> {
		let tx_hex = txn
			.to_bcs_hex()
			.map_err(|e| format!("Failed to serialize transaction: {}", e))?;
		let request = JsonRpcRequest {
			jsonrpc: "2.0",
			method: SPONSOR_METHOD,
			params: [tx_hex.as_str()],
			id: 1,
		};

		let response = self
			.client
			.post(&self.endpoint)
			.header("X-API-Key", &self.api_key)
			.json(&request)
			.send()
			.await
			.map_err(|e| format!("Gas station request failed: {}", e))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(format!("Gas station returned {}: {}", status, body));
		}

		let body: JsonRpcResponse = response
			.json()
			.await
			.map_err(|e| format!("Invalid gas station response: {}", e))?;

		if let Some(error) = body.error {
			return Err(match error.code {
				Some(code) => format!("Gas station error {}: {}", code, error.message),
				None => format!("Gas station error: {}", error.message),
			});
		}

		let fee_payer = body
			.result
			.ok_or_else(|| "Gas station response has no result".to_string())?
			.fee_payer;

		Ok(FeePayerSignature {
			address: fee_payer.address,
			signature: fee_payer.signature.into_bytes()?,
		})
	}
}

#[async_trait]
impl SponsorInterface for GasStationClient {
	async fn sponsor_transaction(&self, txn: &SimpleTransaction) -> SponsorshipResult {
		match self.request_sponsorship(txn).await {
			Ok(fee_payer) => {
				debug!(fee_payer = %fee_payer.address, "Transaction sponsored");
				SponsorshipResult::sponsored(fee_payer)
			}
			Err(error) => SponsorshipResult::failed(error),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use velox_types::{EntryFunction, RawTransaction, TransactionPayload};
	use wiremock::matchers::{body_partial_json, header, method};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn sample_txn() -> SimpleTransaction {
		SimpleTransaction::with_fee_payer(RawTransaction {
			sender: Address::from_u8(0x42),
			sequence_number: 1,
			payload: TransactionPayload::EntryFunction(EntryFunction::new(
				Address::from_u8(1),
				"aptos_account",
				"transfer",
				vec![],
				vec![],
			)),
			max_gas_amount: 1_000,
			gas_unit_price: 100,
			expiration_timestamp_secs: 1_700_000_000,
			chain_id: 250,
		})
	}

	fn client(server: &MockServer) -> GasStationClient {
		GasStationClient::new(server.uri(), "test-key", Duration::from_secs(5)).unwrap()
	}

	#[tokio::test]
	async fn test_sponsorship_success() {
		let server = MockServer::start().await;
		let txn = sample_txn();
		Mock::given(method("POST"))
			.and(header("X-API-Key", "test-key"))
			.and(body_partial_json(json!({
				"jsonrpc": "2.0",
				"method": "gas_sponsorTransaction",
				"params": [txn.to_bcs_hex().unwrap()],
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"jsonrpc": "2.0",
				"id": 1,
				"result": {
					"feePayer": {
						"address": "0x5",
						"signature": [0, 1, 2],
					}
				}
			})))
			.mount(&server)
			.await;

		let result = client(&server).sponsor_transaction(&txn).await;
		assert!(result.success);
		let fee_payer = result.fee_payer.unwrap();
		assert_eq!(fee_payer.address, Address::from_u8(5));
		assert_eq!(fee_payer.signature, vec![0, 1, 2]);
	}

	#[tokio::test]
	async fn test_json_rpc_error_is_a_failed_result() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"jsonrpc": "2.0",
				"id": 1,
				"error": { "code": -32602, "message": "Fund exhausted" }
			})))
			.mount(&server)
			.await;

		let result = client(&server).sponsor_transaction(&sample_txn()).await;
		assert!(!result.success);
		assert!(result.fee_payer.is_none());
		assert!(result.error.unwrap().contains("Fund exhausted"));
	}

	#[tokio::test]
	async fn test_http_error_is_a_failed_result() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
			.mount(&server)
			.await;

		let result = client(&server).sponsor_transaction(&sample_txn()).await;
		assert!(!result.success);
		assert!(result.error.unwrap().contains("401"));
	}

	#[tokio::test]
	async fn test_unreachable_station_is_a_failed_result() {
		let client = GasStationClient::new("http://127.0.0.1:1", "k", Duration::from_secs(1)).unwrap();
		let result = client.sponsor_transaction(&sample_txn()).await;
		assert!(!result.success);
	}
}
