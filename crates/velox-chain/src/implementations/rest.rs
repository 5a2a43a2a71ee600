//! Fullnode REST client.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use velox_types::{Address, TransactionHash};

use crate::types::*;
use crate::{ChainError, ChainInterface};

const BCS_SIGNED_TRANSACTION: &str = "application/x.aptos.signed_transaction+bcs";

/// [`ChainInterface`] over the `/v1` REST API of a fullnode.
pub struct RestClient {
	client: Client,
	/// Base URL without a trailing slash, e.g. `https://host/v1`.
	base_url: String,
}

impl RestClient {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChainError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ChainError::Http(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
		let response = self
			.client
			.get(self.url(path))
			.send()
			.await
			.map_err(|e| ChainError::Http(e.to_string()))?;
		parse_response(response).await
	}
}

/// Decodes a successful body or turns the fullnode's error body into
/// [`ChainError::Api`].
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ChainError> {
	let status = response.status();
	let body = response
		.bytes()
		.await
		.map_err(|e| ChainError::Http(e.to_string()))?;

	if !status.is_success() {
		let (message, error_code) = match serde_json::from_slice::<ApiErrorBody>(&body) {
			Ok(err) => (err.message, err.error_code),
			Err(_) => (String::from_utf8_lossy(&body).into_owned(), None),
		};
		return Err(ChainError::Api {
			status: status.as_u16(),
			message,
			error_code,
		});
	}

	serde_json::from_slice(&body).map_err(|e| ChainError::Decode(e.to_string()))
}

#[async_trait]
impl ChainInterface for RestClient {
	async fn ledger_info(&self) -> Result<LedgerInfo, ChainError> {
		self.get("").await
	}

	async fn account(&self, address: &Address) -> Result<AccountData, ChainError> {
		self.get(&format!("/accounts/{}", address.to_hex_literal()))
			.await
	}

	async fn account_resource(
		&self,
		address: &Address,
		resource_type: &str,
	) -> Result<Option<AccountResource>, ChainError> {
		match self
			.get(&format!(
				"/accounts/{}/resource/{}",
				address.to_hex_literal(),
				resource_type
			))
			.await
		{
			Ok(resource) => Ok(Some(resource)),
			Err(e) if e.is_not_found() => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn view(&self, request: &ViewRequest) -> Result<Vec<serde_json::Value>, ChainError> {
		let response = self
			.client
			.post(self.url("/view"))
			.json(request)
			.send()
			.await
			.map_err(|e| ChainError::Http(e.to_string()))?;
		parse_response(response).await
	}

	async fn estimate_gas_price(&self) -> Result<GasEstimate, ChainError> {
		self.get("/estimate_gas_price").await
	}

	async fn submit_bcs(&self, signed: Vec<u8>) -> Result<PendingTransaction, ChainError> {
		debug!("Submitting {} byte transaction", signed.len());
		let response = self
			.client
			.post(self.url("/transactions"))
			.header(reqwest::header::CONTENT_TYPE, BCS_SIGNED_TRANSACTION)
			.body(signed)
			.send()
			.await
			.map_err(|e| ChainError::Http(e.to_string()))?;
		parse_response(response).await
	}

	async fn transaction_by_hash(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionInfo>, ChainError> {
		let response = self
			.client
			.get(self.url(&format!("/transactions/by_hash/{}", hash)))
			.send()
			.await
			.map_err(|e| ChainError::Http(e.to_string()))?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		parse_response(response).await.map(Some)
	}
}
