//! Chain access for the Velox client.
//!
//! [`ChainInterface`] is the thin seam over a fullnode: it maps one call to
//! one REST request. [`ChainService`] builds on it with what the rest of the
//! client needs: transaction building, waiting for commitment and token
//! balances.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use velox_config::NetworkConfig;
use velox_types::{
	now_secs, Address, RawTransaction, SignedTransaction, SimpleTransaction, Token,
	TransactionError, TransactionHash, TransactionPayload, TransactionReceipt,
};

pub mod types;

pub mod implementations {
	pub mod rest;
}

pub use types::*;

/// Marker the Velox modules abort with when a view reads state that was
/// never initialized.
pub const MISSING_DATA: &str = "MISSING_DATA";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const NATIVE_COIN_TYPE: &str = "0x1::aptos_coin::AptosCoin";

#[derive(Debug, Error)]
pub enum ChainError {
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("Fullnode returned {status}: {message}")]
	Api {
		status: u16,
		message: String,
		error_code: Option<String>,
	},
	#[error("Failed to decode response: {0}")]
	Decode(String),
	#[error("Transaction error: {0}")]
	Transaction(#[from] TransactionError),
	#[error("Timed out waiting for transaction {0}")]
	Timeout(TransactionHash),
	#[error("Fullnode is on chain {actual}, expected {expected}")]
	ChainIdMismatch { expected: u8, actual: u8 },
}

impl ChainError {
	/// Whether a view failed because the requested state does not exist yet.
	pub fn is_missing_data(&self) -> bool {
		match self {
			ChainError::Api { message, .. } => message.contains(MISSING_DATA),
			_ => false,
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, ChainError::Api { status: 404, .. })
	}
}

/// Raw fullnode operations.
#[async_trait]
pub trait ChainInterface: Send + Sync {
	async fn ledger_info(&self) -> Result<LedgerInfo, ChainError>;

	async fn account(&self, address: &Address) -> Result<AccountData, ChainError>;

	/// Fetches one resource; `None` if the account does not hold it.
	async fn account_resource(
		&self,
		address: &Address,
		resource_type: &str,
	) -> Result<Option<AccountResource>, ChainError>;

	/// Calls a view function and returns its return values.
	async fn view(&self, request: &ViewRequest) -> Result<Vec<serde_json::Value>, ChainError>;

	async fn estimate_gas_price(&self) -> Result<GasEstimate, ChainError>;

	/// Submits a BCS-encoded signed transaction.
	async fn submit_bcs(&self, signed: Vec<u8>) -> Result<PendingTransaction, ChainError>;

	/// Looks up a transaction; `None` if the fullnode does not know it yet.
	async fn transaction_by_hash(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionInfo>, ChainError>;
}

/// Parameters used when building and awaiting transactions.
#[derive(Debug, Clone)]
pub struct ChainSettings {
	pub chain_id: u8,
	pub max_gas_amount: u64,
	pub expiration_secs: u64,
	pub wait_timeout: Duration,
	pub poll_interval: Duration,
}

impl From<&NetworkConfig> for ChainSettings {
	fn from(config: &NetworkConfig) -> Self {
		Self {
			chain_id: config.chain_id(),
			max_gas_amount: config.max_gas_amount,
			expiration_secs: config.expiration_secs,
			wait_timeout: Duration::from_secs(config.timeout_secs),
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}
}

/// Balance of one token for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
	pub token: Token,
	/// Smallest-unit amount.
	pub amount: u64,
}

pub struct ChainService {
	client: Arc<dyn ChainInterface>,
	settings: ChainSettings,
}

impl ChainService {
	pub fn new(client: Arc<dyn ChainInterface>, settings: ChainSettings) -> Self {
		Self { client, settings }
	}

	pub fn client(&self) -> &Arc<dyn ChainInterface> {
		&self.client
	}

	pub fn settings(&self) -> &ChainSettings {
		&self.settings
	}

	pub async fn sequence_number(&self, address: &Address) -> Result<u64, ChainError> {
		Ok(self.client.account(address).await?.sequence_number)
	}

	/// Reads the ledger info and checks that the fullnode serves the
	/// configured chain.
	pub async fn verify_chain_id(&self) -> Result<LedgerInfo, ChainError> {
		let info = self.client.ledger_info().await?;
		if info.chain_id != self.settings.chain_id {
			return Err(ChainError::ChainIdMismatch {
				expected: self.settings.chain_id,
				actual: info.chain_id,
			});
		}
		Ok(info)
	}

	/// Calls `function` (`<addr>::<module>::<fn>`) as a view.
	pub async fn view(
		&self,
		function: impl Into<String>,
		type_arguments: Vec<String>,
		arguments: Vec<serde_json::Value>,
	) -> Result<Vec<serde_json::Value>, ChainError> {
		let request = ViewRequest {
			function: function.into(),
			type_arguments,
			arguments,
		};
		debug!(function = %request.function, "Calling view function");
		self.client.view(&request).await
	}

	/// Builds an unsigned transaction for `sender`.
	///
	/// With `with_fee_payer` the transaction carries an empty fee payer
	/// slot for a sponsor to fill. An account the chain does not know yet
	/// starts at sequence number 0 in that case.
	pub async fn build_transaction(
		&self,
		sender: Address,
		payload: TransactionPayload,
		with_fee_payer: bool,
	) -> Result<SimpleTransaction, ChainError> {
		let sequence_number = async {
			match self.sequence_number(&sender).await {
				Err(e) if with_fee_payer && e.is_not_found() => {
					debug!(
						sender = %sender.to_short_string(),
						"Account does not exist yet, using sequence number 0"
					);
					Ok(0)
				}
				result => result,
			}
		};
		let (sequence_number, gas) =
			futures::try_join!(sequence_number, self.client.estimate_gas_price())?;

		let raw_txn = RawTransaction {
			sender,
			sequence_number,
			payload,
			max_gas_amount: self.settings.max_gas_amount,
			gas_unit_price: gas.gas_estimate,
			expiration_timestamp_secs: now_secs() + self.settings.expiration_secs,
			chain_id: self.settings.chain_id,
		};

		Ok(if with_fee_payer {
			SimpleTransaction::with_fee_payer(raw_txn)
		} else {
			SimpleTransaction::new(raw_txn)
		})
	}

	/// Submits a signed transaction and returns its hash.
	pub async fn submit(&self, signed: &SignedTransaction) -> Result<TransactionHash, ChainError> {
		let pending = self.client.submit_bcs(signed.to_bcs()?).await?;
		debug!(hash = %pending.hash, "Transaction submitted");
		Ok(pending.hash)
	}

	/// Polls until the transaction is committed or the timeout elapses.
	///
	/// A committed but failed transaction is returned with `success` false;
	/// interpreting it is up to the caller.
	pub async fn wait_for_transaction(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, ChainError> {
		let deadline = tokio::time::Instant::now() + self.settings.wait_timeout;

		loop {
			match self.client.transaction_by_hash(hash).await? {
				Some(TransactionInfo::UserTransaction(txn)) => {
					return Ok(TransactionReceipt {
						hash: txn.hash,
						version: txn.version,
						success: txn.success,
						vm_status: txn.vm_status,
						gas_used: txn.gas_used,
					});
				}
				Some(_) | None => {}
			}

			if tokio::time::Instant::now() >= deadline {
				return Err(ChainError::Timeout(*hash));
			}
			tokio::time::sleep(self.settings.poll_interval).await;
		}
	}

	/// Native coin balance via `0x1::coin::balance`.
	///
	/// When the view fails the `CoinStore` resource is read instead; an
	/// account without one holds nothing.
	pub async fn coin_balance(&self, owner: &Address) -> Result<u64, ChainError> {
		let view_error = match self
			.view(
				"0x1::coin::balance",
				vec![NATIVE_COIN_TYPE.to_string()],
				vec![owner.to_hex_literal().into()],
			)
			.await
			.and_then(|values| first_u64(&values))
		{
			Ok(balance) => return Ok(balance),
			Err(e) => e,
		};

		debug!(
			owner = %owner.to_short_string(),
			"Coin balance view failed ({}), reading CoinStore",
			view_error
		);
		let resource_type = format!("0x1::coin::CoinStore<{}>", NATIVE_COIN_TYPE);
		match self.client.account_resource(owner, &resource_type).await? {
			Some(resource) => resource
				.data
				.pointer("/coin/value")
				.ok_or_else(|| ChainError::Decode("CoinStore without coin value".to_string()))
				.and_then(value_as_u64),
			None => Ok(0),
		}
	}

	/// Fungible asset balance via `0x1::primary_fungible_store::balance`.
	pub async fn fungible_balance(
		&self,
		owner: &Address,
		metadata: &Address,
	) -> Result<u64, ChainError> {
		let values = self
			.view(
				"0x1::primary_fungible_store::balance",
				vec!["0x1::fungible_asset::Metadata".to_string()],
				vec![
					owner.to_hex_literal().into(),
					metadata.to_hex_literal().into(),
				],
			)
			.await?;
		first_u64(&values)
	}

	/// Balance of one token. View errors degrade to zero.
	pub async fn token_balance(&self, owner: &Address, token: &Token) -> u64 {
		let result = if token.is_native() {
			self.coin_balance(owner).await
		} else {
			self.fungible_balance(owner, &token.address).await
		};

		result.unwrap_or_else(|e| {
			warn!(
				"Failed to fetch {} balance of {}: {}",
				token.symbol,
				owner.to_short_string(),
				e
			);
			0
		})
	}

	/// Balances of several tokens, fetched concurrently.
	pub async fn balances(&self, owner: &Address, tokens: &[Token]) -> Vec<TokenBalance> {
		let amounts = join_all(tokens.iter().map(|token| self.token_balance(owner, token))).await;
		tokens
			.iter()
			.cloned()
			.zip(amounts)
			.map(|(token, amount)| TokenBalance { token, amount })
			.collect()
	}
}

/// Reads the first return value of a view as a u64.
pub fn first_u64(values: &[serde_json::Value]) -> Result<u64, ChainError> {
	let value = values
		.first()
		.ok_or_else(|| ChainError::Decode("View returned no values".to_string()))?;
	value_as_u64(value)
}

/// Reads a Move integer, encoded as a string or a number.
pub fn value_as_u64(value: &serde_json::Value) -> Result<u64, ChainError> {
	match value {
		serde_json::Value::String(s) => s
			.parse()
			.map_err(|_| ChainError::Decode(format!("Not an integer: {}", s))),
		serde_json::Value::Number(n) => n
			.as_u64()
			.ok_or_else(|| ChainError::Decode(format!("Not a u64: {}", n))),
		other => Err(ChainError::Decode(format!("Not an integer: {}", other))),
	}
}

/// Creates the chain service for the configured network.
pub fn create_chain(config: &NetworkConfig) -> Result<ChainService, ChainError> {
	let client = implementations::rest::RestClient::new(
		&config.fullnode_url(),
		Duration::from_secs(config.timeout_secs),
	)?;
	Ok(ChainService::new(Arc::new(client), ChainSettings::from(config)))
}
