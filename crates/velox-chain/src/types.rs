//! Response shapes of the fullnode REST API.
//!
//! The API encodes 64-bit integers as decimal strings; `u64_from_any`
//! accepts both strings and numbers.

use serde::{Deserialize, Deserializer, Serialize};
use velox_types::TransactionHash;

/// Deserializes a u64 sent either as a JSON string or number.
pub fn u64_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Repr {
		Str(String),
		Num(u64),
	}

	match Repr::deserialize(deserializer)? {
		Repr::Num(n) => Ok(n),
		Repr::Str(s) => s.parse().map_err(serde::de::Error::custom),
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerInfo {
	pub chain_id: u8,
	#[serde(deserialize_with = "u64_from_any")]
	pub ledger_version: u64,
	/// Microseconds since the unix epoch.
	#[serde(deserialize_with = "u64_from_any")]
	pub ledger_timestamp: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountData {
	#[serde(deserialize_with = "u64_from_any")]
	pub sequence_number: u64,
	pub authentication_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResource {
	#[serde(rename = "type")]
	pub resource_type: String,
	pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasEstimate {
	pub gas_estimate: u64,
	#[serde(default)]
	pub prioritized_gas_estimate: Option<u64>,
}

/// Body of `POST /view`.
#[derive(Debug, Clone, Serialize)]
pub struct ViewRequest {
	pub function: String,
	pub type_arguments: Vec<String>,
	pub arguments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendingTransaction {
	pub hash: TransactionHash,
}

/// A transaction as returned by `/transactions/by_hash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionInfo {
	PendingTransaction {
		hash: TransactionHash,
	},
	UserTransaction(CommittedTransaction),
	#[serde(other)]
	Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommittedTransaction {
	pub hash: TransactionHash,
	#[serde(deserialize_with = "u64_from_any")]
	pub version: u64,
	pub success: bool,
	pub vm_status: String,
	#[serde(deserialize_with = "u64_from_any")]
	pub gas_used: u64,
}

/// Error body returned by the fullnode.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
	pub message: String,
	#[serde(default)]
	pub error_code: Option<String>,
	#[serde(default)]
	pub vm_error_code: Option<u64>,
}
