//! Gas sponsorship types.

use serde::{Deserialize, Serialize};

use crate::Address;

/// Fee payer co-signature returned by a gas station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayerSignature {
	pub address: Address,
	/// BCS-encoded account authenticator of the fee payer.
	pub signature: Vec<u8>,
}

/// Result of a single sponsorship round trip. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorshipResult {
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fee_payer: Option<FeePayerSignature>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl SponsorshipResult {
	pub fn sponsored(fee_payer: FeePayerSignature) -> Self {
		Self {
			success: true,
			fee_payer: Some(fee_payer),
			error: None,
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			success: false,
			fee_payer: None,
			error: Some(error.into()),
		}
	}
}

/// How a transaction's gas was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPath {
	/// A gas station co-signed as fee payer.
	Sponsored,
	/// The sender paid for gas.
	SelfPaid,
}

impl std::fmt::Display for SubmissionPath {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SubmissionPath::Sponsored => f.write_str("sponsored"),
			SubmissionPath::SelfPaid => f.write_str("self_paid"),
		}
	}
}
