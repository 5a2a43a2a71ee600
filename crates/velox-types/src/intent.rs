//! Intent view-model types.
//!
//! These types describe intents as the client sees them after decoding
//! on-chain view responses. They are re-fetched rather than mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{Address, TransactionHash};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown intent variant: {0}")]
pub struct UnknownIntentType(pub String);

/// The kind of trade an intent expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
	Swap,
	LimitOrder,
	Twap,
	Dca,
}

impl IntentType {
	pub const ALL: [IntentType; 4] = [
		IntentType::Swap,
		IntentType::LimitOrder,
		IntentType::Twap,
		IntentType::Dca,
	];

	/// Parses a Move enum variant tag. Unknown tags are an error.
	pub fn from_variant(variant: &str) -> Result<Self, UnknownIntentType> {
		match variant {
			"Swap" | "swap" => Ok(IntentType::Swap),
			"LimitOrder" | "Limit" | "limit_order" => Ok(IntentType::LimitOrder),
			"TWAP" | "Twap" | "twap" => Ok(IntentType::Twap),
			"DCA" | "Dca" | "dca" => Ok(IntentType::Dca),
			other => Err(UnknownIntentType(other.to_string())),
		}
	}

	/// Variant tag as emitted by the Move contract.
	pub fn variant_name(&self) -> &'static str {
		match self {
			IntentType::Swap => "Swap",
			IntentType::LimitOrder => "LimitOrder",
			IntentType::Twap => "TWAP",
			IntentType::Dca => "DCA",
		}
	}

	/// Snake-case identifier used in view models and storage.
	pub fn as_str(&self) -> &'static str {
		match self {
			IntentType::Swap => "swap",
			IntentType::LimitOrder => "limit_order",
			IntentType::Twap => "twap",
			IntentType::Dca => "dca",
		}
	}

	/// Whether the intent executes over several periods.
	pub fn is_scheduled(&self) -> bool {
		matches!(self, IntentType::Twap | IntentType::Dca)
	}
}

impl fmt::Display for IntentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			IntentType::Swap => "Swap",
			IntentType::LimitOrder => "Limit Order",
			IntentType::Twap => "TWAP",
			IntentType::Dca => "DCA",
		};
		f.write_str(label)
	}
}

/// Lifecycle status of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
	Pending,
	PartiallyFilled,
	Filled,
	Cancelled,
	Expired,
}

impl IntentStatus {
	/// Maps the numeric on-chain status code. Unknown codes are pending.
	pub fn from_code(code: i64) -> Self {
		match code {
			1 => IntentStatus::PartiallyFilled,
			2 => IntentStatus::Filled,
			3 => IntentStatus::Cancelled,
			4 => IntentStatus::Expired,
			_ => IntentStatus::Pending,
		}
	}

	/// Maps a textual status in any of the casings the contract has used.
	/// Unknown labels are pending.
	pub fn from_label(label: &str) -> Self {
		let key: String = label
			.chars()
			.filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
			.flat_map(char::to_lowercase)
			.collect();

		match key.as_str() {
			"partiallyfilled" | "partial" => IntentStatus::PartiallyFilled,
			"filled" | "completed" => IntentStatus::Filled,
			"cancelled" | "canceled" => IntentStatus::Cancelled,
			"expired" => IntentStatus::Expired,
			_ => IntentStatus::Pending,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			IntentStatus::Pending => "pending",
			IntentStatus::PartiallyFilled => "partially_filled",
			IntentStatus::Filled => "filled",
			IntentStatus::Cancelled => "cancelled",
			IntentStatus::Expired => "expired",
		}
	}

	/// Whether the intent can still receive fills.
	pub fn is_open(&self) -> bool {
		matches!(self, IntentStatus::Pending | IntentStatus::PartiallyFilled)
	}
}

impl fmt::Display for IntentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Auction mechanism attached to a swap intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionKind {
	SealedBid,
	Dutch,
}

impl fmt::Display for AuctionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AuctionKind::SealedBid => f.write_str("sealed_bid"),
			AuctionKind::Dutch => f.write_str("dutch"),
		}
	}
}

/// Auction parameters remembered locally at submission time.
///
/// Prices are string encoded so they survive JSON round trips without
/// losing precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuctionInfo {
	#[serde(rename = "type")]
	pub kind: AuctionKind,
	pub start_time: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_time: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start_price: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_price: Option<String>,
}

/// On-chain auction state of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuctionState {
	None,
	SealedBidActive {
		end_time: u64,
		bid_count: u64,
	},
	DutchActive {
		start_time: u64,
		start_price: u64,
		end_price: u64,
		duration: u64,
	},
	Completed {
		winner: Address,
		winning_price: u64,
	},
}

/// Execution progress of a TWAP or DCA intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledProgress {
	pub intent_id: u64,
	pub executed_periods: u64,
	pub total_periods: u64,
	pub next_execution_at: u64,
	pub filled_amount: u64,
}

impl ScheduledProgress {
	pub fn is_complete(&self) -> bool {
		self.executed_periods >= self.total_periods
	}
}

/// Normalized view of an on-chain intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
	pub id: u64,
	pub user: Address,
	pub intent_type: IntentType,
	pub input_token: Address,
	pub output_token: Address,
	/// Total input amount in smallest units.
	pub amount_in: u64,
	/// Status after the local expiry check.
	pub status: IntentStatus,
	/// Status exactly as decoded from the chain.
	pub chain_status: IntentStatus,
	pub filled_amount: u64,
	pub created_at: u64,
	pub deadline: Option<u64>,
	pub solver: Option<Address>,
	pub execution_price: Option<u64>,

	// Swap
	pub min_amount_out: Option<u64>,
	// Limit order
	pub limit_price: Option<u64>,
	pub partial_fill_allowed: Option<bool>,
	// TWAP
	pub num_chunks: Option<u64>,
	pub max_slippage_bps: Option<u64>,
	// DCA
	pub total_periods: Option<u64>,
	pub amount_per_period: Option<u64>,
	// TWAP and DCA
	pub interval_seconds: Option<u64>,
	pub start_time: Option<u64>,

	/// Locally remembered auction parameters, if any.
	pub auction: Option<StoredAuctionInfo>,
	/// Submission transaction hash, if known.
	pub tx_hash: Option<TransactionHash>,
}

impl IntentRecord {
	/// Fraction of the input that has been filled, in basis points.
	pub fn fill_bps(&self) -> u64 {
		if self.amount_in == 0 {
			return 0;
		}
		((self.filled_amount as u128 * 10_000) / self.amount_in as u128).min(10_000) as u64
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_intent_type_round_trip() {
		for intent_type in IntentType::ALL {
			let variant = intent_type.variant_name();
			assert_eq!(IntentType::from_variant(variant), Ok(intent_type));
		}
		let dca = IntentType::from_variant("DCA").unwrap();
		assert_eq!(dca.as_str(), "dca");
		assert_eq!(dca.to_string(), "DCA");
	}

	#[test]
	fn test_unknown_variant_is_rejected() {
		assert_eq!(
			IntentType::from_variant("Lottery"),
			Err(UnknownIntentType("Lottery".to_string()))
		);
	}

	#[test]
	fn test_status_codes_are_total() {
		let expected = [
			IntentStatus::Pending,
			IntentStatus::PartiallyFilled,
			IntentStatus::Filled,
			IntentStatus::Cancelled,
			IntentStatus::Expired,
		];
		for (code, status) in expected.iter().enumerate() {
			assert_eq!(IntentStatus::from_code(code as i64), *status);
		}
		assert_eq!(IntentStatus::from_code(-1), IntentStatus::Pending);
		assert_eq!(IntentStatus::from_code(99), IntentStatus::Pending);
	}

	#[test]
	fn test_status_labels() {
		assert_eq!(IntentStatus::from_label("PartiallyFilled"), IntentStatus::PartiallyFilled);
		assert_eq!(IntentStatus::from_label("partially_filled"), IntentStatus::PartiallyFilled);
		assert_eq!(IntentStatus::from_label("Cancelled"), IntentStatus::Cancelled);
		assert_eq!(IntentStatus::from_label("Active"), IntentStatus::Pending);
		assert_eq!(IntentStatus::from_label("whatever"), IntentStatus::Pending);
	}

	#[test]
	fn test_stored_auction_info_json_shape() {
		let info = StoredAuctionInfo {
			kind: AuctionKind::Dutch,
			start_time: 10,
			end_time: None,
			duration: Some(60),
			start_price: Some("100".to_string()),
			end_price: Some("50".to_string()),
		};
		let value = serde_json::to_value(&info).unwrap();
		assert_eq!(value["type"], "dutch");
		assert!(value.get("end_time").is_none());
	}
}
