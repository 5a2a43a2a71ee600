//! Decoding of Velox view-function results.
//!
//! Move 2.0 enums come back as JSON objects tagged with `__variant__`,
//! `Option` values as `{"vec": [..]}`, objects as `{"inner": "0x.."}` and
//! 64-bit integers as strings. The intent kind is decoded strictly: an
//! unknown variant is an error. The status is decoded leniently because the
//! contract has used several encodings for it over time.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use velox_chain::types::u64_from_any;
use velox_types::{
	now_secs, Address, AuctionState, IntentRecord, IntentStatus, IntentType, ScheduledProgress,
	UnknownIntentType,
};

const VARIANT_TAG: &str = "__variant__";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
	#[error("Unknown intent variant: {0}")]
	UnknownVariant(String),
	#[error("Missing field: {0}")]
	MissingField(String),
	#[error("Malformed {what}: {message}")]
	Malformed { what: &'static str, message: String },
}

impl From<UnknownIntentType> for DecodeError {
	fn from(e: UnknownIntentType) -> Self {
		DecodeError::UnknownVariant(e.0)
	}
}

/// Reads an address given either as a string or as an object `{inner}`.
fn object_address<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Repr {
		Plain(Address),
		Object { inner: Address },
	}

	Ok(match Repr::deserialize(deserializer)? {
		Repr::Plain(address) => address,
		Repr::Object { inner } => inner,
	})
}

/// Reads a Move `Option`: `{"vec": []}`, `{"vec": [x]}`, `null` or `x`.
fn move_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;
	let inner = match value {
		Value::Null => return Ok(None),
		Value::Object(mut map) if map.len() == 1 && map.contains_key("vec") => {
			match map.remove("vec") {
				Some(Value::Array(mut items)) if items.len() <= 1 => match items.pop() {
					Some(item) => item,
					None => return Ok(None),
				},
				other => {
					return Err(de::Error::custom(format!(
						"Invalid Move option: {:?}",
						other
					)))
				}
			}
		}
		other => other,
	};
	serde_json::from_value(inner).map(Some).map_err(de::Error::custom)
}

fn move_option_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
	let value: Option<Value> = move_option(deserializer)?;
	value
		.map(|v| match v {
			Value::String(s) => s.parse().map_err(de::Error::custom),
			Value::Number(n) => n
				.as_u64()
				.ok_or_else(|| de::Error::custom(format!("Not a u64: {}", n))),
			other => Err(de::Error::custom(format!("Not a u64: {}", other))),
		})
		.transpose()
}

fn move_option_address<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<Address>, D::Error> {
	#[derive(Deserialize)]
	struct Wrapped(#[serde(deserialize_with = "object_address")] Address);

	let value: Option<Wrapped> = move_option(deserializer)?;
	Ok(value.map(|w| w.0))
}

/// Parameters of the intent kinds, keyed on the Move variant name.
#[derive(Debug, Deserialize)]
#[serde(tag = "__variant__")]
enum RawIntentKind {
	#[serde(alias = "swap")]
	Swap {
		#[serde(deserialize_with = "object_address")]
		input_token: Address,
		#[serde(deserialize_with = "object_address")]
		output_token: Address,
		#[serde(deserialize_with = "u64_from_any")]
		amount_in: u64,
		#[serde(deserialize_with = "u64_from_any")]
		min_amount_out: u64,
		#[serde(deserialize_with = "u64_from_any")]
		deadline: u64,
	},
	#[serde(alias = "Limit", alias = "limit_order")]
	LimitOrder {
		#[serde(deserialize_with = "object_address")]
		input_token: Address,
		#[serde(deserialize_with = "object_address")]
		output_token: Address,
		#[serde(deserialize_with = "u64_from_any")]
		amount_in: u64,
		#[serde(deserialize_with = "u64_from_any")]
		limit_price: u64,
		#[serde(deserialize_with = "u64_from_any")]
		expiry: u64,
		#[serde(default)]
		partial_fill_allowed: bool,
	},
	#[serde(rename = "TWAP", alias = "Twap", alias = "twap")]
	Twap {
		#[serde(deserialize_with = "object_address")]
		input_token: Address,
		#[serde(deserialize_with = "object_address")]
		output_token: Address,
		#[serde(deserialize_with = "u64_from_any")]
		total_amount: u64,
		#[serde(deserialize_with = "u64_from_any")]
		num_chunks: u64,
		#[serde(deserialize_with = "u64_from_any")]
		interval_seconds: u64,
		#[serde(deserialize_with = "u64_from_any")]
		max_slippage_bps: u64,
		#[serde(deserialize_with = "u64_from_any")]
		start_time: u64,
	},
	#[serde(rename = "DCA", alias = "Dca", alias = "dca")]
	Dca {
		#[serde(deserialize_with = "object_address")]
		input_token: Address,
		#[serde(deserialize_with = "object_address")]
		output_token: Address,
		#[serde(deserialize_with = "u64_from_any")]
		amount_per_period: u64,
		#[serde(deserialize_with = "u64_from_any")]
		total_periods: u64,
		#[serde(deserialize_with = "u64_from_any")]
		interval_seconds: u64,
		#[serde(deserialize_with = "u64_from_any")]
		start_time: u64,
	},
}

/// Common fields of an on-chain intent.
#[derive(Debug, Deserialize)]
struct RawIntent {
	#[serde(deserialize_with = "u64_from_any")]
	id: u64,
	#[serde(deserialize_with = "object_address")]
	user: Address,
	#[serde(default)]
	status: Value,
	#[serde(default, deserialize_with = "u64_from_any")]
	created_at: u64,
	#[serde(default, deserialize_with = "u64_from_any")]
	filled_amount: u64,
	#[serde(default, deserialize_with = "move_option_address")]
	solver: Option<Address>,
	#[serde(default, deserialize_with = "move_option_u64")]
	execution_price: Option<u64>,
}

fn malformed(what: &'static str) -> impl Fn(serde_json::Error) -> DecodeError {
	move |e| DecodeError::Malformed {
		what,
		message: e.to_string(),
	}
}

/// Reads the `__variant__` tag of an object.
fn variant_of(value: &Value) -> Option<&str> {
	value.get(VARIANT_TAG).and_then(Value::as_str)
}

/// Maps any encoding of an intent status to [`IntentStatus`].
///
/// Accepts numeric codes (as numbers or strings), labels in any casing and
/// `{"__variant__": label}` objects. Anything else is pending.
pub fn parse_status(value: &Value) -> IntentStatus {
	match value {
		Value::Number(n) => n
			.as_i64()
			.map(IntentStatus::from_code)
			.unwrap_or(IntentStatus::Pending),
		Value::String(s) => match s.parse::<i64>() {
			Ok(code) => IntentStatus::from_code(code),
			Err(_) => IntentStatus::from_label(s),
		},
		Value::Object(_) => variant_of(value)
			.map(IntentStatus::from_label)
			.unwrap_or(IntentStatus::Pending),
		_ => IntentStatus::Pending,
	}
}

/// Parses the intent kind of a variant tag. Unknown tags are an error.
pub fn parse_intent_type(variant: &str) -> Result<IntentType, DecodeError> {
	Ok(IntentType::from_variant(variant)?)
}

/// Decodes one intent as returned by `submission::get_intent`, evaluating
/// expiry against `now`.
pub fn decode_intent_at(value: &Value, now: u64) -> Result<IntentRecord, DecodeError> {
	let kind_value = value
		.get("intent_type")
		.or_else(|| value.get("kind"))
		.ok_or_else(|| DecodeError::MissingField("intent_type".to_string()))?;
	let variant = variant_of(kind_value)
		.ok_or_else(|| DecodeError::MissingField(VARIANT_TAG.to_string()))?;
	let intent_type = parse_intent_type(variant)?;

	let raw: RawIntent = serde_json::from_value(value.clone()).map_err(malformed("intent"))?;
	let kind: RawIntentKind =
		serde_json::from_value(kind_value.clone()).map_err(malformed("intent parameters"))?;
	let chain_status = parse_status(&raw.status);

	let mut record = IntentRecord {
		id: raw.id,
		user: raw.user,
		intent_type,
		input_token: Address::ZERO,
		output_token: Address::ZERO,
		amount_in: 0,
		status: chain_status,
		chain_status,
		filled_amount: raw.filled_amount,
		created_at: raw.created_at,
		deadline: None,
		solver: raw.solver,
		execution_price: raw.execution_price,
		min_amount_out: None,
		limit_price: None,
		partial_fill_allowed: None,
		num_chunks: None,
		max_slippage_bps: None,
		total_periods: None,
		amount_per_period: None,
		interval_seconds: None,
		start_time: None,
		auction: None,
		tx_hash: None,
	};

	match kind {
		RawIntentKind::Swap {
			input_token,
			output_token,
			amount_in,
			min_amount_out,
			deadline,
		} => {
			record.input_token = input_token;
			record.output_token = output_token;
			record.amount_in = amount_in;
			record.min_amount_out = Some(min_amount_out);
			record.deadline = Some(deadline);
		}
		RawIntentKind::LimitOrder {
			input_token,
			output_token,
			amount_in,
			limit_price,
			expiry,
			partial_fill_allowed,
		} => {
			record.input_token = input_token;
			record.output_token = output_token;
			record.amount_in = amount_in;
			record.limit_price = Some(limit_price);
			record.partial_fill_allowed = Some(partial_fill_allowed);
			record.deadline = Some(expiry);
		}
		RawIntentKind::Twap {
			input_token,
			output_token,
			total_amount,
			num_chunks,
			interval_seconds,
			max_slippage_bps,
			start_time,
		} => {
			record.input_token = input_token;
			record.output_token = output_token;
			record.amount_in = total_amount;
			record.num_chunks = Some(num_chunks);
			record.interval_seconds = Some(interval_seconds);
			record.max_slippage_bps = Some(max_slippage_bps);
			record.start_time = Some(start_time);
			record.deadline = Some(schedule_end(start_time, num_chunks, interval_seconds));
		}
		RawIntentKind::Dca {
			input_token,
			output_token,
			amount_per_period,
			total_periods,
			interval_seconds,
			start_time,
		} => {
			record.input_token = input_token;
			record.output_token = output_token;
			record.amount_in = amount_per_period.saturating_mul(total_periods);
			record.amount_per_period = Some(amount_per_period);
			record.total_periods = Some(total_periods);
			record.interval_seconds = Some(interval_seconds);
			record.start_time = Some(start_time);
			record.deadline = Some(schedule_end(start_time, total_periods, interval_seconds));
		}
	}

	record.status = effective_status(chain_status, record.deadline, now);
	Ok(record)
}

/// Decodes one intent, evaluating expiry against the local clock.
pub fn decode_intent(value: &Value) -> Result<IntentRecord, DecodeError> {
	decode_intent_at(value, now_secs())
}

/// End of a schedule: `start + periods * interval`.
fn schedule_end(start_time: u64, periods: u64, interval_seconds: u64) -> u64 {
	start_time.saturating_add(periods.saturating_mul(interval_seconds))
}

/// A pending intent past its deadline is reported expired even if the chain
/// has not marked it yet.
pub fn effective_status(chain_status: IntentStatus, deadline: Option<u64>, now: u64) -> IntentStatus {
	match (chain_status, deadline) {
		(IntentStatus::Pending, Some(deadline)) if deadline < now => IntentStatus::Expired,
		(status, _) => status,
	}
}

/// Decodes the result of `submission::get_intent`, which may be wrapped in
/// a Move `Option`.
pub fn decode_optional_intent(value: &Value) -> Result<Option<IntentRecord>, DecodeError> {
	match value {
		Value::Null => Ok(None),
		Value::Object(map) if map.len() == 1 && map.contains_key("vec") => {
			match map.get("vec").and_then(Value::as_array) {
				Some(items) => items.first().map(decode_intent).transpose(),
				None => Err(DecodeError::Malformed {
					what: "intent option",
					message: value.to_string(),
				}),
			}
		}
		other => decode_intent(other).map(Some),
	}
}

/// Decodes the vector returned by `submission::get_user_intents`.
pub fn decode_intent_list(value: &Value) -> Result<Vec<IntentRecord>, DecodeError> {
	let items = value.as_array().ok_or_else(|| DecodeError::Malformed {
		what: "intent list",
		message: format!("expected an array, got {}", value),
	})?;
	items.iter().map(decode_intent).collect()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__variant__")]
enum RawAuctionState {
	None,
	SealedBidActive {
		#[serde(deserialize_with = "u64_from_any")]
		end_time: u64,
		#[serde(deserialize_with = "u64_from_any")]
		bid_count: u64,
	},
	DutchActive {
		#[serde(deserialize_with = "u64_from_any")]
		start_time: u64,
		#[serde(deserialize_with = "u64_from_any")]
		start_price: u64,
		#[serde(deserialize_with = "u64_from_any")]
		end_price: u64,
		#[serde(deserialize_with = "u64_from_any")]
		duration: u64,
	},
	Completed {
		#[serde(deserialize_with = "object_address")]
		winner: Address,
		#[serde(deserialize_with = "u64_from_any")]
		winning_price: u64,
	},
}

/// Decodes the result of `auction::get_auction_state`.
pub fn decode_auction_state(value: &Value) -> Result<AuctionState, DecodeError> {
	let raw: RawAuctionState =
		serde_json::from_value(value.clone()).map_err(malformed("auction state"))?;
	Ok(match raw {
		RawAuctionState::None => AuctionState::None,
		RawAuctionState::SealedBidActive {
			end_time,
			bid_count,
		} => AuctionState::SealedBidActive {
			end_time,
			bid_count,
		},
		RawAuctionState::DutchActive {
			start_time,
			start_price,
			end_price,
			duration,
		} => AuctionState::DutchActive {
			start_time,
			start_price,
			end_price,
			duration,
		},
		RawAuctionState::Completed {
			winner,
			winning_price,
		} => AuctionState::Completed {
			winner,
			winning_price,
		},
	})
}

/// Decodes the return values of `submission::get_scheduled_progress`:
/// `(executed_periods, total_periods, next_execution_at, filled_amount)`.
pub fn decode_scheduled_progress(
	intent_id: u64,
	values: &[Value],
) -> Result<ScheduledProgress, DecodeError> {
	let field = |index: usize, name: &str| -> Result<u64, DecodeError> {
		let value = values
			.get(index)
			.ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
		velox_chain::value_as_u64(value).map_err(|e| DecodeError::Malformed {
			what: "scheduled progress",
			message: e.to_string(),
		})
	};

	Ok(ScheduledProgress {
		intent_id,
		executed_periods: field(0, "executed_periods")?,
		total_periods: field(1, "total_periods")?,
		next_execution_at: field(2, "next_execution_at")?,
		filled_amount: field(3, "filled_amount")?,
	})
}
