//! Entry-function payloads of the Velox modules.
//!
//! Amounts are smallest-unit integers and timestamps are unix seconds.
//! Tokens are passed as fungible asset metadata objects, which BCS encodes
//! as their address.

use serde::{Deserialize, Serialize};
use velox_types::{encode_arg, Address, EntryFunction, TransactionPayload};

use crate::IntentError;

pub const SUBMISSION_MODULE: &str = "submission";
pub const AUCTION_MODULE: &str = "auction";
pub const SOLVER_REGISTRY_MODULE: &str = "solver_registry";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
	pub input_token: Address,
	pub output_token: Address,
	pub amount_in: u64,
	pub min_amount_out: u64,
	pub deadline: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderParams {
	pub input_token: Address,
	pub output_token: Address,
	pub amount_in: u64,
	/// Minimum output per input unit, scaled as the contract expects.
	pub limit_price: u64,
	pub expiry: u64,
	pub partial_fill_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapParams {
	pub input_token: Address,
	pub output_token: Address,
	pub total_amount: u64,
	pub num_chunks: u64,
	pub interval_seconds: u64,
	pub max_slippage_bps: u64,
	pub start_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcaParams {
	pub input_token: Address,
	pub output_token: Address,
	pub amount_per_period: u64,
	pub total_periods: u64,
	pub interval_seconds: u64,
	pub start_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBidParams {
	pub input_token: Address,
	pub output_token: Address,
	pub amount_in: u64,
	pub min_amount_out: u64,
	pub deadline: u64,
	pub auction_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutchParams {
	pub input_token: Address,
	pub output_token: Address,
	pub amount_in: u64,
	pub start_price: u64,
	pub end_price: u64,
	pub auction_duration: u64,
	pub deadline: u64,
}

/// Builds payloads against one deployment of the Velox modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadBuilder {
	contract: Address,
}

macro_rules! args {
	($($arg:expr),* $(,)?) => {
		vec![$(encode_arg(&$arg)?),*]
	};
}

impl PayloadBuilder {
	pub fn new(contract: Address) -> Self {
		Self { contract }
	}

	pub fn contract(&self) -> Address {
		self.contract
	}

	/// `<contract>::<module>::<function>`.
	pub fn function_id(&self, module: &str, function: &str) -> String {
		format!("{}::{}::{}", self.contract, module, function)
	}

	fn entry(&self, module: &str, function: &str, args: Vec<Vec<u8>>) -> TransactionPayload {
		TransactionPayload::EntryFunction(EntryFunction::new(
			self.contract,
			module,
			function,
			vec![],
			args,
		))
	}

	pub fn swap(&self, p: &SwapParams) -> Result<TransactionPayload, IntentError> {
		Ok(self.entry(
			SUBMISSION_MODULE,
			"submit_swap",
			args![p.input_token, p.output_token, p.amount_in, p.min_amount_out, p.deadline],
		))
	}

	pub fn limit_order(&self, p: &LimitOrderParams) -> Result<TransactionPayload, IntentError> {
		Ok(self.entry(
			SUBMISSION_MODULE,
			"submit_limit_order",
			args![
				p.input_token,
				p.output_token,
				p.amount_in,
				p.limit_price,
				p.expiry,
				p.partial_fill_allowed
			],
		))
	}

	pub fn twap(&self, p: &TwapParams) -> Result<TransactionPayload, IntentError> {
		if p.num_chunks == 0 {
			return Err(IntentError::InvalidParams(
				"TWAP needs at least one chunk".to_string(),
			));
		}
		Ok(self.entry(
			SUBMISSION_MODULE,
			"submit_twap",
			args![
				p.input_token,
				p.output_token,
				p.total_amount,
				p.num_chunks,
				p.interval_seconds,
				p.max_slippage_bps,
				p.start_time
			],
		))
	}

	pub fn dca(&self, p: &DcaParams) -> Result<TransactionPayload, IntentError> {
		if p.total_periods == 0 {
			return Err(IntentError::InvalidParams(
				"DCA needs at least one period".to_string(),
			));
		}
		if p.amount_per_period.checked_mul(p.total_periods).is_none() {
			return Err(IntentError::InvalidParams(
				"DCA total amount overflows".to_string(),
			));
		}
		Ok(self.entry(
			SUBMISSION_MODULE,
			"submit_dca",
			args![
				p.input_token,
				p.output_token,
				p.amount_per_period,
				p.total_periods,
				p.interval_seconds,
				p.start_time
			],
		))
	}

	pub fn sealed_bid(&self, p: &SealedBidParams) -> Result<TransactionPayload, IntentError> {
		Ok(self.entry(
			AUCTION_MODULE,
			"submit_sealed_bid_swap",
			args![
				p.input_token,
				p.output_token,
				p.amount_in,
				p.min_amount_out,
				p.deadline,
				p.auction_duration
			],
		))
	}

	pub fn dutch(&self, p: &DutchParams) -> Result<TransactionPayload, IntentError> {
		if p.start_price < p.end_price {
			return Err(IntentError::InvalidParams(
				"Dutch auction start price must not be below the end price".to_string(),
			));
		}
		Ok(self.entry(
			AUCTION_MODULE,
			"submit_dutch_swap",
			args![
				p.input_token,
				p.output_token,
				p.amount_in,
				p.start_price,
				p.end_price,
				p.auction_duration,
				p.deadline
			],
		))
	}

	pub fn cancel_intent(&self, intent_id: u64) -> Result<TransactionPayload, IntentError> {
		Ok(self.entry(SUBMISSION_MODULE, "cancel_intent", args![intent_id]))
	}

	pub fn complete_sealed_bid(&self, intent_id: u64) -> Result<TransactionPayload, IntentError> {
		Ok(self.entry(AUCTION_MODULE, "complete_sealed_bid", args![intent_id]))
	}

	pub fn register_solver(&self, stake_amount: u64) -> Result<TransactionPayload, IntentError> {
		Ok(self.entry(
			SOLVER_REGISTRY_MODULE,
			"register_solver",
			args![stake_amount],
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn builder() -> PayloadBuilder {
		PayloadBuilder::new("0xbeef".parse().unwrap())
	}

	#[test]
	fn test_swap_payload() {
		let payload = builder()
			.swap(&SwapParams {
				input_token: Address::from_u8(0xa),
				output_token: Address::from_u8(0xb),
				amount_in: 100_000_000,
				min_amount_out: 95_000_000,
				deadline: 1_700_000_600,
			})
			.unwrap();

		let function = payload.entry_function();
		assert_eq!(
			function.function_id(),
			"0x000000000000000000000000000000000000000000000000000000000000beef::submission::submit_swap"
		);
		assert_eq!(function.args.len(), 5);
		assert_eq!(function.args[0], Address::from_u8(0xa).0.to_vec());
		assert_eq!(function.args[2], 100_000_000u64.to_le_bytes().to_vec());
	}

	#[test]
	fn test_limit_order_encodes_bool() {
		let payload = builder()
			.limit_order(&LimitOrderParams {
				input_token: Address::from_u8(0xa),
				output_token: Address::from_u8(0xb),
				amount_in: 1,
				limit_price: 2,
				expiry: 3,
				partial_fill_allowed: true,
			})
			.unwrap();
		let function = payload.entry_function();
		assert_eq!(function.function, "submit_limit_order");
		assert_eq!(function.args[5], vec![1u8]);
	}

	#[test]
	fn test_structural_checks() {
		let twap = TwapParams {
			input_token: Address::from_u8(0xa),
			output_token: Address::from_u8(0xb),
			total_amount: 1_000,
			num_chunks: 0,
			interval_seconds: 60,
			max_slippage_bps: 50,
			start_time: 0,
		};
		assert!(matches!(
			builder().twap(&twap),
			Err(IntentError::InvalidParams(_))
		));

		let dutch = DutchParams {
			input_token: Address::from_u8(0xa),
			output_token: Address::from_u8(0xb),
			amount_in: 1_000,
			start_price: 50,
			end_price: 100,
			auction_duration: 60,
			deadline: 0,
		};
		assert!(matches!(
			builder().dutch(&dutch),
			Err(IntentError::InvalidParams(_))
		));
	}

	#[test]
	fn test_auction_and_admin_modules() {
		let b = builder();
		assert_eq!(
			b.complete_sealed_bid(4).unwrap().entry_function().module.name,
			AUCTION_MODULE
		);
		assert_eq!(
			b.register_solver(10).unwrap().entry_function().function_id(),
			b.function_id("solver_registry", "register_solver")
		);
		assert_eq!(
			b.cancel_intent(4).unwrap().entry_function().function,
			"cancel_intent"
		);
	}
}
