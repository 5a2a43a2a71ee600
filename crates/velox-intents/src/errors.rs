//! User-facing messages for Velox Move aborts.
//!
//! Aborts reach the client as VM status strings such as
//! `Move abort in 0x…::submission: E_DEADLINE_PASSED(0x10004): ...`. The
//! abort reason is looked up by name first and by module-local code second.

use regex::Regex;
use std::sync::OnceLock;

/// Known abort reasons: (module, code, name, message).
const VELOX_ABORTS: &[(&str, u64, &str, &str)] = &[
	("submission", 1, "E_NOT_INITIALIZED", "The Velox protocol is not initialized"),
	("submission", 2, "E_INVALID_AMOUNT", "Amount must be greater than zero"),
	("submission", 3, "E_SAME_TOKEN", "Input and output tokens must differ"),
	("submission", 4, "E_DEADLINE_PASSED", "The deadline has already passed"),
	("submission", 5, "E_INTENT_NOT_FOUND", "Intent not found"),
	("submission", 6, "E_NOT_OWNER", "Only the intent owner can do this"),
	("submission", 7, "E_INTENT_NOT_ACTIVE", "The intent is no longer active"),
	("submission", 8, "E_INSUFFICIENT_BALANCE", "Insufficient balance for this intent"),
	("submission", 9, "E_INVALID_PERIODS", "Invalid number of periods or chunks"),
	("submission", 10, "E_INVALID_INTERVAL", "Invalid execution interval"),
	("auction", 1, "E_AUCTION_NOT_FOUND", "Auction not found"),
	("auction", 2, "E_AUCTION_NOT_ACTIVE", "The auction is not active"),
	("auction", 3, "E_AUCTION_NOT_ENDED", "The auction has not ended yet"),
	("auction", 4, "E_AUCTION_ENDED", "The auction has already ended"),
	("auction", 5, "E_INVALID_PRICE", "Start price must not be below the end price"),
	("auction", 6, "E_NO_BIDS", "The auction received no bids"),
	("solver_registry", 1, "E_ALREADY_REGISTERED", "This solver is already registered"),
	("solver_registry", 2, "E_NOT_REGISTERED", "This solver is not registered"),
	("solver_registry", 3, "E_INSUFFICIENT_STAKE", "Stake is below the minimum"),
];

fn abort_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| {
		Regex::new(
			r"Move abort in 0x[0-9a-fA-F]+::(?P<module>\w+):\s*(?:(?P<name>[A-Z][A-Z0-9_]*)\s*)?\((?P<code>0x[0-9a-fA-F]+|\d+)\)",
		)
		.expect("valid regex")
	})
}

fn parse_code(code: &str) -> Option<u64> {
	match code.strip_prefix("0x") {
		Some(hex) => u64::from_str_radix(hex, 16).ok(),
		None => code.parse().ok(),
	}
}

/// Maps a Velox abort to a user-facing message.
///
/// Anything that is not a recognized Velox abort is returned unchanged.
pub fn decode_velox_error(message: &str) -> String {
	let Some(captures) = abort_pattern().captures(message) else {
		return message.to_string();
	};
	let module = &captures["module"];

	if let Some(name) = captures.name("name") {
		if let Some((_, _, _, text)) = VELOX_ABORTS
			.iter()
			.find(|(m, _, n, _)| *m == module && *n == name.as_str())
		{
			return text.to_string();
		}
	}

	// Move abort codes carry the error category in the upper bits.
	let reason = parse_code(&captures["code"]).map(|code| code & 0xffff);
	reason
		.and_then(|reason| {
			VELOX_ABORTS
				.iter()
				.find(|(m, c, _, _)| *m == module && *c == reason)
		})
		.map(|(_, _, _, text)| text.to_string())
		.unwrap_or_else(|| message.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_named_abort() {
		let status = "Move abort in 0xbeef::submission: E_DEADLINE_PASSED(0x10004): deadline passed";
		assert_eq!(decode_velox_error(status), "The deadline has already passed");
	}

	#[test]
	fn test_code_only_abort() {
		assert_eq!(
			decode_velox_error("Move abort in 0xbeef::auction: (0x30003)"),
			"The auction has not ended yet"
		);
		assert_eq!(
			decode_velox_error("Move abort in 0xbeef::solver_registry: (1)"),
			"This solver is already registered"
		);
	}

	#[test]
	fn test_unknown_messages_pass_through() {
		let framework = "Move abort in 0x1::coin: EINSUFFICIENT_BALANCE(0x10006): ";
		assert_eq!(decode_velox_error(framework), framework);
		assert_eq!(decode_velox_error("network down"), "network down");
	}
}
