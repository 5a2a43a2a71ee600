//! Conversions between human readable token amounts and on-chain units.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;

/// Largest number of decimals a token may declare.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
	#[error("Invalid amount: {0}")]
	Invalid(String),
	#[error("Amount must not be negative")]
	Negative,
	#[error("Amount does not fit in u64")]
	Overflow,
	#[error("Unsupported decimals: {0}")]
	UnsupportedDecimals(u32),
}

/// Converts a decimal string such as `"1.5"` into the token's smallest unit.
///
/// Fractional digits beyond `decimals` are truncated.
pub fn to_smallest_unit(amount: &str, decimals: u32) -> Result<u64, AmountError> {
	if decimals > MAX_DECIMALS {
		return Err(AmountError::UnsupportedDecimals(decimals));
	}

	let trimmed = amount.trim();
	if trimmed.is_empty() {
		return Err(AmountError::Invalid("empty amount".to_string()));
	}

	let value =
		Decimal::from_str(trimmed).map_err(|e| AmountError::Invalid(format!("{}: {}", trimmed, e)))?;
	if value.is_sign_negative() && !value.is_zero() {
		return Err(AmountError::Negative);
	}

	let truncated = value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
	let missing_scale = decimals - truncated.scale();
	let mut units = truncated.mantissa();
	for _ in 0..missing_scale {
		units = units.checked_mul(10).ok_or(AmountError::Overflow)?;
	}

	u64::try_from(units).map_err(|_| AmountError::Overflow)
}

/// Formats an amount in smallest units as a decimal string without
/// trailing zeros, e.g. `150000000` with 8 decimals becomes `"1.5"`.
pub fn from_smallest_unit(units: u64, decimals: u32) -> Result<String, AmountError> {
	let value = Decimal::try_from_i128_with_scale(units as i128, decimals)
		.map_err(|_| AmountError::UnsupportedDecimals(decimals))?;
	Ok(value.normalize().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_to_smallest_unit() {
		assert_eq!(to_smallest_unit("1.5", 8), Ok(150_000_000));
		assert_eq!(to_smallest_unit("100", 8), Ok(10_000_000_000));
		assert_eq!(to_smallest_unit("0.000001", 6), Ok(1));
		assert_eq!(to_smallest_unit("0", 8), Ok(0));
	}

	#[test]
	fn test_to_smallest_unit_truncates_extra_digits() {
		assert_eq!(to_smallest_unit("1.23456789", 6), Ok(1_234_567));
	}

	#[test]
	fn test_to_smallest_unit_errors() {
		assert_eq!(to_smallest_unit("-1", 8), Err(AmountError::Negative));
		assert!(matches!(to_smallest_unit("abc", 8), Err(AmountError::Invalid(_))));
		assert!(matches!(to_smallest_unit("", 8), Err(AmountError::Invalid(_))));
		assert_eq!(
			to_smallest_unit("184467440737.09551616", 8),
			Err(AmountError::Overflow)
		);
		assert_eq!(
			to_smallest_unit("1", 29),
			Err(AmountError::UnsupportedDecimals(29))
		);
	}

	#[test]
	fn test_from_smallest_unit() {
		assert_eq!(from_smallest_unit(150_000_000, 8).unwrap(), "1.5");
		assert_eq!(from_smallest_unit(10_000_000_000, 8).unwrap(), "100");
		assert_eq!(from_smallest_unit(0, 6).unwrap(), "0");
	}
}
