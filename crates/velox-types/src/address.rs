//! Account address type for the Movement network.
//!
//! Addresses are 32 bytes. Human readable formats (JSON, TOML) carry them as
//! `0x`-prefixed hex strings, while BCS carries the raw bytes.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an account address in bytes.
pub const ADDRESS_LENGTH: usize = 32;

/// Errors that can occur when parsing an address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
	#[error("Address is empty")]
	Empty,
	#[error("Address too long: {0} hex characters")]
	TooLong(usize),
	#[error("Invalid hex in address: {0}")]
	InvalidHex(String),
}

/// A 32-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
	pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

	/// Builds a "special" address such as `0x1` or `0xa` from its last byte.
	pub const fn from_u8(value: u8) -> Self {
		let mut bytes = [0u8; ADDRESS_LENGTH];
		bytes[ADDRESS_LENGTH - 1] = value;
		Address(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
		&self.0
	}

	/// Full 66-character lowercase representation.
	pub fn to_hex_literal(&self) -> String {
		format!("0x{}", hex::encode(self.0))
	}

	/// Short representation with leading zeros stripped, e.g. `0x1`.
	pub fn to_short_string(&self) -> String {
		let full = hex::encode(self.0);
		let trimmed = full.trim_start_matches('0');
		if trimmed.is_empty() {
			"0x0".to_string()
		} else {
			format!("0x{}", trimmed)
		}
	}
}

impl FromStr for Address {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		let hex_part = s
			.strip_prefix("0x")
			.or_else(|| s.strip_prefix("0X"))
			.unwrap_or(s);

		if hex_part.is_empty() {
			return Err(AddressError::Empty);
		}
		if hex_part.len() > ADDRESS_LENGTH * 2 {
			return Err(AddressError::TooLong(hex_part.len()));
		}

		let padded = format!("{:0>64}", hex_part);
		let mut bytes = [0u8; ADDRESS_LENGTH];
		hex::decode_to_slice(&padded, &mut bytes)
			.map_err(|e| AddressError::InvalidHex(e.to_string()))?;
		Ok(Address(bytes))
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex_literal())
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Address({})", self.to_short_string())
	}
}

impl Serialize for Address {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		if serializer.is_human_readable() {
			serializer.serialize_str(&self.to_hex_literal())
		} else {
			self.0.serialize(serializer)
		}
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		if deserializer.is_human_readable() {
			let s = String::deserialize(deserializer)?;
			Address::from_str(&s).map_err(de::Error::custom)
		} else {
			<[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Address)
		}
	}
}

/// Normalizes any textual address into its 66-character lowercase form.
///
/// Short forms are left-padded with zeros. Input that is not a valid
/// address is returned lowercased and otherwise untouched, so callers can
/// compare user-supplied strings without handling parse errors.
pub fn normalize_address(address: &str) -> String {
	match Address::from_str(address) {
		Ok(parsed) => parsed.to_hex_literal(),
		Err(_) => address.trim().to_lowercase(),
	}
}
