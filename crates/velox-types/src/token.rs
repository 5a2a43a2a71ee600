//! Static token descriptors.

use serde::{Deserialize, Serialize};

use crate::Address;

/// Fungible asset metadata address of the native coin.
pub const NATIVE_TOKEN_ADDRESS: Address = Address::from_u8(0xa);

/// A tradable token as configured for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Fungible asset metadata address.
	pub address: Address,
	pub symbol: String,
	pub name: String,
	pub decimals: u8,
	/// Path or URL of the token icon.
	#[serde(default)]
	pub icon: String,
}

impl Token {
	/// Whether this token is the chain's native coin.
	pub fn is_native(&self) -> bool {
		self.address == NATIVE_TOKEN_ADDRESS
	}

	/// Descriptor of the native MOVE coin.
	pub fn native() -> Self {
		Self {
			address: NATIVE_TOKEN_ADDRESS,
			symbol: "MOVE".to_string(),
			name: "Movement".to_string(),
			decimals: 8,
			icon: "/tokens/move.svg".to_string(),
		}
	}
}

/// Looks up a token by symbol (case-insensitive) or address.
pub fn find_token<'a>(tokens: &'a [Token], query: &str) -> Option<&'a Token> {
	let normalized = crate::normalize_address(query);
	tokens.iter().find(|t| {
		t.symbol.eq_ignore_ascii_case(query) || t.address.to_hex_literal() == normalized
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_find_token_by_symbol_or_address() {
		let tokens = vec![Token::native()];
		assert!(find_token(&tokens, "move").is_some());
		assert!(find_token(&tokens, "0xa").is_some());
		assert!(find_token(&tokens, "USDC").is_none());
		assert!(tokens[0].is_native());
	}
}
