//! Movement network presets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Mainnet,
	Testnet,
	#[default]
	Bardock,
}

impl Network {
	pub fn fullnode_url(&self) -> &'static str {
		match self {
			Network::Mainnet => "https://mainnet.movementnetwork.xyz/v1",
			Network::Testnet => "https://aptos.testnet.porto.movementlabs.xyz/v1",
			Network::Bardock => "https://aptos.testnet.bardock.movementlabs.xyz/v1",
		}
	}

	pub fn chain_id(&self) -> u8 {
		match self {
			Network::Mainnet => 126,
			Network::Testnet => 177,
			Network::Bardock => 250,
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Network::Mainnet => f.write_str("mainnet"),
			Network::Testnet => f.write_str("testnet"),
			Network::Bardock => f.write_str("bardock"),
		}
	}
}

impl FromStr for Network {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"mainnet" => Ok(Network::Mainnet),
			"testnet" | "porto" => Ok(Network::Testnet),
			"bardock" => Ok(Network::Bardock),
			other => Err(format!("Unknown network: {}", other)),
		}
	}
}
