//! Configuration types for the Velox client.

use serde::{Deserialize, Serialize};
use velox_types::{Address, Token};

use crate::networks::Network;

/// Address the Velox modules are published under when nothing else is configured.
pub const DEFAULT_VELOX_ADDRESS: &str =
	"0x6b3e1b9ba5e1b1e9c4a1f0a3c6a8f7d2e4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9";

/// Default JSON-RPC endpoint of the Shinami gas station for Movement.
pub const DEFAULT_GAS_STATION_URL: &str = "https://api.shinami.com/movement/gas/v1/";

/// Complete client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VeloxConfig {
	#[serde(default)]
	pub network: NetworkConfig,
	#[serde(default)]
	pub velox: ContractConfig,
	#[serde(default)]
	pub wallet: WalletConfig,
	#[serde(default)]
	pub sponsorship: SponsorshipConfig,
	/// Storage backend section, validated by the selected backend.
	#[serde(default = "default_storage")]
	pub storage: toml::Value,
	#[serde(default)]
	pub monitor: MonitorConfig,
	#[serde(default)]
	pub relayer: Option<RelayerConfig>,
	#[serde(default)]
	pub api: ApiConfig,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	#[serde(default = "default_tokens")]
	pub tokens: Vec<Token>,
}

impl Default for VeloxConfig {
	fn default() -> Self {
		Self {
			network: NetworkConfig::default(),
			velox: ContractConfig::default(),
			wallet: WalletConfig::default(),
			sponsorship: SponsorshipConfig::default(),
			storage: default_storage(),
			monitor: MonitorConfig::default(),
			relayer: None,
			api: ApiConfig::default(),
			log_level: default_log_level(),
			tokens: default_tokens(),
		}
	}
}

/// Fullnode connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Network preset.
	#[serde(default)]
	pub network: Network,
	/// Overrides the preset's fullnode URL.
	#[serde(default)]
	pub rpc_url: Option<String>,
	/// Overrides the preset's chain id.
	#[serde(default)]
	pub chain_id: Option<u8>,
	/// How long to wait for a submitted transaction to be committed.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	/// Gas limit for built transactions.
	#[serde(default = "default_max_gas_amount")]
	pub max_gas_amount: u64,
	/// Seconds until a built transaction expires.
	#[serde(default = "default_expiration_secs")]
	pub expiration_secs: u64,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			network: Network::default(),
			rpc_url: None,
			chain_id: None,
			timeout_secs: default_timeout_secs(),
			max_gas_amount: default_max_gas_amount(),
			expiration_secs: default_expiration_secs(),
		}
	}
}

impl NetworkConfig {
	/// Fullnode REST base URL, ending in `/v1`.
	pub fn fullnode_url(&self) -> String {
		self.rpc_url
			.clone()
			.unwrap_or_else(|| self.network.fullnode_url().to_string())
	}

	pub fn chain_id(&self) -> u8 {
		self.chain_id.unwrap_or_else(|| self.network.chain_id())
	}
}

/// Location of the Velox Move modules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
	pub address: Address,
}

impl Default for ContractConfig {
	fn default() -> Self {
		Self {
			address: DEFAULT_VELOX_ADDRESS
				.parse()
				.unwrap_or(Address::ZERO),
		}
	}
}

/// Which signing backend the session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletBackend {
	/// Embedded wallet that signs raw signing-message bytes.
	#[default]
	Embedded,
	/// Native wallet that signs whole transactions.
	Native,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WalletConfig {
	#[serde(default)]
	pub backend: WalletBackend,
	/// Hex-encoded Ed25519 private key of the session's account.
	#[serde(default)]
	pub private_key: Option<String>,
}

/// Gas station settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SponsorshipConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_gas_station_url")]
	pub endpoint: String,
	#[serde(default)]
	pub api_key: Option<String>,
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
}

impl Default for SponsorshipConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			endpoint: default_gas_station_url(),
			api_key: None,
			request_timeout_secs: default_request_timeout_secs(),
		}
	}
}

impl SponsorshipConfig {
	/// Sponsorship is only attempted when enabled and a key is present.
	pub fn is_active(&self) -> bool {
		self.enabled && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
	}
}

/// Polling intervals.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
	#[serde(default = "default_intents_interval")]
	pub intents_interval_secs: u64,
	#[serde(default = "default_progress_interval")]
	pub progress_interval_secs: u64,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			intents_interval_secs: default_intents_interval(),
			progress_interval_secs: default_progress_interval(),
		}
	}
}

/// Wallet used to complete sealed-bid auctions on behalf of anyone.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	pub wallet_id: String,
	pub private_key: String,
	/// Base URL of the app whose taker endpoint is notified after completion.
	#[serde(default)]
	pub app_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			port: default_api_port(),
		}
	}
}

fn default_storage() -> toml::Value {
	let mut table = toml::map::Map::new();
	table.insert("backend".to_string(), toml::Value::String("file".to_string()));
	table.insert(
		"storage_path".to_string(),
		toml::Value::String("./data/storage".to_string()),
	);
	toml::Value::Table(table)
}

fn default_tokens() -> Vec<Token> {
	vec![Token::native()]
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_timeout_secs() -> u64 {
	20
}

fn default_max_gas_amount() -> u64 {
	200_000
}

fn default_expiration_secs() -> u64 {
	60
}

fn default_true() -> bool {
	true
}

fn default_gas_station_url() -> String {
	DEFAULT_GAS_STATION_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
	15
}

fn default_intents_interval() -> u64 {
	5
}

fn default_progress_interval() -> u64 {
	10
}

fn default_api_port() -> u16 {
	3001
}
