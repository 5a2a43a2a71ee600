//! Configuration loading for the Velox client.
//!
//! Configuration is read from a TOML, JSON or YAML file, `${VAR}` references
//! are substituted from the environment, well-known environment variables
//! override file values, and the result is validated.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

pub mod networks;
pub mod types;

pub use networks::Network;
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Environment variables that override configuration values.
pub mod env_keys {
	pub const VELOX_ADDRESS: &str = "NEXT_PUBLIC_VELOX_ADDRESS";
	pub const RPC_URL: &str = "NEXT_PUBLIC_RPC_URL";
	pub const GAS_STATION_KEY: &str = "SHINAMI_KEY";
	pub const RELAYER_WALLET_ID: &str = "SHINAMI_WALLET_ID";
	pub const RELAYER_SECRET: &str = "SHINAMI_WALLET_SECRET";
	pub const APP_URL: &str = "NEXT_PUBLIC_APP_URL";
	pub const PRIVATE_KEY: &str = "VELOX_PRIVATE_KEY";
	pub const LOG_LEVEL: &str = "VELOX_LOG_LEVEL";
}

fn env_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env: Box::new(|key| std::env::var(key).ok()),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	/// Replaces the process environment as the source of variables.
	pub fn with_env<F>(mut self, env: F) -> Self
	where
		F: Fn(&str) -> Option<String> + Send + Sync + 'static,
	{
		self.env = Box::new(env);
		self
	}

	/// Loads, overrides and validates the configuration.
	///
	/// Without a file the defaults are used, so a client can be driven
	/// entirely from environment variables.
	pub async fn load(&self) -> Result<VeloxConfig, ConfigError> {
		let mut config = match &self.file_path {
			Some(path) => self.load_from_file(path).await?,
			None => {
				info!("No configuration file given, using defaults");
				VeloxConfig::default()
			}
		};

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, path: &Path) -> Result<VeloxConfig, ConfigError> {
		info!("Loading configuration from {:?}", path);

		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(path.display().to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;
		let content = self.substitute_env_vars(&content)?;

		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") | None => Self::from_toml(&content),
			Some("json") => {
				serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
			}
			Some("yaml") | Some("yml") => {
				serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
			}
			Some(other) => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				other
			))),
		}
	}

	pub fn from_toml(content: &str) -> Result<VeloxConfig, ConfigError> {
		toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		for cap in env_pattern().captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let value =
				(self.env)(var_name).ok_or_else(|| ConfigError::EnvVarNotFound(var_name.to_string()))?;
			result = result.replace(full_match, &value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut VeloxConfig) -> Result<(), ConfigError> {
		let env = |key: &str| (self.env)(key).filter(|v| !v.trim().is_empty());

		if let Some(address) = env(env_keys::VELOX_ADDRESS) {
			debug!("Overriding Velox address from environment");
			config.velox.address = address.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid {}: {}", env_keys::VELOX_ADDRESS, e))
			})?;
		}

		if let Some(url) = env(env_keys::RPC_URL) {
			debug!("Overriding fullnode URL from environment");
			config.network.rpc_url = Some(url);
		}

		if let Some(key) = env(env_keys::GAS_STATION_KEY) {
			debug!("Overriding gas station key from environment");
			config.sponsorship.api_key = Some(key);
		}

		if let Some(key) = env(env_keys::PRIVATE_KEY) {
			debug!("Overriding wallet key from environment");
			config.wallet.private_key = Some(key);
		}

		if let Some(level) = env(env_keys::LOG_LEVEL) {
			config.log_level = level;
		}

		let wallet_id = env(env_keys::RELAYER_WALLET_ID);
		let secret = env(env_keys::RELAYER_SECRET);
		let app_url = env(env_keys::APP_URL);
		if let Some(relayer) = config.relayer.as_mut() {
			if let Some(wallet_id) = wallet_id {
				relayer.wallet_id = wallet_id;
			}
			if let Some(secret) = secret {
				relayer.private_key = secret;
			}
			if app_url.is_some() {
				relayer.app_url = app_url;
			}
		} else if let (Some(wallet_id), Some(private_key)) = (wallet_id, secret) {
			debug!("Configuring auction relayer from environment");
			config.relayer = Some(RelayerConfig {
				wallet_id,
				private_key,
				app_url,
			});
		}

		Ok(())
	}
}

/// Checks cross-field constraints that serde cannot express.
pub fn validate_config(config: &VeloxConfig) -> Result<(), ConfigError> {
	let url = config.network.fullnode_url();
	if !(url.starts_with("http://") || url.starts_with("https://")) {
		return Err(ConfigError::ValidationError(format!(
			"Fullnode URL must be http(s): {}",
			url
		)));
	}

	if config.network.timeout_secs == 0 {
		return Err(ConfigError::ValidationError(
			"network.timeout_secs must be greater than zero".to_string(),
		));
	}

	if config.monitor.intents_interval_secs == 0 || config.monitor.progress_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"Monitor intervals must be greater than zero".to_string(),
		));
	}

	if config.sponsorship.enabled && config.sponsorship.endpoint.is_empty() {
		return Err(ConfigError::ValidationError(
			"Sponsorship is enabled but no endpoint is configured".to_string(),
		));
	}

	let mut symbols = std::collections::HashSet::new();
	for token in &config.tokens {
		if !symbols.insert(token.symbol.to_ascii_uppercase()) {
			return Err(ConfigError::ValidationError(format!(
				"Duplicate token symbol: {}",
				token.symbol
			)));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn loader_with(vars: &[(&str, &str)]) -> ConfigLoader {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		ConfigLoader::new().with_env(move |key| vars.get(key).cloned())
	}

	#[tokio::test]
	async fn test_defaults_without_file() {
		let config = loader_with(&[]).load().await.unwrap();
		assert_eq!(config.network.network, Network::Bardock);
		assert_eq!(config.network.chain_id(), 250);
		assert_eq!(config.monitor.intents_interval_secs, 5);
		assert_eq!(config.monitor.progress_interval_secs, 10);
		assert!(!config.sponsorship.is_active());
		assert!(config.relayer.is_none());
	}

	#[tokio::test]
	async fn test_file_with_substitution_and_overrides() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("velox.toml");
		tokio::fs::write(
			&path,
			r#"
[network]
network = "testnet"

[sponsorship]
api_key = "${GAS_KEY}"

[[tokens]]
address = "0xa"
symbol = "MOVE"
name = "Movement"
decimals = 8

[[tokens]]
address = "0x1234"
symbol = "tUSDC"
name = "Test USDC"
decimals = 6
"#,
		)
		.await
		.unwrap();

		let config = loader_with(&[
			("GAS_KEY", "secret"),
			(env_keys::VELOX_ADDRESS, "0xbeef"),
			(env_keys::RPC_URL, "http://localhost:8080/v1"),
			(env_keys::RELAYER_WALLET_ID, "relayer-1"),
			(env_keys::RELAYER_SECRET, "ab"),
		])
		.with_file(&path)
		.load()
		.await
		.unwrap();

		assert_eq!(config.sponsorship.api_key.as_deref(), Some("secret"));
		assert!(config.sponsorship.is_active());
		assert_eq!(config.velox.address, "0xbeef".parse().unwrap());
		assert_eq!(config.network.fullnode_url(), "http://localhost:8080/v1");
		assert_eq!(config.network.chain_id(), 177);
		assert_eq!(config.tokens.len(), 2);
		assert_eq!(config.tokens[1].decimals, 6);
		assert_eq!(config.relayer.unwrap().wallet_id, "relayer-1");
	}

	#[tokio::test]
	async fn test_missing_substitution_variable() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("velox.toml");
		tokio::fs::write(&path, "[sponsorship]\napi_key = \"${NOPE}\"\n")
			.await
			.unwrap();

		let result = loader_with(&[]).with_file(&path).load().await;
		assert!(matches!(result, Err(ConfigError::EnvVarNotFound(v)) if v == "NOPE"));
	}

	#[tokio::test]
	async fn test_missing_file() {
		let result = loader_with(&[]).with_file("/nonexistent/velox.toml").load().await;
		assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
	}

	#[test]
	fn test_validation_rejects_duplicate_symbols() {
		let mut config = VeloxConfig::default();
		config.tokens.push(velox_types::Token::native());
		assert!(matches!(
			validate_config(&config),
			Err(ConfigError::ValidationError(_))
		));
	}
}
