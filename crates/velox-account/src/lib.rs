//! Wallet context for the Velox client.
//!
//! Two kinds of wallets can back a session. An embedded wallet only signs
//! raw bytes, so the client computes the signing message and assembles the
//! Ed25519 authenticator itself. A native wallet signs whole transactions
//! and hands back a finished authenticator. [`WalletContext`] hides the
//! difference: it is selected once per session and exposes a single
//! [`WalletContext::sign`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use velox_config::{WalletBackend, WalletConfig};
use velox_types::{
	AccountAuthenticator, Address, ConfigSchema, Ed25519PublicKey, Ed25519Signature, Field,
	FieldType, Schema, SimpleTransaction, TransactionError, ValidationError,
};

pub mod implementations {
	pub mod local;
}

pub use implementations::local::LocalKey;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Wallet not connected")]
	NotConnected,
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Transaction error: {0}")]
	Transaction(#[from] TransactionError),
}

/// A wallet that signs arbitrary bytes with an Ed25519 key.
#[async_trait]
pub trait RawHashSigner: Send + Sync {
	fn public_key(&self) -> Ed25519PublicKey;

	async fn sign_raw(&self, message: &[u8]) -> Result<Ed25519Signature, AccountError>;
}

/// A wallet that signs transactions and returns the full authenticator.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
	fn address(&self) -> Address;

	async fn sign_transaction(
		&self,
		txn: &SimpleTransaction,
	) -> Result<AccountAuthenticator, AccountError>;
}

/// Signs through a [`RawHashSigner`], building the authenticator locally.
#[derive(Clone)]
pub struct EmbeddedSigner {
	address: Address,
	inner: Arc<dyn RawHashSigner>,
}

impl EmbeddedSigner {
	/// The address defaults to the one derived from the signer's key.
	pub fn new(inner: Arc<dyn RawHashSigner>) -> Self {
		let address = inner.public_key().derive_address();
		Self { address, inner }
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub async fn sign(&self, txn: &SimpleTransaction) -> Result<AccountAuthenticator, AccountError> {
		let message = txn.signing_message()?;
		let signature = self.inner.sign_raw(&message).await?;
		Ok(AccountAuthenticator::ed25519(
			self.inner.public_key(),
			signature,
		))
	}
}

/// Delegates signing to a [`TransactionSigner`].
#[derive(Clone)]
pub struct NativeSigner {
	inner: Arc<dyn TransactionSigner>,
}

impl NativeSigner {
	pub fn new(inner: Arc<dyn TransactionSigner>) -> Self {
		Self { inner }
	}

	pub fn address(&self) -> Address {
		self.inner.address()
	}

	pub async fn sign(&self, txn: &SimpleTransaction) -> Result<AccountAuthenticator, AccountError> {
		self.inner.sign_transaction(txn).await
	}
}

/// The one signer of a session.
#[derive(Clone)]
pub enum Signer {
	Embedded(EmbeddedSigner),
	Native(NativeSigner),
}

impl Signer {
	pub fn address(&self) -> Address {
		match self {
			Signer::Embedded(signer) => signer.address(),
			Signer::Native(signer) => signer.address(),
		}
	}

	pub async fn sign(&self, txn: &SimpleTransaction) -> Result<AccountAuthenticator, AccountError> {
		match self {
			Signer::Embedded(signer) => signer.sign(txn).await,
			Signer::Native(signer) => signer.sign(txn).await,
		}
	}
}

/// Per-session wallet state.
#[derive(Clone, Default)]
pub struct WalletContext {
	signer: Option<Signer>,
}

impl WalletContext {
	/// Picks the session's backend. An embedded wallet wins over a native
	/// one when both are available.
	pub fn select(embedded: Option<EmbeddedSigner>, native: Option<NativeSigner>) -> Self {
		let signer = match (embedded, native) {
			(Some(embedded), _) => Some(Signer::Embedded(embedded)),
			(None, Some(native)) => Some(Signer::Native(native)),
			(None, None) => None,
		};
		Self { signer }
	}

	pub fn disconnected() -> Self {
		Self::default()
	}

	pub fn is_connected(&self) -> bool {
		self.signer.is_some()
	}

	pub fn is_embedded(&self) -> bool {
		matches!(self.signer, Some(Signer::Embedded(_)))
	}

	pub fn wallet_address(&self) -> Option<Address> {
		self.signer.as_ref().map(Signer::address)
	}

	pub fn signer(&self) -> Result<&Signer, AccountError> {
		self.signer.as_ref().ok_or(AccountError::NotConnected)
	}

	/// Address of the connected wallet, or [`AccountError::NotConnected`].
	pub fn require_address(&self) -> Result<Address, AccountError> {
		self.wallet_address().ok_or(AccountError::NotConnected)
	}

	pub async fn sign(&self, txn: &SimpleTransaction) -> Result<AccountAuthenticator, AccountError> {
		self.signer()?.sign(txn).await
	}
}

impl std::fmt::Debug for WalletContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WalletContext")
			.field("wallet_address", &self.wallet_address())
			.field("is_embedded", &self.is_embedded())
			.finish()
	}
}

/// Configuration schema for the `[wallet]` section.
pub struct WalletSchema;

impl ConfigSchema for WalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("backend", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("embedded") | Some("native") => Ok(()),
						other => Err(format!("Unknown wallet backend: {:?}", other)),
					}
				}),
				Field::new("private_key", FieldType::String)
					.with_validator(velox_types::validate_private_key),
			],
		);
		schema.validate(config)
	}
}

/// Builds the session's wallet context from configuration.
///
/// Without a private key the context is disconnected, which still allows
/// read-only use of the client.
pub fn create_account(config: &WalletConfig) -> Result<WalletContext, AccountError> {
	let value = toml::Value::try_from(config).map_err(|e| AccountError::InvalidKey(e.to_string()))?;
	WalletSchema
		.validate(&value)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let Some(private_key) = config.private_key.as_deref() else {
		info!("No wallet key configured, running without a signer");
		return Ok(WalletContext::disconnected());
	};

	let key = Arc::new(LocalKey::from_hex(private_key)?);
	let context = match config.backend {
		WalletBackend::Embedded => WalletContext::select(Some(EmbeddedSigner::new(key)), None),
		WalletBackend::Native => WalletContext::select(None, Some(NativeSigner::new(key))),
	};

	if let Some(address) = context.wallet_address() {
		info!(
			"Using {} wallet {}",
			if context.is_embedded() { "embedded" } else { "native" },
			address
		);
	}
	Ok(context)
}
