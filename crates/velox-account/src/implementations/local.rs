//! Local Ed25519 key.
//!
//! Suitable for development, scripts and the auction relayer. It can stand
//! in for either wallet backend.

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use velox_types::{
	AccountAuthenticator, Address, Ed25519PublicKey, Ed25519Signature, SimpleTransaction,
};

use crate::{AccountError, RawHashSigner, TransactionSigner};

pub struct LocalKey {
	signing_key: SigningKey,
}

impl LocalKey {
	/// Parses a hex private key, with or without `0x` or the
	/// `ed25519-priv-` prefix.
	pub fn from_hex(private_key: &str) -> Result<Self, AccountError> {
		let hex_part = private_key
			.trim()
			.strip_prefix("ed25519-priv-")
			.unwrap_or(private_key.trim())
			.trim_start_matches("0x");

		let mut bytes = [0u8; 32];
		hex::decode_to_slice(hex_part, &mut bytes)
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self {
			signing_key: SigningKey::from_bytes(&bytes),
		})
	}

	pub fn address(&self) -> Address {
		RawHashSigner::public_key(self).derive_address()
	}
}

#[async_trait]
impl RawHashSigner for LocalKey {
	fn public_key(&self) -> Ed25519PublicKey {
		Ed25519PublicKey(self.signing_key.verifying_key().to_bytes().to_vec())
	}

	async fn sign_raw(&self, message: &[u8]) -> Result<Ed25519Signature, AccountError> {
		let signature = self.signing_key.sign(message);
		Ok(Ed25519Signature(signature.to_bytes().to_vec()))
	}
}

#[async_trait]
impl TransactionSigner for LocalKey {
	fn address(&self) -> Address {
		LocalKey::address(self)
	}

	async fn sign_transaction(
		&self,
		txn: &SimpleTransaction,
	) -> Result<AccountAuthenticator, AccountError> {
		let message = txn.signing_message()?;
		let signature = self.sign_raw(&message).await?;
		Ok(AccountAuthenticator::ed25519(
			RawHashSigner::public_key(self),
			signature,
		))
	}
}
