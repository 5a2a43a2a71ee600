//! Correlation between submissions and the intent ids they created.
//!
//! Submitting an intent returns a transaction hash but not the new intent
//! id. After a submit the hash is remembered as pending together with the
//! highest intent id the user had at that time; the first poll that sees a
//! higher id resolves the pending entry into an id → hash mapping.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use velox_types::{now_secs, Address, StoredAuctionInfo, TransactionHash};

use crate::{StorageError, StorageService};

pub const PENDING_TX_NAMESPACE: &str = "velox_pending_intent_tx";
pub const INTENT_TX_NAMESPACE: &str = "velox_intent_tx_hashes";

pub const PENDING_MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const MAPPING_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A submission whose intent id is not known yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
	pub tx_hash: TransactionHash,
	pub user: Address,
	/// Highest intent id of the user when the transaction was submitted.
	pub known_max_id: Option<u64>,
	pub submitted_at: u64,
	/// Auction parameters to attach to the intent once its id is known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auction: Option<StoredAuctionInfo>,
}

pub struct IntentTxStore {
	storage: Arc<StorageService>,
}

impl IntentTxStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Remembers the latest submission of `user`, replacing an older one.
	pub async fn record_pending(
		&self,
		user: Address,
		tx_hash: TransactionHash,
		known_max_id: Option<u64>,
		auction: Option<StoredAuctionInfo>,
	) -> Result<(), StorageError> {
		let pending = PendingSubmission {
			tx_hash,
			user,
			known_max_id,
			submitted_at: now_secs(),
			auction,
		};
		self.storage
			.update::<PendingSubmission, _>(
				PENDING_TX_NAMESPACE,
				&user.to_hex_literal(),
				Some(PENDING_MAX_AGE),
				move |_| Some(pending.clone()),
			)
			.await?;
		debug!(user = %user.to_short_string(), tx_hash = %tx_hash, "Recorded pending submission");
		Ok(())
	}

	pub async fn pending_for(&self, user: &Address) -> Result<Option<PendingSubmission>, StorageError> {
		self.storage
			.find(PENDING_TX_NAMESPACE, &user.to_hex_literal())
			.await
	}

	/// Resolves the pending submission of `user` if `max_id` is newer than
	/// what the user had when submitting.
	///
	/// Returns the resolved submission, or `None` when nothing was pending,
	/// the id is not new, or a concurrent caller resolved it first.
	pub async fn resolve(
		&self,
		user: &Address,
		max_id: u64,
	) -> Result<Option<PendingSubmission>, StorageError> {
		let claimed = self
			.storage
			.take_if::<PendingSubmission, _>(PENDING_TX_NAMESPACE, &user.to_hex_literal(), |pending| {
				!pending.known_max_id.is_some_and(|known| max_id <= known)
			})
			.await?;
		let Some(pending) = claimed else {
			return Ok(None);
		};

		self.set_tx_hash(max_id, pending.tx_hash).await?;

		info!(intent_id = max_id, tx_hash = %pending.tx_hash, "Resolved submission to intent");
		Ok(Some(pending))
	}

	/// Associates a tx hash with a known intent id directly.
	pub async fn set_tx_hash(
		&self,
		intent_id: u64,
		tx_hash: TransactionHash,
	) -> Result<(), StorageError> {
		self.storage
			.store_with_ttl(
				INTENT_TX_NAMESPACE,
				&intent_id.to_string(),
				&tx_hash,
				Some(MAPPING_MAX_AGE),
			)
			.await
	}

	pub async fn get_tx_hash(&self, intent_id: u64) -> Result<Option<TransactionHash>, StorageError> {
		self.storage
			.find(INTENT_TX_NAMESPACE, &intent_id.to_string())
			.await
	}

	/// Drops pending entries older than an hour and mappings older than a
	/// week. Returns the number of removed entries.
	pub async fn cleanup(&self) -> Result<usize, StorageError> {
		let pending = self
			.storage
			.remove_older_than(PENDING_TX_NAMESPACE, PENDING_MAX_AGE)
			.await?;
		let mappings = self
			.storage
			.remove_older_than(INTENT_TX_NAMESPACE, MAPPING_MAX_AGE)
			.await?;
		Ok(pending + mappings)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;

	fn store() -> IntentTxStore {
		IntentTxStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn hash(byte: u8) -> TransactionHash {
		TransactionHash([byte; 32])
	}

	#[tokio::test]
	async fn test_resolves_only_newer_ids() {
		let store = store();
		let user = Address::from_u8(0x42);
		store.record_pending(user, hash(1), Some(5), None).await.unwrap();

		// Same max id as before the submit: not ours yet.
		assert_eq!(store.resolve(&user, 5).await.unwrap(), None);
		assert!(store.pending_for(&user).await.unwrap().is_some());

		let resolved = store.resolve(&user, 6).await.unwrap().unwrap();
		assert_eq!(resolved.tx_hash, hash(1));
		assert_eq!(store.get_tx_hash(6).await.unwrap(), Some(hash(1)));
		assert!(store.pending_for(&user).await.unwrap().is_none());

		// Resolved once only.
		assert_eq!(store.resolve(&user, 7).await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_concurrent_resolves_claim_once() {
		let store = store();
		let user = Address::from_u8(0x42);
		store.record_pending(user, hash(1), Some(5), None).await.unwrap();

		let (a, b) = tokio::join!(store.resolve(&user, 6), store.resolve(&user, 6));
		let resolved: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
		assert_eq!(resolved.len(), 1);
		assert_eq!(resolved[0].tx_hash, hash(1));
		assert_eq!(store.get_tx_hash(6).await.unwrap(), Some(hash(1)));
		assert!(store.pending_for(&user).await.unwrap().is_none());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_parallel_resolves_claim_once() {
		let store = Arc::new(store());
		let user = Address::from_u8(0x43);
		store.record_pending(user, hash(2), None, None).await.unwrap();

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let store = store.clone();
				tokio::spawn(async move { store.resolve(&user, 1).await })
			})
			.collect();

		let mut resolved = 0;
		for handle in handles {
			if handle.await.unwrap().unwrap().is_some() {
				resolved += 1;
			}
		}
		assert_eq!(resolved, 1);
	}

	#[tokio::test]
	async fn test_first_intent_of_user() {
		let store = store();
		let user = Address::from_u8(0x7);
		store.record_pending(user, hash(9), None, None).await.unwrap();
		let resolved = store.resolve(&user, 0).await.unwrap().unwrap();
		assert_eq!(resolved.tx_hash, hash(9));
	}

	#[tokio::test]
	async fn test_direct_mapping_and_cleanup() {
		let store = store();
		store.set_tx_hash(3, hash(3)).await.unwrap();
		assert_eq!(store.get_tx_hash(3).await.unwrap(), Some(hash(3)));
		assert_eq!(store.get_tx_hash(4).await.unwrap(), None);
		assert_eq!(store.cleanup().await.unwrap(), 0);
	}
}
