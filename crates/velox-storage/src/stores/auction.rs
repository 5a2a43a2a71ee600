//! Auction parameters remembered at submission time.
//!
//! The chain only exposes the live auction state, so the parameters the
//! user picked (notably Dutch start/end prices) are kept here keyed by
//! intent id and shown alongside the intent.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use velox_types::{now_secs, AuctionKind, StoredAuctionInfo};

use crate::{StorageError, StorageService};

pub const AUCTION_NAMESPACE: &str = "velox_auction_intents";

/// Entries older than this are dropped by [`AuctionStore::cleanup`].
pub const AUCTION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Optional parameters of an auction submission.
#[derive(Debug, Clone, Default)]
pub struct AuctionParams {
	pub start_time: Option<u64>,
	pub end_time: Option<u64>,
	pub duration: Option<u64>,
	pub start_price: Option<u64>,
	pub end_price: Option<u64>,
}

impl AuctionParams {
	pub fn into_info(self, kind: AuctionKind) -> StoredAuctionInfo {
		StoredAuctionInfo {
			kind,
			start_time: self.start_time.unwrap_or_else(now_secs),
			end_time: self.end_time,
			duration: self.duration,
			start_price: self.start_price.map(|p| p.to_string()),
			end_price: self.end_price.map(|p| p.to_string()),
		}
	}
}

pub struct AuctionStore {
	storage: Arc<StorageService>,
}

impl AuctionStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Remembers the auction parameters of an intent. `start_time`
	/// defaults to now.
	pub async fn store_auction_intent(
		&self,
		intent_id: u64,
		kind: AuctionKind,
		params: AuctionParams,
	) -> Result<StoredAuctionInfo, StorageError> {
		let info = params.into_info(kind);
		self.store_info(intent_id, info.clone()).await?;
		Ok(info)
	}

	pub async fn store_info(
		&self,
		intent_id: u64,
		info: StoredAuctionInfo,
	) -> Result<(), StorageError> {
		let kind = info.kind;
		self.storage
			.update::<StoredAuctionInfo, _>(
				AUCTION_NAMESPACE,
				&intent_id.to_string(),
				Some(AUCTION_MAX_AGE),
				move |_| Some(info.clone()),
			)
			.await?;

		debug!(intent_id, kind = %kind, "Stored auction parameters");
		Ok(())
	}

	pub async fn get_stored_auction_info(
		&self,
		intent_id: u64,
	) -> Result<Option<StoredAuctionInfo>, StorageError> {
		self.storage
			.find(AUCTION_NAMESPACE, &intent_id.to_string())
			.await
	}

	pub async fn remove(&self, intent_id: u64) -> Result<(), StorageError> {
		self.storage
			.remove(AUCTION_NAMESPACE, &intent_id.to_string())
			.await
	}

	/// Drops entries written more than 24 hours ago.
	pub async fn cleanup(&self) -> Result<usize, StorageError> {
		self.storage
			.remove_older_than(AUCTION_NAMESPACE, AUCTION_MAX_AGE)
			.await
	}
}
