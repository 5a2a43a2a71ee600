//! Intent submission and queries for the Velox protocol.
//!
//! [`IntentService`] turns intent parameters into entry-function payloads,
//! submits them through the delivery service and reads intents back from
//! the Velox view functions. Data the chain does not expose (auction
//! parameters, submission hashes, solver metadata) is kept in the local
//! stores and merged into the decoded records.

use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use velox_account::{AccountError, WalletContext};
use velox_chain::{first_u64, ChainError, ChainService};
use velox_delivery::{DeliveryError, DeliveryService, SubmissionOutcome};
use velox_storage::stores::{
	AuctionParams, AuctionStore, IntentTxStore, SolverMetadata, SolverMetadataStore,
};
use velox_storage::{StorageError, StorageService};
use velox_types::{
	now_secs, Address, AuctionKind, AuctionState, IntentRecord, ScheduledProgress,
	StoredAuctionInfo, SubmissionPath, TransactionError, TransactionHash, TransactionPayload,
};

pub mod auction;
pub mod decode;
pub mod errors;
pub mod payloads;

pub use decode::DecodeError;
pub use errors::decode_velox_error;
pub use payloads::{
	DcaParams, DutchParams, LimitOrderParams, PayloadBuilder, SealedBidParams, SwapParams,
	TwapParams, AUCTION_MODULE, SOLVER_REGISTRY_MODULE, SUBMISSION_MODULE,
};

#[derive(Debug, Error)]
pub enum IntentError {
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error(transparent)]
	Decode(#[from] DecodeError),
	#[error(transparent)]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Transaction(#[from] TransactionError),
	#[error(transparent)]
	Account(#[from] AccountError),
	#[error("Invalid intent parameters: {0}")]
	InvalidParams(String),
}

impl IntentError {
	/// Message suitable for end users, with Velox aborts translated.
	pub fn user_message(&self) -> String {
		match self {
			IntentError::Delivery(DeliveryError::ExecutionFailed { vm_status, .. }) => {
				decode_velox_error(vm_status)
			}
			other => decode_velox_error(&other.to_string()),
		}
	}
}

/// Result of submitting a new intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedIntent {
	pub tx_hash: TransactionHash,
	pub path: SubmissionPath,
	/// Id of the created intent, when it could be observed right away.
	pub intent_id: Option<u64>,
}

pub struct IntentService {
	delivery: Arc<DeliveryService>,
	builder: PayloadBuilder,
	auctions: AuctionStore,
	intent_tx: IntentTxStore,
	solvers: SolverMetadataStore,
	storage: Arc<StorageService>,
}

impl IntentService {
	pub fn new(
		delivery: Arc<DeliveryService>,
		contract: Address,
		storage: Arc<StorageService>,
	) -> Self {
		Self {
			delivery,
			builder: PayloadBuilder::new(contract),
			auctions: AuctionStore::new(storage.clone()),
			intent_tx: IntentTxStore::new(storage.clone()),
			solvers: SolverMetadataStore::new(storage.clone()),
			storage,
		}
	}

	pub fn builder(&self) -> &PayloadBuilder {
		&self.builder
	}

	pub fn chain(&self) -> &Arc<ChainService> {
		self.delivery.chain()
	}

	pub fn auctions(&self) -> &AuctionStore {
		&self.auctions
	}

	pub fn intent_tx(&self) -> &IntentTxStore {
		&self.intent_tx
	}

	pub async fn submit_swap(
		&self,
		ctx: &WalletContext,
		params: &SwapParams,
	) -> Result<SubmittedIntent, IntentError> {
		let payload = self.builder.swap(params)?;
		self.submit_intent(ctx, payload, None).await
	}

	pub async fn submit_limit_order(
		&self,
		ctx: &WalletContext,
		params: &LimitOrderParams,
	) -> Result<SubmittedIntent, IntentError> {
		let payload = self.builder.limit_order(params)?;
		self.submit_intent(ctx, payload, None).await
	}

	pub async fn submit_twap(
		&self,
		ctx: &WalletContext,
		params: &TwapParams,
	) -> Result<SubmittedIntent, IntentError> {
		let payload = self.builder.twap(params)?;
		self.submit_intent(ctx, payload, None).await
	}

	pub async fn submit_dca(
		&self,
		ctx: &WalletContext,
		params: &DcaParams,
	) -> Result<SubmittedIntent, IntentError> {
		let payload = self.builder.dca(params)?;
		self.submit_intent(ctx, payload, None).await
	}

	pub async fn submit_sealed_bid(
		&self,
		ctx: &WalletContext,
		params: &SealedBidParams,
	) -> Result<SubmittedIntent, IntentError> {
		let payload = self.builder.sealed_bid(params)?;
		let start_time = now_secs();
		let auction = AuctionParams {
			start_time: Some(start_time),
			end_time: Some(start_time.saturating_add(params.auction_duration)),
			duration: Some(params.auction_duration),
			..Default::default()
		}
		.into_info(AuctionKind::SealedBid);
		self.submit_intent(ctx, payload, Some(auction)).await
	}

	pub async fn submit_dutch(
		&self,
		ctx: &WalletContext,
		params: &DutchParams,
	) -> Result<SubmittedIntent, IntentError> {
		let payload = self.builder.dutch(params)?;
		let auction = AuctionParams {
			duration: Some(params.auction_duration),
			start_price: Some(params.start_price),
			end_price: Some(params.end_price),
			..Default::default()
		}
		.into_info(AuctionKind::Dutch);
		self.submit_intent(ctx, payload, Some(auction)).await
	}

	/// Submits a payload that creates an intent and correlates the
	/// transaction with the new intent id.
	///
	/// The intent id is not part of the transaction result. The user's
	/// highest intent id is read before submitting; the first higher id
	/// seen afterwards belongs to this submission. Bookkeeping failures are
	/// logged and never fail a submission that already reached the chain.
	async fn submit_intent(
		&self,
		ctx: &WalletContext,
		payload: TransactionPayload,
		auction: Option<StoredAuctionInfo>,
	) -> Result<SubmittedIntent, IntentError> {
		let user = ctx.require_address()?;
		let known_max_id = match self.latest_intent_id(&user).await {
			Ok(id) => Some(id),
			Err(e) => {
				warn!(user = %user.to_short_string(), "Failed to read intents before submit: {}", e);
				None
			}
		};

		let function = payload.entry_function().function_id();
		let outcome = self.delivery.submit(ctx, payload).await?;
		info!(
			user = %user.to_short_string(),
			function = %function,
			tx_hash = %outcome.tx_hash,
			path = %outcome.path,
			"Intent submitted"
		);

		let mut intent_id = None;
		if let Some(known_max_id) = known_max_id {
			if let Err(e) = self
				.intent_tx
				.record_pending(user, outcome.tx_hash, known_max_id, auction)
				.await
			{
				warn!(tx_hash = %outcome.tx_hash, "Failed to remember submission: {}", e);
			} else {
				intent_id = match self.resolve_pending(&user).await {
					Ok(resolved) => resolved.map(|(id, _)| id),
					Err(e) => {
						debug!(user = %user.to_short_string(), "Intent id not resolved yet: {}", e);
						None
					}
				};
			}
		}

		Ok(SubmittedIntent {
			tx_hash: outcome.tx_hash,
			path: outcome.path,
			intent_id,
		})
	}

	/// Matches the remembered submission of `user` against their current
	/// highest intent id.
	///
	/// Returns the newly resolved intent id and transaction hash, if any.
	/// Auction parameters remembered with the submission are stored under
	/// the resolved id.
	pub async fn resolve_pending(
		&self,
		user: &Address,
	) -> Result<Option<(u64, TransactionHash)>, IntentError> {
		if self.intent_tx.pending_for(user).await?.is_none() {
			return Ok(None);
		}
		let Some(max_id) = self.latest_intent_id(user).await? else {
			return Ok(None);
		};
		self.resolve_with_max_id(user, max_id).await
	}

	/// Like [`Self::resolve_pending`] with an already known highest id.
	pub async fn resolve_with_max_id(
		&self,
		user: &Address,
		max_id: u64,
	) -> Result<Option<(u64, TransactionHash)>, IntentError> {
		let Some(pending) = self.intent_tx.resolve(user, max_id).await? else {
			return Ok(None);
		};
		if let Some(info) = pending.auction {
			self.auctions.store_info(max_id, info).await?;
		}
		Ok(Some((max_id, pending.tx_hash)))
	}

	/// Highest intent id of `user`, `None` if they have none.
	async fn latest_intent_id(&self, user: &Address) -> Result<Option<u64>, IntentError> {
		Ok(self
			.fetch_user_intents(user)
			.await?
			.iter()
			.map(|intent| intent.id)
			.max())
	}

	pub async fn cancel_intent(
		&self,
		ctx: &WalletContext,
		intent_id: u64,
	) -> Result<SubmissionOutcome, IntentError> {
		let payload = self.builder.cancel_intent(intent_id)?;
		let outcome = self.delivery.submit(ctx, payload).await?;
		info!(intent_id, tx_hash = %outcome.tx_hash, "Intent cancelled");
		Ok(outcome)
	}

	/// Completes an ended sealed-bid auction. Anyone may call this.
	pub async fn complete_sealed_bid(
		&self,
		ctx: &WalletContext,
		intent_id: u64,
	) -> Result<SubmissionOutcome, IntentError> {
		let payload = self.builder.complete_sealed_bid(intent_id)?;
		let outcome = self.delivery.submit(ctx, payload).await?;
		info!(intent_id, tx_hash = %outcome.tx_hash, "Sealed-bid auction completed");
		Ok(outcome)
	}

	/// Registers the wallet as a solver and stores its display metadata.
	///
	/// The metadata address is always the registering wallet.
	pub async fn register_solver(
		&self,
		ctx: &WalletContext,
		stake_amount: u64,
		metadata: Option<SolverMetadata>,
	) -> Result<SubmissionOutcome, IntentError> {
		let solver = ctx.require_address()?;
		let payload = self.builder.register_solver(stake_amount)?;
		let outcome = self.delivery.submit(ctx, payload).await?;
		info!(
			solver = %solver.to_short_string(),
			stake_amount,
			tx_hash = %outcome.tx_hash,
			"Solver registered"
		);

		if let Some(metadata) = metadata {
			let metadata = SolverMetadata {
				address: solver,
				..metadata
			};
			if let Err(e) = self.solvers.save(metadata).await {
				warn!(solver = %solver.to_short_string(), "Failed to store solver metadata: {}", e);
			}
		}
		Ok(outcome)
	}

	pub async fn solver_metadata(
		&self,
		solver: &Address,
	) -> Result<Option<SolverMetadata>, IntentError> {
		Ok(self.solvers.get(solver).await?)
	}

	async fn call_view(
		&self,
		module: &str,
		function: &str,
		args: Vec<Value>,
	) -> Result<Vec<Value>, ChainError> {
		self.chain()
			.view(self.builder.function_id(module, function), vec![], args)
			.await
	}

	/// Fetches one intent. `None` if it does not exist.
	pub async fn get_intent(&self, intent_id: u64) -> Result<Option<IntentRecord>, IntentError> {
		let values = match self
			.call_view(SUBMISSION_MODULE, "get_intent", vec![json!(intent_id.to_string())])
			.await
		{
			Ok(values) => values,
			Err(e) if e.is_missing_data() => return Ok(None),
			Err(e) => return Err(e.into()),
		};

		let Some(value) = values.first() else {
			return Ok(None);
		};
		match decode::decode_optional_intent(value)? {
			Some(record) => Ok(Some(self.enrich(record).await)),
			None => Ok(None),
		}
	}

	async fn fetch_user_intents(&self, user: &Address) -> Result<Vec<IntentRecord>, IntentError> {
		let values = match self
			.call_view(
				SUBMISSION_MODULE,
				"get_user_intents",
				vec![json!(user.to_hex_literal())],
			)
			.await
		{
			Ok(values) => values,
			Err(e) if e.is_missing_data() => {
				debug!(user = %user.to_short_string(), "No intents stored for user");
				return Ok(Vec::new());
			}
			Err(e) => return Err(e.into()),
		};

		match values.first() {
			Some(list) => Ok(decode::decode_intent_list(list)?),
			None => Ok(Vec::new()),
		}
	}

	/// Fetches all intents of `user`, newest first, enriched with locally
	/// stored data. An uninitialized protocol yields an empty list.
	pub async fn get_user_intents(&self, user: &Address) -> Result<Vec<IntentRecord>, IntentError> {
		let mut intents = self.fetch_user_intents(user).await?;
		intents.sort_by(|a, b| b.id.cmp(&a.id));
		Ok(join_all(intents.into_iter().map(|intent| self.enrich(intent))).await)
	}

	/// Number of intents ever created.
	pub async fn get_intent_count(&self) -> Result<u64, IntentError> {
		match self.call_view(SUBMISSION_MODULE, "get_intent_count", vec![]).await {
			Ok(values) => Ok(first_u64(&values)?),
			Err(e) if e.is_missing_data() => Ok(0),
			Err(e) => Err(e.into()),
		}
	}

	pub async fn get_auction_state(&self, intent_id: u64) -> Result<AuctionState, IntentError> {
		let values = match self
			.call_view(AUCTION_MODULE, "get_auction_state", vec![json!(intent_id.to_string())])
			.await
		{
			Ok(values) => values,
			Err(e) if e.is_missing_data() => return Ok(AuctionState::None),
			Err(e) => return Err(e.into()),
		};
		match values.first() {
			Some(value) => Ok(decode::decode_auction_state(value)?),
			None => Ok(AuctionState::None),
		}
	}

	/// Execution progress of a TWAP or DCA intent.
	pub async fn get_scheduled_progress(
		&self,
		intent_id: u64,
	) -> Result<ScheduledProgress, IntentError> {
		let values = self
			.call_view(
				SUBMISSION_MODULE,
				"get_scheduled_progress",
				vec![json!(intent_id.to_string())],
			)
			.await?;
		Ok(decode::decode_scheduled_progress(intent_id, &values)?)
	}

	/// Attaches stored auction parameters and the submission hash.
	async fn enrich(&self, mut record: IntentRecord) -> IntentRecord {
		match self.auctions.get_stored_auction_info(record.id).await {
			Ok(auction) => record.auction = auction,
			Err(e) => warn!(intent_id = record.id, "Failed to read auction info: {}", e),
		}
		match self.intent_tx.get_tx_hash(record.id).await {
			Ok(tx_hash) => record.tx_hash = tx_hash,
			Err(e) => warn!(intent_id = record.id, "Failed to read submission hash: {}", e),
		}
		record
	}

	/// Prunes all local stores. Returns the number of removed entries.
	pub async fn cleanup(&self) -> Result<usize, IntentError> {
		let removed = self.auctions.cleanup().await?
			+ self.intent_tx.cleanup().await?
			+ self.solvers.cleanup().await?
			+ self.storage.purge_expired().await?;
		if removed > 0 {
			info!(removed, "Pruned local intent stores");
		}
		Ok(removed)
	}
}
