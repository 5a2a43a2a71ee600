//! Permissionless completion of sealed-bid auctions.
//!
//! Once a sealed-bid auction ended anyone may call
//! `auction::complete_sealed_bid`. The relayer does so from its own wallet,
//! through the same sponsored-first delivery as user submissions.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use velox_account::{LocalKey, NativeSigner, WalletContext};
use velox_config::RelayerConfig;
use velox_delivery::DeliveryError;
use velox_intents::auction::{is_completable, seconds_remaining};
use velox_intents::{IntentError, IntentService};
use velox_types::{
	now_secs, Address, AuctionEvent, AuctionState, EventBus, TransactionHash, VeloxEvent,
};

use crate::CoreError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
	pub intent_id: u64,
	pub tx_hash: TransactionHash,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TakerNotification {
	intent_id: u64,
	tx_hash: TransactionHash,
	taker: Address,
}

pub struct AuctionRelayer {
	intents: Arc<IntentService>,
	wallet: WalletContext,
	wallet_id: String,
	app_url: Option<String>,
	http: reqwest::Client,
	events: EventBus,
}

impl AuctionRelayer {
	pub fn new(
		intents: Arc<IntentService>,
		wallet: WalletContext,
		wallet_id: impl Into<String>,
		app_url: Option<String>,
		events: EventBus,
	) -> Self {
		Self {
			intents,
			wallet,
			wallet_id: wallet_id.into(),
			app_url: app_url.map(|url| url.trim_end_matches('/').to_string()),
			http: reqwest::Client::new(),
			events,
		}
	}

	pub fn wallet_id(&self) -> &str {
		&self.wallet_id
	}

	pub fn wallet_address(&self) -> Option<Address> {
		self.wallet.wallet_address()
	}

	/// Completes the sealed-bid auction of `intent_id`.
	///
	/// Auctions that are still open or not sealed-bid are refused before
	/// anything is sent. An on-chain failure is reported as
	/// [`CoreError::CompletionFailed`] carrying the VM status.
	pub async fn complete(&self, intent_id: u64) -> Result<Completion, CoreError> {
		let state = self.intents.get_auction_state(intent_id).await?;
		let now = now_secs();
		if !is_completable(&state, now) {
			return Err(match state {
				AuctionState::SealedBidActive { .. } => CoreError::AuctionNotEnded {
					intent_id,
					remaining_secs: seconds_remaining(&state, now),
				},
				_ => CoreError::NoSealedBidAuction { intent_id },
			});
		}

		info!(intent_id, wallet_id = %self.wallet_id, "Completing sealed-bid auction");

		let outcome = match self.intents.complete_sealed_bid(&self.wallet, intent_id).await {
			Ok(outcome) => outcome,
			Err(e) => {
				self.events.publish(VeloxEvent::Auction(AuctionEvent::CompletionFailed {
					intent_id,
					error: e.user_message(),
				}));
				return Err(match e {
					IntentError::Delivery(DeliveryError::ExecutionFailed { vm_status, .. }) => {
						CoreError::CompletionFailed {
							intent_id,
							vm_status,
						}
					}
					other => other.into(),
				});
			}
		};

		self.events.publish(VeloxEvent::Auction(AuctionEvent::Completed {
			intent_id,
			tx_hash: outcome.tx_hash,
		}));
		self.notify_taker(intent_id, outcome.tx_hash);

		Ok(Completion {
			intent_id,
			tx_hash: outcome.tx_hash,
		})
	}

	/// Posts the completion to the app's taker endpoint without waiting
	/// for the result.
	fn notify_taker(&self, intent_id: u64, tx_hash: TransactionHash) {
		let (Some(app_url), Some(taker)) = (self.app_url.as_ref(), self.wallet_address()) else {
			return;
		};
		let url = format!("{}/api/transactions/taker", app_url);
		let request = self
			.http
			.post(&url)
			.timeout(WEBHOOK_TIMEOUT)
			.json(&TakerNotification {
				intent_id,
				tx_hash,
				taker,
			});

		tokio::spawn(async move {
			match request.send().await {
				Ok(response) if response.status().is_success() => {
					info!(intent_id, "Taker webhook notified");
				}
				Ok(response) => {
					warn!(intent_id, status = %response.status(), "Taker webhook rejected notification");
				}
				Err(e) => warn!(intent_id, "Taker webhook unreachable: {}", e),
			}
		});
	}
}

/// Creates the relayer from the `[relayer]` section.
pub fn create_relayer(
	config: &RelayerConfig,
	intents: Arc<IntentService>,
	events: EventBus,
) -> Result<AuctionRelayer, CoreError> {
	let key = Arc::new(LocalKey::from_hex(&config.private_key)?);
	let wallet = WalletContext::select(None, Some(NativeSigner::new(key)));
	Ok(AuctionRelayer::new(
		intents,
		wallet,
		config.wallet_id.clone(),
		config.app_url.clone(),
		events,
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use velox_chain::implementations::rest::RestClient;
	use velox_chain::{ChainService, ChainSettings};
	use velox_delivery::DeliveryService;
	use velox_storage::implementations::memory::MemoryStorage;
	use velox_storage::StorageService;
	use wiremock::matchers::{body_partial_json, method, path, path_regex};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const RELAYER_KEY: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

	async fn mock_auction_state(server: &MockServer, state: serde_json::Value) {
		Mock::given(method("POST"))
			.and(path("/v1/view"))
			.and(body_partial_json(json!({
				"function": "0x000000000000000000000000000000000000000000000000000000000000beef::auction::get_auction_state",
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([state])))
			.mount(server)
			.await;
	}

	fn sealed_bid_ending_at(end_time: u64) -> serde_json::Value {
		json!({
			"__variant__": "SealedBidActive",
			"end_time": end_time.to_string(),
			"bid_count": "3",
		})
	}

	async fn mock_fullnode(success: bool) -> MockServer {
		let server = MockServer::start().await;
		let hash = TransactionHash([0xab; 32]);
		let vm_status = if success {
			"Executed successfully"
		} else {
			"Move abort in 0xbeef::auction: E_AUCTION_NOT_ENDED(0x30003): "
		};

		Mock::given(method("GET"))
			.and(path_regex(r"^/v1/accounts/0x[0-9a-f]{64}$"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"sequence_number": "0",
				"authentication_key": "0x00",
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/v1/estimate_gas_price"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "gas_estimate": 100 })))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/v1/transactions"))
			.respond_with(ResponseTemplate::new(202).set_body_json(json!({
				"hash": hash.to_string(),
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path(format!("/v1/transactions/by_hash/{}", hash)))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"type": "user_transaction",
				"hash": hash.to_string(),
				"version": "10",
				"success": success,
				"vm_status": vm_status,
				"gas_used": "5",
			})))
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path("/api/transactions/taker"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		server
	}

	fn relayer(server: &MockServer, events: EventBus) -> AuctionRelayer {
		let client = RestClient::new(&format!("{}/v1", server.uri()), Duration::from_secs(5)).unwrap();
		let chain = Arc::new(ChainService::new(
			Arc::new(client),
			ChainSettings {
				chain_id: 250,
				max_gas_amount: 200_000,
				expiration_secs: 60,
				wait_timeout: Duration::from_secs(2),
				poll_interval: Duration::from_millis(20),
			},
		));
		let intents = Arc::new(IntentService::new(
			Arc::new(DeliveryService::new(chain, None)),
			"0xbeef".parse().unwrap(),
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
		));
		create_relayer(
			&RelayerConfig {
				wallet_id: "relayer-1".to_string(),
				private_key: RELAYER_KEY.to_string(),
				app_url: Some(format!("{}/", server.uri())),
			},
			intents,
			events,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_complete_publishes_and_notifies() {
		let server = mock_fullnode(true).await;
		mock_auction_state(&server, sealed_bid_ending_at(1_700_000_000)).await;
		let events = EventBus::new(8);
		let mut rx = events.subscribe();
		let relayer = relayer(&server, events);

		let completion = relayer.complete(12).await.unwrap();
		assert_eq!(completion.intent_id, 12);
		assert_eq!(completion.tx_hash, TransactionHash([0xab; 32]));
		assert!(matches!(
			rx.recv().await.unwrap(),
			VeloxEvent::Auction(AuctionEvent::Completed { intent_id: 12, .. })
		));

		// The webhook runs in the background.
		let mut notified = false;
		for _ in 0..50 {
			let requests = server.received_requests().await.unwrap();
			if let Some(request) = requests
				.iter()
				.find(|r| r.url.path() == "/api/transactions/taker")
			{
				let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
				assert_eq!(body["intentId"], 12);
				assert_eq!(body["txHash"], TransactionHash([0xab; 32]).to_string());
				notified = true;
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		assert!(notified);
	}

	#[tokio::test]
	async fn test_execution_failure_carries_vm_status() {
		let server = mock_fullnode(false).await;
		mock_auction_state(&server, sealed_bid_ending_at(1_700_000_000)).await;
		let relayer = relayer(&server, EventBus::default());

		let err = relayer.complete(12).await.unwrap_err();
		assert!(matches!(
			err,
			CoreError::CompletionFailed { intent_id: 12, ref vm_status } if vm_status.contains("E_AUCTION_NOT_ENDED")
		));
	}

	#[tokio::test]
	async fn test_open_auction_is_not_submitted() {
		let server = mock_fullnode(true).await;
		mock_auction_state(&server, sealed_bid_ending_at(now_secs() + 600)).await;
		let relayer = relayer(&server, EventBus::default());

		let err = relayer.complete(12).await.unwrap_err();
		assert!(matches!(
			err,
			CoreError::AuctionNotEnded { intent_id: 12, remaining_secs } if remaining_secs > 500
		));
		let submitted = server
			.received_requests()
			.await
			.unwrap()
			.into_iter()
			.filter(|r| r.url.path() == "/v1/transactions")
			.count();
		assert_eq!(submitted, 0);
	}

	#[tokio::test]
	async fn test_dutch_auction_is_not_completable() {
		let server = mock_fullnode(true).await;
		mock_auction_state(
			&server,
			json!({
				"__variant__": "DutchActive",
				"start_time": "1700000000",
				"start_price": "1000",
				"end_price": "500",
				"duration": "60",
			}),
		)
		.await;
		let relayer = relayer(&server, EventBus::default());

		assert!(matches!(
			relayer.complete(7).await.unwrap_err(),
			CoreError::NoSealedBidAuction { intent_id: 7 }
		));
	}
}
