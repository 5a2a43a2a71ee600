//! Transaction delivery for the Velox client.
//!
//! Every submission first tries the sponsored path, where a gas station
//! co-signs as fee payer. If anything goes wrong before the sponsored
//! transaction reaches the chain, delivery switches once to the self-paid
//! path and the sender pays for gas. Nothing is retried after a transaction
//! was accepted by the fullnode, so an intent is never submitted twice.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use velox_account::{AccountError, WalletContext};
use velox_chain::{ChainError, ChainService};
use velox_config::SponsorshipConfig;
use velox_types::{
	AccountAuthenticator, EventBus, SignedTransaction, SimpleTransaction, SponsorshipResult,
	SubmissionEvent, SubmissionPath, TransactionError, TransactionHash, TransactionPayload,
	TransactionReceipt, VeloxEvent,
};

pub mod implementations {
	pub mod gas_station;
}

pub use implementations::gas_station::GasStationClient;

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error(transparent)]
	Account(#[from] AccountError),
	#[error(transparent)]
	Chain(#[from] ChainError),
	#[error(transparent)]
	Transaction(#[from] TransactionError),
	/// The sponsored path failed before anything reached the chain.
	#[error("Sponsorship failed: {0}")]
	Sponsorship(String),
	#[error("Transaction {hash} failed on-chain: {vm_status}")]
	ExecutionFailed {
		hash: TransactionHash,
		vm_status: String,
	},
	#[error("Failed to create HTTP client: {0}")]
	Client(String),
}

/// A gas station.
#[async_trait]
pub trait SponsorInterface: Send + Sync {
	/// Requests a fee payer signature. Failures are reported in the result,
	/// never as an error.
	async fn sponsor_transaction(&self, txn: &SimpleTransaction) -> SponsorshipResult;
}

/// A committed, successful submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
	pub tx_hash: TransactionHash,
	pub path: SubmissionPath,
	pub receipt: TransactionReceipt,
}

pub struct DeliveryService {
	chain: Arc<ChainService>,
	sponsor: Option<Arc<dyn SponsorInterface>>,
	events: Option<EventBus>,
}

impl DeliveryService {
	/// Without a sponsor every submission is self-paid.
	pub fn new(chain: Arc<ChainService>, sponsor: Option<Arc<dyn SponsorInterface>>) -> Self {
		Self {
			chain,
			sponsor,
			events: None,
		}
	}

	pub fn with_events(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn chain(&self) -> &Arc<ChainService> {
		&self.chain
	}

	fn publish(&self, event: SubmissionEvent) {
		if let Some(events) = &self.events {
			events.publish(VeloxEvent::Submission(event));
		}
	}

	/// Submits `payload` from the session's wallet.
	///
	/// Starts in [`SubmissionPath::Sponsored`] when a sponsor is configured
	/// and moves to [`SubmissionPath::SelfPaid`] on a sponsorship error.
	pub async fn submit(
		&self,
		ctx: &WalletContext,
		payload: TransactionPayload,
	) -> Result<SubmissionOutcome, DeliveryError> {
		let sender = ctx.require_address()?;
		let mut path = if self.sponsor.is_some() {
			SubmissionPath::Sponsored
		} else {
			SubmissionPath::SelfPaid
		};

		loop {
			let result = match path {
				SubmissionPath::Sponsored => self.sponsored_submit(ctx, payload.clone()).await,
				SubmissionPath::SelfPaid => self.self_paid_submit(ctx, payload.clone()).await,
			};

			match (path, result) {
				(SubmissionPath::Sponsored, Err(DeliveryError::Sponsorship(reason))) => {
					warn!(
						sender = %sender.to_short_string(),
						"Sponsored submission failed, falling back to self-paid gas: {}",
						reason
					);
					self.publish(SubmissionEvent::FellBack { sender, reason });
					path = SubmissionPath::SelfPaid;
				}
				(_, Ok(outcome)) => {
					info!(
						sender = %sender.to_short_string(),
						tx_hash = %outcome.tx_hash,
						path = %outcome.path,
						"Transaction confirmed"
					);
					self.publish(SubmissionEvent::Confirmed {
						sender,
						tx_hash: outcome.tx_hash,
						path: outcome.path,
					});
					return Ok(outcome);
				}
				(_, Err(e)) => {
					self.publish(SubmissionEvent::Failed {
						sender,
						error: e.to_string(),
					});
					return Err(e);
				}
			}
		}
	}

	/// Builds, sponsors, dual-signs, submits and awaits a transaction.
	///
	/// Failures before submission are reported as
	/// [`DeliveryError::Sponsorship`]; a missing wallet is reported as is.
	pub async fn sponsored_submit(
		&self,
		ctx: &WalletContext,
		payload: TransactionPayload,
	) -> Result<SubmissionOutcome, DeliveryError> {
		let sponsor = self
			.sponsor
			.as_ref()
			.ok_or_else(|| DeliveryError::Sponsorship("No gas station configured".to_string()))?;
		let sender = ctx.require_address()?;

		let mut txn = self
			.chain
			.build_transaction(sender, payload, true)
			.await
			.map_err(|e| DeliveryError::Sponsorship(format!("Failed to build transaction: {}", e)))?;

		let result = sponsor.sponsor_transaction(&txn).await;
		let fee_payer = match (result.success, result.fee_payer) {
			(true, Some(fee_payer)) => fee_payer,
			(_, _) => {
				return Err(DeliveryError::Sponsorship(
					result
						.error
						.unwrap_or_else(|| "Gas station returned no fee payer".to_string()),
				))
			}
		};
		txn.fee_payer_address = Some(fee_payer.address);

		let sender_auth = ctx.sign(&txn).await.map_err(|e| match e {
			AccountError::NotConnected => DeliveryError::Account(e),
			other => DeliveryError::Sponsorship(format!("Failed to sign: {}", other)),
		})?;
		let fee_payer_auth: AccountAuthenticator = bcs::from_bytes(&fee_payer.signature)
			.map_err(|e| {
				DeliveryError::Sponsorship(format!("Invalid fee payer authenticator: {}", e))
			})?;

		let signed = SignedTransaction::with_fee_payer(
			txn.raw_txn,
			sender_auth,
			fee_payer.address,
			fee_payer_auth,
		);
		let hash = self
			.chain
			.submit(&signed)
			.await
			.map_err(|e| DeliveryError::Sponsorship(format!("Submission rejected: {}", e)))?;

		self.confirm(hash, SubmissionPath::Sponsored).await
	}

	/// Builds, signs, submits and awaits a transaction whose gas the sender
	/// pays.
	pub async fn self_paid_submit(
		&self,
		ctx: &WalletContext,
		payload: TransactionPayload,
	) -> Result<SubmissionOutcome, DeliveryError> {
		let sender = ctx.require_address()?;
		let txn = self.chain.build_transaction(sender, payload, false).await?;
		let sender_auth = ctx.sign(&txn).await?;

		let signed = SignedTransaction::single_signer(txn.raw_txn, sender_auth);
		let hash = self.chain.submit(&signed).await?;

		self.confirm(hash, SubmissionPath::SelfPaid).await
	}

	async fn confirm(
		&self,
		hash: TransactionHash,
		path: SubmissionPath,
	) -> Result<SubmissionOutcome, DeliveryError> {
		let receipt = self.chain.wait_for_transaction(&hash).await?;
		if !receipt.success {
			return Err(DeliveryError::ExecutionFailed {
				hash,
				vm_status: receipt.vm_status,
			});
		}
		Ok(SubmissionOutcome {
			tx_hash: hash,
			path,
			receipt,
		})
	}
}

/// Creates the gas station client when sponsorship is active.
pub fn create_sponsor(
	config: &SponsorshipConfig,
) -> Result<Option<Arc<dyn SponsorInterface>>, DeliveryError> {
	if !config.is_active() {
		info!("Gas sponsorship disabled, transactions are self-paid");
		return Ok(None);
	}
	let api_key = config.api_key.clone().unwrap_or_default();
	let client = GasStationClient::new(
		config.endpoint.clone(),
		api_key,
		Duration::from_secs(config.request_timeout_secs),
	)?;
	Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use velox_account::{EmbeddedSigner, LocalKey, NativeSigner, RawHashSigner};
	use velox_chain::implementations::rest::RestClient;
	use velox_chain::ChainSettings;
	use velox_types::{Address, EntryFunction, FeePayerSignature};
	use wiremock::matchers::{method, path, path_regex};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const USER_KEY: &str = "0x9bf49a6a0755f953811fce125f2683d50429c3bb49e074147e0089a52eae155f";
	const SPONSOR_KEY: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

	/// Sponsor that signs with a local key, or always fails.
	struct StubSponsor {
		key: Option<LocalKey>,
	}

	#[async_trait]
	impl SponsorInterface for StubSponsor {
		async fn sponsor_transaction(&self, txn: &SimpleTransaction) -> SponsorshipResult {
			let Some(key) = &self.key else {
				return SponsorshipResult::failed("Fund exhausted");
			};
			let address = key.address();
			let mut txn = txn.clone();
			txn.fee_payer_address = Some(address);
			let message = txn.signing_message().unwrap();
			let auth = AccountAuthenticator::ed25519(
				key.public_key(),
				key.sign_raw(&message).await.unwrap(),
			);
			SponsorshipResult::sponsored(FeePayerSignature {
				address,
				signature: bcs::to_bytes(&auth).unwrap(),
			})
		}
	}

	/// Gas station that answers with bytes that are no authenticator.
	struct GarbledSponsor;

	#[async_trait]
	impl SponsorInterface for GarbledSponsor {
		async fn sponsor_transaction(&self, _txn: &SimpleTransaction) -> SponsorshipResult {
			SponsorshipResult::sponsored(FeePayerSignature {
				address: Address::from_u8(0x5),
				signature: vec![0xff, 0x01, 0x02],
			})
		}
	}

	async fn mock_fullnode(success: bool) -> MockServer {
		let account = ResponseTemplate::new(200).set_body_json(json!({
			"sequence_number": "0",
			"authentication_key": "0x00",
		}));
		mock_fullnode_with_account(success, account).await
	}

	async fn mock_fullnode_with_account(success: bool, account: ResponseTemplate) -> MockServer {
		let server = MockServer::start().await;
		let hash = TransactionHash([0xcd; 32]);
		let vm_status = if success {
			"Executed successfully"
		} else {
			"Move abort in 0x1::coin: EINSUFFICIENT_BALANCE(0x10006)"
		};

		Mock::given(method("GET"))
			.and(path_regex(r"^/v1/accounts/0x[0-9a-f]{64}$"))
			.respond_with(account)
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

		server
	}

	fn chain(server: &MockServer) -> Arc<ChainService> {
		let client = RestClient::new(&format!("{}/v1", server.uri()), Duration::from_secs(5)).unwrap();
		Arc::new(ChainService::new(
			Arc::new(client),
			ChainSettings {
				chain_id: 250,
				max_gas_amount: 200_000,
				expiration_secs: 60,
				wait_timeout: Duration::from_secs(2),
				poll_interval: Duration::from_millis(20),
			},
		))
	}

	fn embedded_ctx() -> WalletContext {
		let key = Arc::new(LocalKey::from_hex(USER_KEY).unwrap());
		WalletContext::select(Some(EmbeddedSigner::new(key)), None)
	}

	fn payload() -> TransactionPayload {
		TransactionPayload::EntryFunction(EntryFunction::new(
			Address::from_u8(1),
			"aptos_account",
			"transfer",
			vec![],
			vec![],
		))
	}

	#[tokio::test]
	async fn test_sponsored_path() {
		let server = mock_fullnode(true).await;
		let delivery = DeliveryService::new(
			chain(&server),
			Some(Arc::new(StubSponsor {
				key: Some(LocalKey::from_hex(SPONSOR_KEY).unwrap()),
			})),
		);

		let outcome = delivery.submit(&embedded_ctx(), payload()).await.unwrap();
		assert_eq!(outcome.path, SubmissionPath::Sponsored);
		assert_eq!(outcome.tx_hash.to_string().len(), 66);
	}

	#[tokio::test]
	async fn test_failed_sponsorship_falls_back_to_self_paid() {
		let server = mock_fullnode(true).await;
		let events = EventBus::new(16);
		let mut rx = events.subscribe();
		let delivery =
			DeliveryService::new(chain(&server), Some(Arc::new(StubSponsor { key: None })))
				.with_events(events);

		let key = Arc::new(LocalKey::from_hex(USER_KEY).unwrap());
		let native = WalletContext::select(None, Some(NativeSigner::new(key)));
		let outcome = delivery.submit(&native, payload()).await.unwrap();

		assert_eq!(outcome.path, SubmissionPath::SelfPaid);
		assert_eq!(outcome.tx_hash.to_string().len(), 66);
		assert!(matches!(
			rx.recv().await.unwrap(),
			VeloxEvent::Submission(SubmissionEvent::FellBack { reason, .. }) if reason == "Fund exhausted"
		));
	}

	#[tokio::test]
	async fn test_new_account_is_sponsored() {
		let not_found = ResponseTemplate::new(404).set_body_json(json!({
			"message": "Account not found by Address",
			"error_code": "account_not_found",
		}));
		let server = mock_fullnode_with_account(true, not_found).await;
		let delivery = DeliveryService::new(
			chain(&server),
			Some(Arc::new(StubSponsor {
				key: Some(LocalKey::from_hex(SPONSOR_KEY).unwrap()),
			})),
		);

		let outcome = delivery.submit(&embedded_ctx(), payload()).await.unwrap();
		assert_eq!(outcome.path, SubmissionPath::Sponsored);

		let submitted: Vec<SignedTransaction> = server
			.received_requests()
			.await
			.unwrap()
			.into_iter()
			.filter(|r| r.method.as_str() == "POST" && r.url.path() == "/v1/transactions")
			.map(|r| bcs::from_bytes(&r.body).unwrap())
			.collect();
		assert_eq!(submitted.len(), 1);
		assert_eq!(submitted[0].raw_txn.sequence_number, 0);
	}

	#[tokio::test]
	async fn test_garbled_fee_payer_authenticator_falls_back() {
		let server = mock_fullnode(true).await;
		let events = EventBus::new(16);
		let mut rx = events.subscribe();
		let delivery = DeliveryService::new(chain(&server), Some(Arc::new(GarbledSponsor)))
			.with_events(events);

		let outcome = delivery.submit(&embedded_ctx(), payload()).await.unwrap();
		assert_eq!(outcome.path, SubmissionPath::SelfPaid);
		assert!(matches!(
			rx.recv().await.unwrap(),
			VeloxEvent::Submission(SubmissionEvent::FellBack { reason, .. })
				if reason.starts_with("Invalid fee payer authenticator")
		));
	}

	#[tokio::test]
	async fn test_execution_failure_is_not_retried() {
		let server = mock_fullnode(false).await;
		let delivery = DeliveryService::new(
			chain(&server),
			Some(Arc::new(StubSponsor {
				key: Some(LocalKey::from_hex(SPONSOR_KEY).unwrap()),
			})),
		);

		let err = delivery.submit(&embedded_ctx(), payload()).await.unwrap_err();
		assert!(matches!(
			err,
			DeliveryError::ExecutionFailed { ref vm_status, .. } if vm_status.contains("EINSUFFICIENT_BALANCE")
		));

		let submissions = server
			.received_requests()
			.await
			.unwrap()
			.into_iter()
			.filter(|r| r.method.as_str() == "POST" && r.url.path() == "/v1/transactions")
			.count();
		assert_eq!(submissions, 1);
	}

	#[tokio::test]
	async fn test_disconnected_wallet_is_rejected() {
		let server = mock_fullnode(true).await;
		let delivery = DeliveryService::new(chain(&server), None);
		let err = delivery
			.submit(&WalletContext::disconnected(), payload())
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Account(AccountError::NotConnected)));
	}

	#[test]
	fn test_sponsor_requires_key() {
		let mut config = SponsorshipConfig::default();
		assert!(create_sponsor(&config).unwrap().is_none());
		config.api_key = Some("key".to_string());
		assert!(create_sponsor(&config).unwrap().is_some());
	}
}
