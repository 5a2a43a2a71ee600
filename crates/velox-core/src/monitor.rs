//! Polling monitors.
//!
//! Both monitors tick on a `tokio::time::interval` and await each tick
//! before waiting for the next one, so a slow fullnode delays ticks instead
//! of stacking requests. They stop when the shutdown channel fires or is
//! closed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use velox_intents::IntentService;
use velox_types::{Address, EventBus, IntentEvent, IntentStatus, ScheduledProgress, VeloxEvent};

use crate::CoreError;

/// Local stores are pruned every this many intent ticks.
const CLEANUP_EVERY_TICKS: u64 = 120;

/// A polling task driven by [`run_monitor`].
#[async_trait]
pub trait Monitor: Send {
	fn name(&self) -> &'static str;

	fn period(&self) -> Duration;

	/// Polls once and publishes the resulting events.
	async fn poll(&mut self) -> Result<(), CoreError>;
}

/// Runs `monitor` until the shutdown channel fires or is closed.
pub async fn run_monitor<M: Monitor>(mut monitor: M, mut shutdown: broadcast::Receiver<()>) {
	let name = monitor.name();
	let mut interval = tokio::time::interval(monitor.period());
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
	info!("{} monitor started ({:?} interval)", name, monitor.period());

	loop {
		tokio::select! {
			_ = interval.tick() => {
				if let Err(e) = monitor.poll().await {
					warn!("{} monitor tick failed: {}", name, e);
				}
			}
			_ = shutdown.recv() => {
				info!("{} monitor received shutdown signal", name);
				break;
			}
		}
	}
}

/// Watches the intents of one user.
///
/// Publishes newly seen intents and status changes, and resolves the
/// user's pending submission to its intent id.
pub struct IntentMonitor {
	intents: Arc<IntentService>,
	events: EventBus,
	user: Address,
	period: Duration,
	statuses: HashMap<u64, IntentStatus>,
	ticks: u64,
}

impl IntentMonitor {
	pub fn new(
		intents: Arc<IntentService>,
		events: EventBus,
		user: Address,
		period: Duration,
	) -> Self {
		Self {
			intents,
			events,
			user,
			period,
			statuses: HashMap::new(),
			ticks: 0,
		}
	}

	/// Polls once and returns the events of this tick.
	pub async fn tick(&mut self) -> Result<Vec<IntentEvent>, CoreError> {
		self.ticks += 1;
		let mut intents = self.intents.get_user_intents(&self.user).await?;
		debug!(
			user = %self.user.to_short_string(),
			count = intents.len(),
			"Polled user intents"
		);

		let mut events = Vec::new();

		if let Some(max_id) = intents.iter().map(|intent| intent.id).max() {
			if let Some((intent_id, tx_hash)) =
				self.intents.resolve_with_max_id(&self.user, max_id).await?
			{
				if let Some(intent) = intents.iter_mut().find(|intent| intent.id == intent_id) {
					intent.tx_hash = Some(tx_hash);
				}
				events.push(IntentEvent::TxHashResolved { intent_id, tx_hash });
			}
		}

		for intent in intents {
			match self.statuses.insert(intent.id, intent.status) {
				None => events.push(IntentEvent::Discovered {
					intent: Box::new(intent),
				}),
				Some(previous) if previous != intent.status => {
					info!(
						intent_id = intent.id,
						from = %previous,
						to = %intent.status,
						"Intent status changed"
					);
					events.push(IntentEvent::StatusChanged {
						intent_id: intent.id,
						from: previous,
						to: intent.status,
					});
				}
				Some(_) => {}
			}
		}

		if self.ticks % CLEANUP_EVERY_TICKS == 0 {
			self.intents.cleanup().await?;
		}

		Ok(events)
	}
}

/// Watches the execution progress of the user's open TWAP and DCA intents.
pub struct ProgressMonitor {
	intents: Arc<IntentService>,
	events: EventBus,
	user: Address,
	period: Duration,
	progress: HashMap<u64, ScheduledProgress>,
}

impl ProgressMonitor {
	pub fn new(
		intents: Arc<IntentService>,
		events: EventBus,
		user: Address,
		period: Duration,
	) -> Self {
		Self {
			intents,
			events,
			user,
			period,
			progress: HashMap::new(),
		}
	}

	/// Polls once and returns progress that changed since the last tick.
	pub async fn tick(&mut self) -> Result<Vec<IntentEvent>, CoreError> {
		let scheduled: Vec<u64> = self
			.intents
			.get_user_intents(&self.user)
			.await?
			.into_iter()
			.filter(|intent| intent.intent_type.is_scheduled() && intent.status.is_open())
			.map(|intent| intent.id)
			.collect();
		debug!(count = scheduled.len(), "Polling scheduled intent progress");

		let mut events = Vec::new();
		for intent_id in scheduled {
			let progress = match self.intents.get_scheduled_progress(intent_id).await {
				Ok(progress) => progress,
				Err(e) => {
					warn!(intent_id, "Failed to read scheduled progress: {}", e);
					continue;
				}
			};
			if self.progress.get(&intent_id) != Some(&progress) {
				self.progress.insert(intent_id, progress.clone());
				events.push(IntentEvent::Progress { progress });
			}
		}
		Ok(events)
	}
}

#[async_trait]
impl Monitor for IntentMonitor {
	fn name(&self) -> &'static str {
		"Intent"
	}

	fn period(&self) -> Duration {
		self.period
	}

	async fn poll(&mut self) -> Result<(), CoreError> {
		for event in self.tick().await? {
			self.events.publish(VeloxEvent::Intent(event));
		}
		Ok(())
	}
}

#[async_trait]
impl Monitor for ProgressMonitor {
	fn name(&self) -> &'static str {
		"Progress"
	}

	fn period(&self) -> Duration {
		self.period
	}

	async fn poll(&mut self) -> Result<(), CoreError> {
		for event in self.tick().await? {
			self.events.publish(VeloxEvent::Intent(event));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::{json, Value};
	use velox_chain::implementations::rest::RestClient;
	use velox_chain::{ChainService, ChainSettings};
	use velox_delivery::DeliveryService;
	use velox_storage::implementations::memory::MemoryStorage;
	use velox_storage::StorageService;
	use velox_types::TransactionHash;
	use wiremock::matchers::{body_partial_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const VELOX: &str = "0x000000000000000000000000000000000000000000000000000000000000beef";

	fn user() -> Address {
		Address::from_u8(0x42)
	}

	fn dca_intent(id: u64, status: &str) -> Value {
		json!({
			"id": id.to_string(),
			"user": user().to_hex_literal(),
			"intent_type": {
				"__variant__": "DCA",
				"input_token": { "inner": "0xa" },
				"output_token": { "inner": "0xb" },
				"amount_per_period": "100",
				"total_periods": "4",
				"interval_seconds": "3600",
				"start_time": "9999990000",
			},
			"status": status,
			"created_at": "1700000000",
			"filled_amount": "0",
			"solver": { "vec": [] },
			"execution_price": { "vec": [] },
		})
	}

	fn intents(server: &MockServer) -> Arc<IntentService> {
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
		Arc::new(IntentService::new(
			Arc::new(DeliveryService::new(chain, None)),
			VELOX.parse().unwrap(),
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
		))
	}

	async fn mock_user_intents(server: &MockServer, body: Value, times: Option<u64>) {
		let mock = Mock::given(method("POST"))
			.and(path("/v1/view"))
			.and(body_partial_json(json!({
				"function": format!("{}::submission::get_user_intents", VELOX),
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(body));
		match times {
			Some(n) => mock.up_to_n_times(n).mount(server).await,
			None => mock.mount(server).await,
		}
	}

	#[tokio::test]
	async fn test_intent_monitor_reports_discoveries_and_changes() {
		let server = MockServer::start().await;
		mock_user_intents(&server, json!([[dca_intent(1, "pending")]]), Some(1)).await;
		mock_user_intents(&server, json!([[dca_intent(1, "partially_filled")]]), None).await;

		let service = intents(&server);
		let hash = TransactionHash([7; 32]);
		service
			.intent_tx()
			.record_pending(user(), hash, None, None)
			.await
			.unwrap();

		let mut monitor = IntentMonitor::new(service, EventBus::default(), user(), Duration::from_secs(5));

		let first = monitor.tick().await.unwrap();
		assert!(matches!(
			first[0],
			IntentEvent::TxHashResolved { intent_id: 1, tx_hash } if tx_hash == hash
		));
		assert!(matches!(
			first[1],
			IntentEvent::Discovered { ref intent } if intent.id == 1 && intent.tx_hash == Some(hash)
		));

		let second = monitor.tick().await.unwrap();
		assert_eq!(second.len(), 1);
		assert!(matches!(
			second[0],
			IntentEvent::StatusChanged {
				intent_id: 1,
				from: IntentStatus::Pending,
				to: IntentStatus::PartiallyFilled,
			}
		));

		assert!(monitor.tick().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_progress_monitor_reports_changes_only() {
		let server = MockServer::start().await;
		mock_user_intents(&server, json!([[dca_intent(3, "pending")]]), None).await;
		Mock::given(method("POST"))
			.and(path("/v1/view"))
			.and(body_partial_json(json!({ "arguments": ["3"] })))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!(["1", "4", "9999993600", "100"])))
			.mount(&server)
			.await;

		let mut monitor =
			ProgressMonitor::new(intents(&server), EventBus::default(), user(), Duration::from_secs(10));

		let events = monitor.tick().await.unwrap();
		assert_eq!(events.len(), 1);
		assert!(matches!(
			&events[0],
			IntentEvent::Progress { progress } if progress.executed_periods == 1 && progress.intent_id == 3
		));
		assert!(monitor.tick().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_monitor_stops_on_shutdown() {
		let server = MockServer::start().await;
		mock_user_intents(&server, json!([[]]), None).await;

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		let monitor = IntentMonitor::new(intents(&server), EventBus::default(), user(), Duration::from_millis(10));
		let handle = tokio::spawn(run_monitor(monitor, shutdown_rx));

		tokio::time::sleep(Duration::from_millis(50)).await;
		shutdown_tx.send(()).unwrap();
		tokio::time::timeout(Duration::from_secs(2), handle)
			.await
			.unwrap()
			.unwrap();
	}
}
