//! Assembly of the Velox client.
//!
//! [`VeloxClient`] wires storage, chain access, the wallet, delivery and the
//! intent service together from a [`VeloxConfig`], and owns the background
//! monitors.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::info;
use velox_account::{create_account, WalletContext};
use velox_chain::{create_chain, ChainService};
use velox_config::VeloxConfig;
use velox_delivery::{create_sponsor, DeliveryService};
use velox_intents::IntentService;
use velox_storage::{create_storage, StorageService};
use velox_types::{Address, EventBus};

pub mod error;
pub mod monitor;
pub mod relayer;

pub use error::CoreError;
pub use monitor::{run_monitor, IntentMonitor, Monitor, ProgressMonitor};
pub use relayer::{create_relayer, AuctionRelayer, Completion};

const EVENT_CAPACITY: usize = 1024;

pub struct VeloxClient {
	config: VeloxConfig,
	chain: Arc<ChainService>,
	intents: Arc<IntentService>,
	wallet: WalletContext,
	events: EventBus,
	shutdown_tx: broadcast::Sender<()>,
	tasks: Mutex<JoinSet<()>>,
}

impl VeloxClient {
	pub fn from_config(config: VeloxConfig) -> Result<Self, CoreError> {
		let storage = Arc::new(StorageService::new(create_storage(&config.storage)?));
		let chain = Arc::new(create_chain(&config.network)?);
		let wallet = create_account(&config.wallet)?;
		let events = EventBus::new(EVENT_CAPACITY);

		let delivery = Arc::new(
			DeliveryService::new(chain.clone(), create_sponsor(&config.sponsorship)?)
				.with_events(events.clone()),
		);
		let intents = Arc::new(IntentService::new(
			delivery,
			config.velox.address,
			storage,
		));

		info!(
			network = %config.network.network,
			fullnode = %config.network.fullnode_url(),
			velox = %config.velox.address,
			"Velox client initialized"
		);

		let (shutdown_tx, _) = broadcast::channel(1);
		Ok(Self {
			config,
			chain,
			intents,
			wallet,
			events,
			shutdown_tx,
			tasks: Mutex::new(JoinSet::new()),
		})
	}

	pub fn config(&self) -> &VeloxConfig {
		&self.config
	}

	pub fn chain(&self) -> &Arc<ChainService> {
		&self.chain
	}

	pub fn intents(&self) -> &Arc<IntentService> {
		&self.intents
	}

	pub fn wallet(&self) -> &WalletContext {
		&self.wallet
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	/// Builds the auction relayer from the `[relayer]` section.
	pub fn relayer(&self) -> Result<AuctionRelayer, CoreError> {
		let config = self
			.config
			.relayer
			.as_ref()
			.ok_or(CoreError::RelayerNotConfigured)?;
		create_relayer(config, self.intents.clone(), self.events.clone())
	}

	/// Starts the intent and progress monitors for `user`.
	pub async fn start_monitors(&self, user: Address) {
		let monitor = &self.config.monitor;
		let intent_monitor = IntentMonitor::new(
			self.intents.clone(),
			self.events.clone(),
			user,
			Duration::from_secs(monitor.intents_interval_secs),
		);
		let progress_monitor = ProgressMonitor::new(
			self.intents.clone(),
			self.events.clone(),
			user,
			Duration::from_secs(monitor.progress_interval_secs),
		);

		let mut tasks = self.tasks.lock().await;
		tasks.spawn(run_monitor(intent_monitor, self.shutdown_tx.subscribe()));
		tasks.spawn(run_monitor(progress_monitor, self.shutdown_tx.subscribe()));
		info!(user = %user.to_short_string(), "Monitors started");
	}

	/// Stops the monitors and waits for them to finish.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		info!("Shutting down Velox client");
		let _ = self.shutdown_tx.send(());

		let mut tasks = self.tasks.lock().await;
		while let Some(result) = tasks.join_next().await {
			result.map_err(|e| CoreError::Shutdown(e.to_string()))?;
		}

		info!("Velox client shutdown complete");
		Ok(())
	}
}
