use thiserror::Error;
use velox_account::AccountError;
use velox_chain::ChainError;
use velox_config::ConfigError;
use velox_delivery::DeliveryError;
use velox_intents::IntentError;
use velox_storage::StorageError;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(#[from] ConfigError),

	#[error("Service initialization error: {0}")]
	ServiceInit(String),

	#[error(transparent)]
	Intent(#[from] IntentError),

	#[error(transparent)]
	Chain(#[from] ChainError),

	#[error(transparent)]
	Delivery(#[from] DeliveryError),

	#[error(transparent)]
	Account(#[from] AccountError),

	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error("Auction {intent_id} is still open for {remaining_secs}s")]
	AuctionNotEnded { intent_id: u64, remaining_secs: u64 },

	#[error("Intent {intent_id} has no active sealed-bid auction")]
	NoSealedBidAuction { intent_id: u64 },

	#[error("Auction {intent_id} could not be completed: {vm_status}")]
	CompletionFailed { intent_id: u64, vm_status: String },

	#[error("Relayer not configured")]
	RelayerNotConfigured,

	#[error("Shutdown error: {0}")]
	Shutdown(String),
}
