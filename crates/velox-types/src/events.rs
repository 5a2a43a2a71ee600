use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
	Address, IntentRecord, IntentStatus, ScheduledProgress, SubmissionPath, TransactionHash,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VeloxEvent {
	Submission(SubmissionEvent),
	Intent(IntentEvent),
	Auction(AuctionEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SubmissionEvent {
	/// Sponsorship failed and the submission continued with user-paid gas.
	FellBack { sender: Address, reason: String },
	Confirmed {
		sender: Address,
		tx_hash: TransactionHash,
		path: SubmissionPath,
	},
	Failed { sender: Address, error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntentEvent {
	Discovered { intent: Box<IntentRecord> },
	StatusChanged {
		intent_id: u64,
		from: IntentStatus,
		to: IntentStatus,
	},
	TxHashResolved {
		intent_id: u64,
		tx_hash: TransactionHash,
	},
	Progress { progress: ScheduledProgress },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuctionEvent {
	Completed {
		intent_id: u64,
		tx_hash: TransactionHash,
	},
	CompletionFailed { intent_id: u64, error: String },
}

/// Fan-out channel for client events.
pub struct EventBus {
	sender: broadcast::Sender<VeloxEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<VeloxEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Having no subscribers is not an error.
	pub fn publish(&self, event: VeloxEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}
