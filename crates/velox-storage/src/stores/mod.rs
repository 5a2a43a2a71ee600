//! Typed stores for client-side metadata, one namespace each.

pub mod auction;
pub mod intent_tx;
pub mod solver_metadata;

pub use auction::{AuctionParams, AuctionStore};
pub use intent_tx::{IntentTxStore, PendingSubmission};
pub use solver_metadata::{SolverMetadata, SolverMetadataStore};
