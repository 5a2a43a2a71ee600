//! Shared types for the Velox intent client.

pub mod address;
pub mod amount;
pub mod events;
pub mod intent;
pub mod sponsorship;
pub mod token;
pub mod transaction;
pub mod validation;

pub use address::*;
pub use amount::*;
pub use events::*;
pub use intent::*;
pub use sponsorship::*;
pub use token::*;
pub use transaction::*;
pub use validation::*;

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
	chrono::Utc::now().timestamp().max(0) as u64
}
