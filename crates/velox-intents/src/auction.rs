//! Auction helpers.

use velox_types::{AuctionState, StoredAuctionInfo};

/// Current price of a Dutch auction.
///
/// The price decays linearly from `start_price` at `start_time` to
/// `end_price` at `start_time + duration` and stays at the bounds outside
/// that window.
pub fn dutch_price_at(
	start_price: u64,
	end_price: u64,
	start_time: u64,
	duration: u64,
	now: u64,
) -> u64 {
	if now <= start_time {
		return start_price;
	}
	let elapsed = now - start_time;
	if duration == 0 || elapsed >= duration {
		return end_price;
	}
	if start_price <= end_price {
		return start_price;
	}

	let drop = (start_price - end_price) as u128 * elapsed as u128 / duration as u128;
	start_price - drop as u64
}

/// Seconds until an auction stops accepting bids or decaying, `0` once it
/// ended or when it is not active.
pub fn seconds_remaining(state: &AuctionState, now: u64) -> u64 {
	match state {
		AuctionState::SealedBidActive { end_time, .. } => end_time.saturating_sub(now),
		AuctionState::DutchActive {
			start_time,
			duration,
			..
		} => start_time.saturating_add(*duration).saturating_sub(now),
		AuctionState::None | AuctionState::Completed { .. } => 0,
	}
}

/// Whether a sealed-bid auction can be completed at `now`.
pub fn is_completable(state: &AuctionState, now: u64) -> bool {
	matches!(state, AuctionState::SealedBidActive { end_time, .. } if *end_time <= now)
}

/// Dutch price computed from locally remembered parameters.
///
/// Returns `None` when the stored info lacks a duration or prices.
pub fn stored_dutch_price(info: &StoredAuctionInfo, now: u64) -> Option<u64> {
	let start_price = info.start_price.as_deref()?.parse().ok()?;
	let end_price = info.end_price.as_deref()?.parse().ok()?;
	Some(dutch_price_at(
		start_price,
		end_price,
		info.start_time,
		info.duration?,
		now,
	))
}
