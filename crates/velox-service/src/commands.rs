//! Command handlers for the `velox` binary.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use velox_core::VeloxClient;
use velox_intents::auction::{dutch_price_at, seconds_remaining, stored_dutch_price};
use velox_intents::{
	DcaParams, DutchParams, IntentError, LimitOrderParams, SealedBidParams, SubmittedIntent,
	SwapParams, TwapParams,
};
use velox_storage::stores::SolverMetadata;
use velox_types::{
	find_token, from_smallest_unit, now_secs, to_smallest_unit, Address, AuctionState,
	IntentRecord, Token, VeloxEvent,
};

use crate::cli::{Command, Pair, SubmitCommand};

/// Decimals of the native MOVE coin used for solver stakes.
const MOVE_DECIMALS: u32 = 8;

pub async fn run(client: &VeloxClient, command: Command) -> Result<()> {
	match command {
		Command::Balances { address } => balances(client, address.as_deref()).await,
		Command::Intents { address } => intents(client, address.as_deref()).await,
		Command::Intent { id } => intent(client, id).await,
		Command::Submit(submit) => submit_intent(client, submit).await,
		Command::Cancel { id } => cancel(client, id).await,
		Command::RegisterSolver {
			stake,
			name,
			description,
			website,
			logo_url,
		} => {
			let metadata = name.map(|name| SolverMetadata {
				description,
				website,
				logo_url,
				..SolverMetadata::new(Address::ZERO, name)
			});
			register_solver(client, &stake, metadata).await
		}
		Command::Watch { address } => watch(client, address.as_deref()).await,
		Command::CompleteAuction { id } => complete_auction(client, id).await,
		Command::Serve | Command::Validate => bail!("Command is handled at startup"),
	}
}

/// Surfaces Velox aborts with their readable message.
fn user_error(e: IntentError) -> anyhow::Error {
	anyhow!(e.user_message())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// The given address, or the configured wallet's.
fn target_address(client: &VeloxClient, address: Option<&str>) -> Result<Address> {
	match address {
		Some(address) => address
			.parse()
			.map_err(|e| anyhow!("Invalid address {}: {}", address, e)),
		None => client
			.wallet()
			.wallet_address()
			.context("No address given and no wallet configured"),
	}
}

fn token<'a>(client: &'a VeloxClient, query: &str) -> Result<&'a Token> {
	find_token(&client.config().tokens, query).with_context(|| format!("Unknown token: {}", query))
}

fn units(amount: &str, token: &Token) -> Result<u64> {
	to_smallest_unit(amount, token.decimals as u32)
		.with_context(|| format!("Invalid {} amount: {}", token.symbol, amount))
}

async fn balances(client: &VeloxClient, address: Option<&str>) -> Result<()> {
	let owner = target_address(client, address)?;
	for balance in client.chain().balances(&owner, &client.config().tokens).await {
		let amount = from_smallest_unit(balance.amount, balance.token.decimals as u32)?;
		println!("{:>10} {}", balance.token.symbol, amount);
	}
	Ok(())
}

async fn intents(client: &VeloxClient, address: Option<&str>) -> Result<()> {
	let user = target_address(client, address)?;
	let intents = client
		.intents()
		.get_user_intents(&user)
		.await
		.map_err(user_error)?;
	info!(user = %user.to_short_string(), count = intents.len(), "Fetched intents");
	print_json(&intents)
}

async fn intent(client: &VeloxClient, id: u64) -> Result<()> {
	match client.intents().get_intent(id).await.map_err(user_error)? {
		Some(intent) => {
			let auction = client
				.intents()
				.get_auction_state(id)
				.await
				.map_err(user_error)?;
			print_json(&intent_summary(&intent, &auction, now_secs()))
		}
		None => bail!("Intent {} not found", id),
	}
}

/// The intent with its auction state and the figures derived from them.
fn intent_summary(intent: &IntentRecord, auction: &AuctionState, now: u64) -> serde_json::Value {
	let dutch_price = match auction {
		AuctionState::DutchActive {
			start_time,
			start_price,
			end_price,
			duration,
		} => Some(dutch_price_at(*start_price, *end_price, *start_time, *duration, now)),
		_ => intent
			.auction
			.as_ref()
			.and_then(|info| stored_dutch_price(info, now)),
	};
	json!({
		"intent": intent,
		"auction": auction,
		"fill_bps": intent.fill_bps(),
		"seconds_remaining": seconds_remaining(auction, now),
		"dutch_price": dutch_price,
	})
}

/// Absolute timestamp `secs` after `now`.
fn after(now: u64, secs: u64) -> Result<u64> {
	now.checked_add(secs)
		.with_context(|| format!("{} seconds from now is out of range", secs))
}

async fn submit_intent(client: &VeloxClient, command: SubmitCommand) -> Result<()> {
	let service = client.intents();
	let wallet = client.wallet();
	let now = now_secs();

	let submitted = match command {
		SubmitCommand::Swap {
			pair,
			amount,
			min_out,
			deadline_secs,
		} => {
			let (input, output) = resolve_pair(client, &pair)?;
			let params = SwapParams {
				input_token: input.address,
				output_token: output.address,
				amount_in: units(&amount, input)?,
				min_amount_out: units(&min_out, output)?,
				deadline: after(now, deadline_secs)?,
			};
			service.submit_swap(wallet, &params).await
		}
		SubmitCommand::Limit {
			pair,
			amount,
			limit_price,
			expiry_secs,
			partial_fill,
		} => {
			let (input, output) = resolve_pair(client, &pair)?;
			let params = LimitOrderParams {
				input_token: input.address,
				output_token: output.address,
				amount_in: units(&amount, input)?,
				limit_price: units(&limit_price, output)?,
				expiry: after(now, expiry_secs)?,
				partial_fill_allowed: partial_fill,
			};
			service.submit_limit_order(wallet, &params).await
		}
		SubmitCommand::Twap {
			pair,
			amount,
			chunks,
			interval_secs,
			max_slippage_bps,
			start_in_secs,
		} => {
			let (input, output) = resolve_pair(client, &pair)?;
			let params = TwapParams {
				input_token: input.address,
				output_token: output.address,
				total_amount: units(&amount, input)?,
				num_chunks: chunks,
				interval_seconds: interval_secs,
				max_slippage_bps,
				start_time: after(now, start_in_secs)?,
			};
			service.submit_twap(wallet, &params).await
		}
		SubmitCommand::Dca {
			pair,
			amount_per_period,
			periods,
			interval_secs,
			start_in_secs,
		} => {
			let (input, output) = resolve_pair(client, &pair)?;
			let params = DcaParams {
				input_token: input.address,
				output_token: output.address,
				amount_per_period: units(&amount_per_period, input)?,
				total_periods: periods,
				interval_seconds: interval_secs,
				start_time: after(now, start_in_secs)?,
			};
			service.submit_dca(wallet, &params).await
		}
		SubmitCommand::SealedBid {
			pair,
			amount,
			min_out,
			auction_secs,
			deadline_secs,
		} => {
			let (input, output) = resolve_pair(client, &pair)?;
			let params = SealedBidParams {
				input_token: input.address,
				output_token: output.address,
				amount_in: units(&amount, input)?,
				min_amount_out: units(&min_out, output)?,
				deadline: after(now, deadline_secs)?,
				auction_duration: auction_secs,
			};
			service.submit_sealed_bid(wallet, &params).await
		}
		SubmitCommand::Dutch {
			pair,
			amount,
			start_price,
			end_price,
			auction_secs,
			deadline_secs,
		} => {
			let (input, output) = resolve_pair(client, &pair)?;
			let params = DutchParams {
				input_token: input.address,
				output_token: output.address,
				amount_in: units(&amount, input)?,
				start_price: units(&start_price, output)?,
				end_price: units(&end_price, output)?,
				auction_duration: auction_secs,
				deadline: after(now, deadline_secs)?,
			};
			service.submit_dutch(wallet, &params).await
		}
	}
	.map_err(user_error)?;

	print_submission(&submitted);
	Ok(())
}

fn resolve_pair<'a>(client: &'a VeloxClient, pair: &Pair) -> Result<(&'a Token, &'a Token)> {
	let input = token(client, &pair.input)?;
	let output = token(client, &pair.output)?;
	if input.address == output.address {
		bail!("Input and output token must differ");
	}
	Ok((input, output))
}

fn print_submission(submitted: &SubmittedIntent) {
	println!("Transaction: {}", submitted.tx_hash);
	println!("Gas paid:    {}", submitted.path);
	match submitted.intent_id {
		Some(id) => println!("Intent:      {}", id),
		None => println!("Intent:      pending, run `velox watch` to resolve"),
	}
}

async fn cancel(client: &VeloxClient, id: u64) -> Result<()> {
	let outcome = client
		.intents()
		.cancel_intent(client.wallet(), id)
		.await
		.map_err(user_error)?;
	println!("Cancelled intent {} in {}", id, outcome.tx_hash);
	Ok(())
}

async fn register_solver(
	client: &VeloxClient,
	stake: &str,
	metadata: Option<SolverMetadata>,
) -> Result<()> {
	let stake_amount =
		to_smallest_unit(stake, MOVE_DECIMALS).with_context(|| format!("Invalid stake: {}", stake))?;
	let outcome = client
		.intents()
		.register_solver(client.wallet(), stake_amount, metadata)
		.await
		.map_err(user_error)?;
	println!("Registered solver in {}", outcome.tx_hash);
	Ok(())
}

async fn watch(client: &VeloxClient, address: Option<&str>) -> Result<()> {
	let user = target_address(client, address)?;
	let mut events = client.events().subscribe();
	client.start_monitors(user).await;

	let shutdown = crate::setup_shutdown_signal();
	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			_ = &mut shutdown => break,
			event = events.recv() => match event {
				Ok(VeloxEvent::Intent(event)) => print_json(&event)?,
				Ok(VeloxEvent::Auction(event)) => print_json(&event)?,
				Ok(VeloxEvent::Submission(_)) => {}
				Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event stream lagged"),
				Err(RecvError::Closed) => break,
			},
		}
	}

	client.shutdown().await?;
	Ok(())
}

async fn complete_auction(client: &VeloxClient, id: u64) -> Result<()> {
	let relayer = client.relayer()?;
	let completion = relayer.complete(id).await?;
	println!(
		"Completed auction of intent {} in {}",
		completion.intent_id, completion.tx_hash
	);
	Ok(())
}
