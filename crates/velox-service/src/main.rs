use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velox_config::{ConfigLoader, VeloxConfig};
use velox_chain::ChainError;
use velox_core::{CoreError, VeloxClient};

mod api;
mod cli;
mod commands;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let config = ConfigLoader::new()
		.with_file(&args.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

	let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
	setup_tracing(log_level)?;

	match args.command {
		Command::Validate => validate_config(&config),
		Command::Serve => serve(config).await,
		command => {
			let client = VeloxClient::from_config(config).context("Failed to initialize client")?;
			commands::run(&client, command).await
		}
	}
}

async fn serve(config: VeloxConfig) -> Result<()> {
	info!("Starting Velox API");

	let port = config.api.port;
	let client = VeloxClient::from_config(config).context("Failed to initialize client")?;
	match client.chain().verify_chain_id().await {
		Ok(ledger) => info!(chain_id = ledger.chain_id, "Connected to fullnode"),
		Err(e @ ChainError::ChainIdMismatch { .. }) => {
			return Err(e).context("Fullnode does not serve the configured network");
		}
		Err(e) => warn!("Could not verify fullnode chain id: {}", e),
	}
	let relayer = match client.relayer() {
		Ok(relayer) => {
			info!(wallet_id = %relayer.wallet_id(), "Auction relayer ready");
			Some(Arc::new(relayer))
		}
		Err(CoreError::RelayerNotConfigured) => {
			warn!("No relayer configured, auction completion requests will fail");
			None
		}
		Err(e) => return Err(e).context("Failed to initialize relayer"),
	};

	let server = api::ApiServer::new(port, relayer);
	let mut http_handle = tokio::spawn(async move { server.run().await });

	tokio::select! {
		_ = setup_shutdown_signal() => {
			info!("Shutdown signal received, stopping services...");
			http_handle.abort();
		}
		result = &mut http_handle => {
			result.context("API task panicked")??;
		}
	}

	client.shutdown().await.context("Failed to shut down client")?;

	info!("Velox API stopped");
	Ok(())
}

fn validate_config(config: &VeloxConfig) -> Result<()> {
	info!("Configuration is valid");
	info!("Network: {} ({})", config.network.network, config.network.fullnode_url());
	info!("Velox address: {}", config.velox.address);
	info!(
		"Sponsorship: {}",
		if config.sponsorship.is_active() { "enabled" } else { "disabled" }
	);
	info!("Tokens: {}", config.tokens.len());
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to initialize tracing")?;

	Ok(())
}

pub(crate) async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				tracing::error!("Failed to install signal handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
