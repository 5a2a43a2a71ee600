//! Command-line interface definitions.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "velox")]
#[command(about = "Velox intent client for the Movement network", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "CONFIG_FILE", default_value = "config/testnet.toml")]
	pub config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, env = "VELOX_LOG_LEVEL")]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Show token balances
	Balances {
		/// Account to inspect, defaults to the configured wallet
		#[arg(short, long)]
		address: Option<String>,
	},

	/// List the intents of an account
	Intents {
		#[arg(short, long)]
		address: Option<String>,
	},

	/// Show one intent
	Intent {
		id: u64,
	},

	/// Submit a new intent
	#[command(subcommand)]
	Submit(SubmitCommand),

	/// Cancel an open intent
	Cancel {
		id: u64,
	},

	/// Register the wallet as a solver
	RegisterSolver {
		/// Stake in MOVE
		#[arg(long)]
		stake: String,
		#[arg(long)]
		name: Option<String>,
		#[arg(long)]
		description: Option<String>,
		#[arg(long)]
		website: Option<String>,
		#[arg(long)]
		logo_url: Option<String>,
	},

	/// Follow intents and scheduled progress until interrupted
	Watch {
		#[arg(short, long)]
		address: Option<String>,
	},

	/// Complete an ended sealed-bid auction with the relayer wallet
	CompleteAuction {
		id: u64,
	},

	/// Run the HTTP API
	Serve,

	/// Validate the configuration file
	Validate,
}

/// Input and output side shared by all intent kinds.
#[derive(ClapArgs, Debug, Clone)]
pub struct Pair {
	/// Input token symbol or address
	#[arg(long = "from")]
	pub input: String,
	/// Output token symbol or address
	#[arg(long = "to")]
	pub output: String,
}

#[derive(Subcommand, Debug)]
pub enum SubmitCommand {
	/// Market swap
	Swap {
		#[command(flatten)]
		pair: Pair,
		/// Input amount in token units, e.g. 1.5
		#[arg(long)]
		amount: String,
		/// Minimum output amount in token units
		#[arg(long)]
		min_out: String,
		/// Seconds until the intent expires
		#[arg(long, default_value_t = 3600)]
		deadline_secs: u64,
	},

	/// Limit order
	Limit {
		#[command(flatten)]
		pair: Pair,
		#[arg(long)]
		amount: String,
		/// Minimum output per input unit, in output token units
		#[arg(long)]
		limit_price: String,
		#[arg(long, default_value_t = 86_400)]
		expiry_secs: u64,
		#[arg(long)]
		partial_fill: bool,
	},

	/// Time-weighted order split into chunks
	Twap {
		#[command(flatten)]
		pair: Pair,
		/// Total input amount in token units
		#[arg(long)]
		amount: String,
		#[arg(long)]
		chunks: u64,
		#[arg(long)]
		interval_secs: u64,
		#[arg(long, default_value_t = 50)]
		max_slippage_bps: u64,
		/// Seconds from now until the first chunk
		#[arg(long, default_value_t = 0)]
		start_in_secs: u64,
	},

	/// Dollar-cost averaging
	Dca {
		#[command(flatten)]
		pair: Pair,
		/// Input amount per period in token units
		#[arg(long)]
		amount_per_period: String,
		#[arg(long)]
		periods: u64,
		#[arg(long)]
		interval_secs: u64,
		#[arg(long, default_value_t = 0)]
		start_in_secs: u64,
	},

	/// Swap filled through a sealed-bid auction
	SealedBid {
		#[command(flatten)]
		pair: Pair,
		#[arg(long)]
		amount: String,
		#[arg(long)]
		min_out: String,
		#[arg(long, default_value_t = 60)]
		auction_secs: u64,
		#[arg(long, default_value_t = 3600)]
		deadline_secs: u64,
	},

	/// Swap filled through a Dutch auction
	Dutch {
		#[command(flatten)]
		pair: Pair,
		#[arg(long)]
		amount: String,
		/// Output amount the auction starts at, in output token units
		#[arg(long)]
		start_price: String,
		/// Output amount the auction ends at, in output token units
		#[arg(long)]
		end_price: String,
		#[arg(long, default_value_t = 60)]
		auction_secs: u64,
		#[arg(long, default_value_t = 3600)]
		deadline_secs: u64,
	},
}
