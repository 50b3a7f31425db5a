//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Application id issued for the client
    #[arg(long, env = "TELEGRAM_API_ID")]
    pub api_id: Option<String>,

    /// Application hash issued for the client
    #[arg(long, env = "TELEGRAM_API_HASH", hide_env_values = true)]
    pub api_hash: Option<String>,

    /// Bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Comma-separated user ids allowed to talk to the bot
    #[arg(long, env = "COURIER_ALLOWED_USERS")]
    pub allowed_users: Option<String>,

    /// Root directory for the client database and downloaded files
    #[arg(short, long, env = "COURIER_DATA_DIR")]
    pub data_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine against a JSON-lines transcript of client events
    Replay {
        /// Transcript file, one inbound object per line
        transcript: PathBuf,
        /// Answer requests with the simulated backend
        #[arg(long)]
        simulate: bool,
        /// Seconds to wait for the loop to settle before stopping
        #[arg(long, default_value_t = 5)]
        settle_secs: u64,
    },
    /// Print the effective configuration with secrets redacted
    Config,
    /// Validate the effective configuration and exit
    Check,
}
