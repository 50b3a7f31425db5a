//! Courier CLI library
//!
//! Argument parsing, layered configuration loading and the command handlers
//! behind the `courier` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::{parse_transcript, replay, CommandDispatcher, ReplayReport};
pub use config::ConfigOverrides;
pub use error::{CliError, Result};
