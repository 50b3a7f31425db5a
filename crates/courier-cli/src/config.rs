//! Courier CLI Configuration Loading
//!
//! The effective [`BotConfig`] is layered with the priority
//! command-line flags > environment variables > configuration file > defaults.
//! Flags and their environment fallbacks are both resolved by clap, so this
//! module only has to lay them over whatever the file provided.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use courier_core::{redact, BotConfig, StorageConfig};

use crate::cli::Cli;
use crate::error::Result;

/// Characters of the api hash kept when printing
const HASH_PREFIX: usize = 8;
/// Characters of the bot token kept when printing
const TOKEN_PREFIX: usize = 12;

// ----------------------------------------------------------------------------
// Overrides
// ----------------------------------------------------------------------------

/// Settings given on the command line or through the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub bot_token: Option<String>,
    pub allowed_users: Option<String>,
    pub data_dir: Option<String>,
}

impl From<&Cli> for ConfigOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            api_id: cli.api_id.clone(),
            api_hash: cli.api_hash.clone(),
            bot_token: cli.bot_token.clone(),
            allowed_users: cli.allowed_users.clone(),
            data_dir: cli.data_dir.clone(),
        }
    }
}

impl ConfigOverrides {
    /// Lay every present override over `config`
    pub fn apply(&self, config: &mut BotConfig) {
        if let Some(api_id) = &self.api_id {
            config.credentials.api_id = api_id.clone();
        }
        if let Some(api_hash) = &self.api_hash {
            config.credentials.api_hash = api_hash.clone();
        }
        if let Some(bot_token) = &self.bot_token {
            config.credentials.bot_token = bot_token.clone();
        }
        if let Some(allowed) = &self.allowed_users {
            config.allowed_users = Some(allowed.clone());
        }
        if let Some(root) = &self.data_dir {
            config.storage = StorageConfig::under(root);
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

/// Parse a TOML document; missing sections keep their defaults
pub fn parse_config(text: &str) -> Result<BotConfig> {
    Ok(toml::from_str(text)?)
}

pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<BotConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read configuration file {}", path.display()))?;
    parse_config(&text)
}

/// Build the effective configuration for this invocation
pub fn resolve(cli: &Cli) -> Result<BotConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            load_from_file(path)?
        }
        None => {
            info!("Using default configuration");
            BotConfig::default()
        }
    };
    ConfigOverrides::from(cli).apply(&mut config);
    Ok(config)
}

// ----------------------------------------------------------------------------
// Display
// ----------------------------------------------------------------------------

/// Copy of `config` with secrets cut down to a short prefix
pub fn redacted(config: &BotConfig) -> BotConfig {
    let mut shown = config.clone();
    if !shown.credentials.api_hash.is_empty() {
        shown.credentials.api_hash = redact(&config.credentials.api_hash, HASH_PREFIX);
    }
    if !shown.credentials.bot_token.is_empty() {
        shown.credentials.bot_token = redact(&config.credentials.bot_token, TOKEN_PREFIX);
    }
    shown
}

/// Render the redacted configuration as TOML
pub fn render(config: &BotConfig) -> Result<String> {
    Ok(toml::to_string_pretty(&redacted(config))?)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use courier_core::RestartPolicy;
    use std::io::Write;

    const SAMPLE: &str = r#"
allowed_users = "10, 20"

[credentials]
api_id = "12345"
api_hash = "0123456789abcdef"
bot_token = "123456:ABCDEFGHIJKLMNOP"

[runtime]
poll_timeout_ms = 250
restart_policy = "preserve"
"#;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(SAMPLE).unwrap();

        assert_eq!(config.credentials.api_id, "12345");
        assert_eq!(config.runtime.poll_timeout_ms, 250);
        assert_eq!(config.runtime.restart_policy, RestartPolicy::Preserve);
        assert_eq!(config.runtime.command_buffer_size, 64);
        assert_eq!(config.storage.database_directory, "bot_db");
        assert_eq!(config.transfer.bucket_step, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let result = parse_config("[runtime]\npoll_timeout_ms = \"soon\"");
        assert!(matches!(result, Err(CliError::TomlParsing(_))));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = parse_config(SAMPLE).unwrap();
        let overrides = ConfigOverrides {
            bot_token: Some("999:override".to_string()),
            allowed_users: Some("30".to_string()),
            data_dir: Some("/var/lib/courier/".to_string()),
            ..ConfigOverrides::default()
        };
        overrides.apply(&mut config);

        assert_eq!(config.credentials.bot_token, "999:override");
        assert_eq!(config.credentials.api_id, "12345");
        assert_eq!(config.allowed_users.as_deref(), Some("30"));
        assert_eq!(config.storage.database_directory, "/var/lib/courier/bot_db");
        assert_eq!(config.storage.files_directory, "/var/lib/courier/bot_files");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.allowed_users.as_deref(), Some("10, 20"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_from_file("/nonexistent/courier.toml");
        let Err(CliError::Config(reason)) = result else {
            panic!("expected configuration error");
        };
        assert!(reason.contains("cannot read configuration file /nonexistent/courier.toml"));
        // The underlying io error is kept in the message.
        assert!(reason.contains(": "));
    }

    #[test]
    fn test_render_hides_secrets() {
        let config = parse_config(SAMPLE).unwrap();
        let text = render(&config).unwrap();

        assert!(text.contains("01234567..."));
        assert!(text.contains("123456:ABCDE..."));
        assert!(!text.contains("0123456789abcdef"));
        assert!(!text.contains("ABCDEFGHIJKLMNOP"));

        let shown = parse_config(&text).unwrap();
        assert_eq!(shown.runtime, config.runtime);
    }
}
