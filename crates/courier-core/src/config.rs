//! Centralized Configuration Management
//!
//! All settings the engine needs to bring a bot session up: credentials,
//! storage locations, the optional allow-list, client parameters, event loop
//! tuning and transfer reporting granularity.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::access::AllowList;
use crate::errors::{CourierError, Result};
use crate::protocol::ConnectionParameters;
use crate::transfer::DEFAULT_BUCKET_STEP;

// ----------------------------------------------------------------------------
// Credentials
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Application id, kept as text as it arrives from env or file
    pub api_id: String,
    pub api_hash: String,
    pub bot_token: String,
}

impl CredentialsConfig {
    /// Parse the application id as the positive integer the client expects
    pub fn parsed_api_id(&self) -> Result<i32> {
        let id = self.api_id.trim().parse::<i32>().map_err(|_| {
            CourierError::config_error(format!("api_id must be numeric, got {:?}", self.api_id))
        })?;
        if id <= 0 {
            return Err(CourierError::config_error("api_id must be positive"));
        }
        Ok(id)
    }
}

// ----------------------------------------------------------------------------
// Storage
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_directory: String,
    pub files_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_directory: "bot_db".to_string(),
            files_directory: "bot_files".to_string(),
        }
    }
}

impl StorageConfig {
    /// Place both directories under a common data root
    pub fn under(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            database_directory: format!("{root}/bot_db"),
            files_directory: format!("{root}/bot_files"),
        }
    }
}

// ----------------------------------------------------------------------------
// Client Parameters
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub device_model: String,
    pub application_version: String,
    pub system_language_code: String,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_model: "Bot".to_string(),
            application_version: "1.0".to_string(),
            system_language_code: "es".to_string(),
            use_message_database: false,
            use_secret_chats: false,
        }
    }
}

// ----------------------------------------------------------------------------
// Runtime Tuning
// ----------------------------------------------------------------------------

/// What happens to in-flight state when the client handle is recreated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Fail pending handlers, cancel identity registrations, evict transfers
    #[default]
    Flush,
    /// Keep every table; responses to pre-restart requests will never arrive
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on one blocking poll
    pub poll_timeout_ms: u64,
    /// Capacity of the producer command channel
    pub command_buffer_size: usize,
    pub restart_policy: RestartPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            command_buffer_size: 64,
            restart_policy: RestartPolicy::Flush,
        }
    }
}

impl RuntimeConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Reporting granularity in percent
    pub bucket_step: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            bucket_step: DEFAULT_BUCKET_STEP,
        }
    }
}

// ----------------------------------------------------------------------------
// Bot Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub credentials: CredentialsConfig,
    pub storage: StorageConfig,
    /// Comma-separated user ids; absent or blank means unrestricted
    pub allowed_users: Option<String>,
    pub client: ClientConfig,
    pub runtime: RuntimeConfig,
    pub transfer: TransferConfig,
}

impl BotConfig {
    /// Create a configuration with the given credentials and defaults elsewhere
    pub fn new(api_id: impl Into<String>, api_hash: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            credentials: CredentialsConfig {
                api_id: api_id.into(),
                api_hash: api_hash.into(),
                bot_token: bot_token.into(),
            },
            ..Self::default()
        }
    }

    /// Validate all settings
    pub fn validate(&self) -> Result<()> {
        if self.credentials.api_hash.trim().is_empty() {
            return Err(CourierError::config_error("api_hash must not be empty"));
        }
        if self.credentials.bot_token.trim().is_empty() {
            return Err(CourierError::config_error("bot_token must not be empty"));
        }
        self.credentials.parsed_api_id()?;

        if self.runtime.poll_timeout_ms == 0 {
            return Err(CourierError::config_error("poll_timeout_ms must be greater than zero"));
        }
        if self.runtime.command_buffer_size == 0 {
            return Err(CourierError::config_error("command_buffer_size must be greater than zero"));
        }
        if self.transfer.bucket_step == 0 || self.transfer.bucket_step > 100 {
            return Err(CourierError::config_error("bucket_step must be between 1 and 100"));
        }

        self.allow_list()?;
        Ok(())
    }

    /// Parameters sent while the client waits for them
    pub fn connection_parameters(&self) -> Result<ConnectionParameters> {
        Ok(ConnectionParameters {
            api_id: self.credentials.parsed_api_id()?,
            api_hash: self.credentials.api_hash.clone(),
            database_directory: self.storage.database_directory.clone(),
            files_directory: self.storage.files_directory.clone(),
            device_model: self.client.device_model.clone(),
            application_version: self.client.application_version.clone(),
            system_language_code: self.client.system_language_code.clone(),
            use_message_database: self.client.use_message_database,
            use_secret_chats: self.client.use_secret_chats,
        })
    }

    pub fn allow_list(&self) -> Result<AllowList> {
        match &self.allowed_users {
            Some(csv) => AllowList::parse(csv),
            None => Ok(AllowList::disabled()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
