//! Error types for the Courier engine
//!
//! The taxonomy follows how failures propagate: transport and protocol
//! problems are logged and dropped by the event loop, authentication failures
//! force a client restart, and correlated request failures are handed to the
//! request's own handler as a [`ClientError`] value.

use crate::protocol::ClientError;

// ----------------------------------------------------------------------------
// Core Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Courier engine
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// Client-side failure unrelated to any pending request
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// The session is invalid or expired and the client must be rebuilt
    #[error("Authentication error {code}: {message}")]
    Auth { code: i32, message: String },

    /// Failure correlated to a specific request
    #[error("Request failed: {0}")]
    Request(#[from] ClientError),

    /// An event of an unexpected kind for the current state
    #[error("Protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: String, actual: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Channel communication error between producers and the event loop
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl CourierError {
    /// Create a transport error with a reason
    pub fn transport<T: Into<String>>(reason: T) -> Self {
        CourierError::Transport {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        CourierError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        CourierError::Channel {
            message: message.into(),
        }
    }

    /// Create a protocol mismatch error
    pub fn protocol_mismatch<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        CourierError::ProtocolMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classify a free-standing client error
    pub fn from_client_error(error: ClientError) -> Self {
        if error.is_unauthenticated() {
            CourierError::Auth {
                code: error.code,
                message: error.message,
            }
        } else {
            CourierError::Transport {
                reason: error.to_string(),
            }
        }
    }

    /// Whether this error requires tearing down and recreating the client
    pub fn requires_restart(&self) -> bool {
        matches!(self, CourierError::Auth { .. })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, CourierError>;
pub type CourierResult<T> = Result<T>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
