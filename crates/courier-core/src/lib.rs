//! Courier Core
//!
//! Value types, the wire model of the messaging client boundary, and the
//! session components of a bot engine: request/response correlation, sender
//! access control, authorization bring-up, provisional message id resolution
//! and transfer progress tracking. Nothing here performs I/O; the runtime
//! crate owns the event loop that drives these components.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod access;
pub mod auth;
pub mod client;
pub mod config;
pub mod correlator;
pub mod errors;
pub mod identity;
pub mod protocol;
pub mod transfer;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use access::{AccessGate, AllowList, NOT_AUTHORIZED_NOTICE};
pub use auth::{redact, AuthEffect, AuthTransition, AuthorizationStateMachine};
pub use client::{ClientFactory, MessagingClient};
pub use config::{
    BotConfig, ClientConfig, CredentialsConfig, RestartPolicy, RuntimeConfig, StorageConfig,
    TransferConfig,
};
pub use correlator::{Correlated, CorrelatorStats, RequestCorrelator, ResponseHandler};
pub use errors::{CourierError, CourierResult, Result};
pub use identity::{IdentityCallback, Identified, MessageIdentityResolver};
pub use protocol::{
    Attachment, AuthorizationState, ChatAction, ClientError, ConnectionParameters, FormattedText,
    Incoming, InputMessageContent, Message, MessageContent, MessageSender, OutboundRequest,
    Payload, RemoteFile, Request,
};
pub use transfer::{
    FileMeta, FileProgress, ProgressReport, TransferCompletion, TransferDecision,
    TransferProgressTracker, TransferSession, TransferStats,
};
pub use types::{
    ChatId, FileId, MessageId, RequestId, SystemTimeSource, TimeSource, Timestamp, UserId,
};
