//! Messaging client boundary
//!
//! The engine treats the underlying messaging client as opaque: it can accept
//! a request without blocking and hand back the next inbound object within a
//! timeout. The factory owns handle creation so the event loop can tear a
//! broken handle down and obtain a fresh one.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;
use crate::protocol::{Incoming, OutboundRequest};

// ----------------------------------------------------------------------------
// Messaging Client Trait
// ----------------------------------------------------------------------------

/// Opaque asynchronous request/response client
#[async_trait]
pub trait MessagingClient: Send {
    /// Transmit a request tagged with its id; must not wait for a response
    fn send(&mut self, request: OutboundRequest) -> Result<()>;

    /// Wait at most `timeout` for the next inbound object
    ///
    /// `Ok(None)` means the timeout elapsed with nothing to deliver.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Incoming>>;

    /// Short name for logging
    fn name(&self) -> &str {
        "client"
    }
}

// ----------------------------------------------------------------------------
// Client Factory Trait
// ----------------------------------------------------------------------------

/// Creates client handles, and replaces them after a fatal session failure
pub trait ClientFactory: Send {
    type Client: MessagingClient + 'static;

    fn create(&mut self) -> Result<Self::Client>;

    /// Consume a broken handle and produce a fresh one
    fn recreate(&mut self, old: Self::Client) -> Result<Self::Client> {
        drop(old);
        self.create()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
