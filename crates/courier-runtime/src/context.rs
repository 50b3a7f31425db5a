//! Bot session state
//!
//! [`BotContext`] is the single owner of every table the engine keeps: the
//! pending request handlers, the provisional id registrations, the transfer
//! sessions, the authorization state and the access gate. Only the event loop
//! task holds it; handlers receive it mutably for the duration of one call.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use courier_core::{
    AccessGate, AuthorizationStateMachine, BotConfig, ClientError, Correlated, CourierResult,
    Identified, MessageIdentityResolver, Payload, Request, RequestCorrelator, RequestId,
    RestartPolicy, TimeSource, Timestamp, TransferProgressTracker,
};

use crate::responder::{EchoResponder, Responder};

/// Shared time source handle
pub type SharedTimeSource = Arc<dyn TimeSource + Send + Sync>;

// ----------------------------------------------------------------------------
// Bot Statistics
// ----------------------------------------------------------------------------

/// Snapshot of the session, published after every loop iteration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BotStats {
    pub authorized: bool,
    pub auth_state: String,
    pub restarts: u64,
    pub pending_requests: usize,
    pub pending_identities: usize,
    pub active_transfers: usize,
    pub events_processed: u64,
    pub denied_senders: u64,
}

// ----------------------------------------------------------------------------
// Bot Context
// ----------------------------------------------------------------------------

pub struct BotContext {
    pub(crate) correlator: RequestCorrelator<BotContext>,
    pub(crate) identities: MessageIdentityResolver<BotContext>,
    pub(crate) auth: AuthorizationStateMachine,
    pub(crate) gate: AccessGate,
    pub(crate) transfers: TransferProgressTracker,
    pub(crate) responder: Box<dyn Responder>,
    time_source: SharedTimeSource,
    restart_policy: RestartPolicy,
    restarts: u64,
    pub(crate) events_processed: u64,
}

impl BotContext {
    pub fn new(config: &BotConfig, time_source: SharedTimeSource) -> CourierResult<Self> {
        let auth = AuthorizationStateMachine::new(
            config.connection_parameters()?,
            config.credentials.bot_token.clone(),
        );

        Ok(Self {
            correlator: RequestCorrelator::new(),
            identities: MessageIdentityResolver::new(),
            auth,
            gate: AccessGate::new(config.allow_list()?),
            transfers: TransferProgressTracker::with_bucket_step(config.transfer.bucket_step),
            responder: Box::new(EchoResponder),
            time_source,
            restart_policy: config.runtime.restart_policy,
            restarts: 0,
            events_processed: 0,
        })
    }

    pub fn set_responder(&mut self, responder: Box<dyn Responder>) {
        self.responder = responder;
    }

    pub fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    /// Queue a request whose response nobody waits for
    pub fn send(&mut self, request: Request) -> RequestId {
        self.correlator.send(request, None)
    }

    /// Queue a request and register `handler` for its response
    pub fn send_with<F>(&mut self, request: Request, handler: F) -> RequestId
    where
        F: FnOnce(&mut BotContext, Result<Payload, ClientError>) + Send + 'static,
    {
        self.correlator.send_with(request, handler)
    }

    /// Queue a request whose failure is only logged
    pub fn send_logged(&mut self, request: Request) -> RequestId {
        let kind = request.kind();
        self.send_with(request, move |_, result| {
            if let Err(error) = result {
                warn!(kind, code = error.code, message = %error.message, "request failed");
            }
        })
    }

    pub fn auth(&self) -> &AuthorizationStateMachine {
        &self.auth
    }

    pub fn transfers(&self) -> &TransferProgressTracker {
        &self.transfers
    }

    pub fn needs_restart(&self) -> bool {
        self.auth.needs_restart()
    }

    /// Queue the connection parameters if they have not gone out for this client handle
    pub fn ensure_parameters_sent(&mut self) -> Option<RequestId> {
        if self.auth.parameters_sent() {
            return None;
        }
        let request = self.auth.parameters_request();
        Some(self.send(request))
    }

    /// Settle in-flight state after the client handle was recreated
    pub fn after_restart(&mut self) {
        self.restarts += 1;

        match self.restart_policy {
            RestartPolicy::Flush => {
                let failed = RequestCorrelator::fail_all(self, ClientError::restarted());
                let cancelled = MessageIdentityResolver::cancel_all(self);
                let evicted = self.transfers.evict_all();
                info!(
                    restarts = self.restarts,
                    failed, cancelled, evicted, "client restarted, in-flight state flushed"
                );
            }
            RestartPolicy::Preserve => {
                info!(
                    restarts = self.restarts,
                    pending = self.correlator.pending_count(),
                    "client restarted, in-flight state preserved"
                );
            }
        }

        self.auth.reset_after_restart();
    }

    pub fn stats(&self) -> BotStats {
        BotStats {
            authorized: self.auth.is_authorized(),
            auth_state: self.auth.state().name().to_string(),
            restarts: self.restarts,
            pending_requests: self.correlator.pending_count(),
            pending_identities: self.identities.pending_count(),
            active_transfers: self.transfers.active_count(),
            events_processed: self.events_processed,
            denied_senders: self.gate.denied_count(),
        }
    }
}

impl Correlated for BotContext {
    fn correlator(&mut self) -> &mut RequestCorrelator<Self> {
        &mut self.correlator
    }
}

impl Identified for BotContext {
    fn identities(&mut self) -> &mut MessageIdentityResolver<Self> {
        &mut self.identities
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
