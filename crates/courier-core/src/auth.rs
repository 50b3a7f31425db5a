//! Authorization bring-up state machine
//!
//! Reacts to `AuthorizationStateChanged` push events, drives the handshake
//! (connection parameters, then bot token), tracks whether the session is
//! usable and flags when the client handle must be torn down and rebuilt.
//! Transitions never send anything themselves; they return [`AuthEffect`]s
//! for the event loop to execute.

use tracing::{info, warn};

use crate::protocol::{AuthorizationState, ConnectionParameters, Request};

// ----------------------------------------------------------------------------
// Transition Results
// ----------------------------------------------------------------------------

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEffect {
    /// Send a request with no response handler
    Send(Request),
    /// Tear down and recreate the client before the next poll
    Restart,
}

/// Result of feeding one state into the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTransition {
    pub from: AuthorizationState,
    pub to: AuthorizationState,
    pub effects: Vec<AuthEffect>,
}

// ----------------------------------------------------------------------------
// Authorization State Machine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthorizationStateMachine {
    state: AuthorizationState,
    authorized: bool,
    need_restart: bool,
    /// Set once parameters went out for the current client handle
    parameters_sent: bool,
    parameters: ConnectionParameters,
    bot_token: String,
    transitions: u64,
}

impl AuthorizationStateMachine {
    /// Start in `Closed`: the client is not connected yet
    pub fn new(parameters: ConnectionParameters, bot_token: impl Into<String>) -> Self {
        Self {
            state: AuthorizationState::Closed,
            authorized: false,
            need_restart: false,
            parameters_sent: false,
            parameters,
            bot_token: bot_token.into(),
            transitions: 0,
        }
    }

    /// Apply an announced state
    pub fn handle(&mut self, next: AuthorizationState) -> AuthTransition {
        let from = std::mem::replace(&mut self.state, next.clone());
        self.transitions += 1;
        let mut effects = Vec::new();

        match &next {
            AuthorizationState::NeedParameters => {
                info!("client waiting for parameters");
                effects.push(AuthEffect::Send(self.parameters_request()));
            }
            AuthorizationState::NeedToken => {
                info!(token = %redact(&self.bot_token, 12), "authenticating with bot token");
                effects.push(AuthEffect::Send(Request::CheckBotToken {
                    token: self.bot_token.clone(),
                }));
            }
            AuthorizationState::Ready => {
                self.authorized = true;
                info!("bot authorized and ready");
            }
            AuthorizationState::LoggingOut => {
                self.authorized = false;
                info!("client logging out");
            }
            AuthorizationState::Closed => {
                self.authorized = false;
                self.need_restart = true;
                info!("client closed, scheduling restart");
                effects.push(AuthEffect::Restart);
            }
            AuthorizationState::Unknown(code) => {
                // The last known state stays in effect.
                self.state = from.clone();
                warn!(state = %code, "ignoring unknown authorization state");
            }
        }

        AuthTransition {
            from,
            to: next,
            effects,
        }
    }

    /// Build the parameters request and mark it as sent for this client handle
    pub fn parameters_request(&mut self) -> Request {
        self.parameters_sent = true;
        info!(
            api_id = self.parameters.api_id,
            api_hash = %redact(&self.parameters.api_hash, 8),
            "sending connection parameters"
        );
        Request::SetParameters(self.parameters.clone())
    }

    /// Flag the session invalid (unauthenticated error)
    pub fn force_restart(&mut self) {
        self.authorized = false;
        self.need_restart = true;
    }

    /// Reset after the client handle was recreated
    pub fn reset_after_restart(&mut self) {
        self.state = AuthorizationState::Closed;
        self.authorized = false;
        self.need_restart = false;
        self.parameters_sent = false;
    }

    pub fn state(&self) -> &AuthorizationState {
        &self.state
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn needs_restart(&self) -> bool {
        self.need_restart
    }

    pub fn parameters_sent(&self) -> bool {
        self.parameters_sent
    }

    pub fn transition_count(&self) -> u64 {
        self.transitions
    }
}

/// Keep only a short prefix of a secret for logging
pub fn redact(secret: &str, keep: usize) -> String {
    let prefix: String = secret.chars().take(keep).collect();
    format!("{prefix}...")
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
