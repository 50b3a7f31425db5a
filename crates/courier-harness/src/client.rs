//! Scripted in-memory messaging client
//!
//! A [`ScriptHandle`] owns a queue of inbound objects and a log of every
//! request the engine transmitted. [`ScriptedClient`]s created from it (by a
//! [`ScriptedFactory`]) deliver the queued objects and record sends, so a test
//! can drive the engine from the outside while it runs on its own task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, trace};

use courier_core::{
    ClientFactory, CourierError, CourierResult, Incoming, MessagingClient, OutboundRequest,
    Payload, Request, RequestId,
};

/// Produces inbound objects in reply to a transmitted request
pub type AutoReply = Box<dyn FnMut(&OutboundRequest) -> Vec<Incoming> + Send>;

#[derive(Default)]
struct ScriptState {
    inbound: VecDeque<Incoming>,
    sent: Vec<OutboundRequest>,
    auto_reply: Option<AutoReply>,
    on_create: Vec<Incoming>,
    fail_sends: bool,
    clients_created: u32,
}

struct Shared {
    state: Mutex<ScriptState>,
    notify: Notify,
}

// ----------------------------------------------------------------------------
// Script Handle
// ----------------------------------------------------------------------------

/// Test-side view of the scripted client
#[derive(Clone)]
pub struct ScriptHandle {
    shared: Arc<Shared>,
}

impl ScriptHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ScriptState::default()),
                notify: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        // A panicking test thread must not hide the script from the others.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an inbound object for the live client
    pub fn push(&self, incoming: Incoming) {
        self.state().inbound.push_back(incoming);
        self.shared.notify.notify_one();
    }

    pub fn push_update(&self, payload: Payload) {
        self.push(Incoming::update(payload));
    }

    pub fn push_response(&self, id: RequestId, payload: Payload) {
        self.push(Incoming::response(id, payload));
    }

    /// Install a reply generator consulted on every transmitted request
    pub fn set_auto_reply<F>(&self, reply: F)
    where
        F: FnMut(&OutboundRequest) -> Vec<Incoming> + Send + 'static,
    {
        self.state().auto_reply = Some(Box::new(reply));
    }

    /// Objects queued every time a client handle is created
    pub fn on_create(&self, events: Vec<Incoming>) {
        self.state().on_create = events;
    }

    /// Make every subsequent send fail with a transport error
    pub fn set_fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Every request transmitted so far, in order
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.state().sent.clone()
    }

    pub fn sent_requests(&self) -> Vec<Request> {
        self.state().sent.iter().map(|o| o.request.clone()).collect()
    }

    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    pub fn pending_inbound(&self) -> usize {
        self.state().inbound.len()
    }

    pub fn clients_created(&self) -> u32 {
        self.state().clients_created
    }

    /// Wait until a transmitted request satisfies `predicate`
    pub async fn wait_for_sent<F>(&self, timeout: Duration, predicate: F) -> Option<OutboundRequest>
    where
        F: Fn(&OutboundRequest) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.state().sent.iter().find(|o| predicate(o)).cloned() {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until the inbound queue is drained
    pub async fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending_inbound() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// Create a client bound to this script
    pub fn client(&self) -> ScriptedClient {
        let (generation, queued) = {
            let mut state = self.state();
            state.clients_created += 1;
            let bring_up = state.on_create.clone();
            let queued = !bring_up.is_empty();
            state.inbound.extend(bring_up);
            (state.clients_created, queued)
        };
        if queued {
            self.shared.notify.notify_one();
        }
        ScriptedClient {
            shared: Arc::clone(&self.shared),
            generation,
        }
    }

    pub fn factory(&self) -> ScriptedFactory {
        ScriptedFactory {
            handle: self.clone(),
        }
    }
}

impl Default for ScriptHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Scripted Client
// ----------------------------------------------------------------------------

pub struct ScriptedClient {
    shared: Arc<Shared>,
    generation: u32,
}

impl ScriptedClient {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pop(&self) -> Option<Incoming> {
        self.state().inbound.pop_front()
    }
}

#[async_trait]
impl MessagingClient for ScriptedClient {
    fn send(&mut self, request: OutboundRequest) -> CourierResult<()> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(CourierError::transport("scripted send failure"));
        }

        trace!(request_id = request.id.value(), kind = request.request.kind(), "scripted send");
        let replies = match state.auto_reply.as_mut() {
            Some(reply) => reply(&request),
            None => Vec::new(),
        };
        state.sent.push(request);

        if !replies.is_empty() {
            state.inbound.extend(replies);
            drop(state);
            self.shared.notify.notify_one();
        }
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> CourierResult<Option<Incoming>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(incoming) = self.pop() {
                return Ok(Some(incoming));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // notify_one keeps a permit, so a push between pop and wait is not lost.
            if tokio::time::timeout(remaining, self.shared.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.pop());
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl Drop for ScriptedClient {
    fn drop(&mut self) {
        debug!(generation = self.generation, "scripted client dropped");
    }
}

// ----------------------------------------------------------------------------
// Scripted Factory
// ----------------------------------------------------------------------------

pub struct ScriptedFactory {
    handle: ScriptHandle,
}

impl ScriptedFactory {
    pub fn handle(&self) -> &ScriptHandle {
        &self.handle
    }
}

impl ClientFactory for ScriptedFactory {
    type Client = ScriptedClient;

    fn create(&mut self) -> CourierResult<ScriptedClient> {
        Ok(self.handle.client())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
