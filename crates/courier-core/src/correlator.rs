//! Request/response correlation
//!
//! The [`RequestCorrelator`] allocates request ids, keeps at most one pending
//! handler per id and hands each response to its handler exactly once.
//! Outbound requests are queued in an outbox in allocation order; the event
//! loop drains the outbox into the client after every dispatch step.
//!
//! Handlers receive the dispatch context `C` mutably, so they can update
//! session state and enqueue follow-up requests. Because the correlator itself
//! lives inside that context, resolution goes through the associated function
//! [`RequestCorrelator::resolve`], which removes the handler before calling it.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::protocol::{ClientError, OutboundRequest, Payload, Request};
use crate::types::RequestId;

/// Continuation invoked once with the response (or correlated error) of a request
pub type ResponseHandler<C> = Box<dyn FnOnce(&mut C, Result<Payload, ClientError>) + Send>;

/// Context types that own a [`RequestCorrelator`] for themselves
pub trait Correlated: Sized {
    fn correlator(&mut self) -> &mut RequestCorrelator<Self>;
}

// ----------------------------------------------------------------------------
// Request Correlator
// ----------------------------------------------------------------------------

/// Pending-handler table plus outbound queue
pub struct RequestCorrelator<C> {
    /// Next id to hand out; never reused, not even across client restarts
    next_id: u64,
    pending: HashMap<RequestId, ResponseHandler<C>>,
    outbox: VecDeque<OutboundRequest>,
    stats: CorrelatorStats,
}

impl<C> RequestCorrelator<C> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            outbox: VecDeque::new(),
            stats: CorrelatorStats::default(),
        }
    }

    /// Allocate an id for `request`, register `handler` under it and queue it for transmission
    pub fn send(&mut self, request: Request, handler: Option<ResponseHandler<C>>) -> RequestId {
        let id = RequestId::new(self.next_id);
        self.next_id += 1;

        if let Some(handler) = handler {
            self.pending.insert(id, handler);
        }

        debug!(request_id = id.value(), kind = request.kind(), "queueing request");
        self.outbox.push_back(OutboundRequest { id, request });
        self.stats.sent += 1;
        id
    }

    /// Send with a closure handler
    pub fn send_with<F>(&mut self, request: Request, handler: F) -> RequestId
    where
        F: FnOnce(&mut C, Result<Payload, ClientError>) + Send + 'static,
    {
        self.send(request, Some(Box::new(handler)))
    }

    /// Remove and return the handler registered for `id`
    pub fn take(&mut self, id: RequestId) -> Option<ResponseHandler<C>> {
        self.pending.remove(&id)
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Id the next `send` will allocate
    pub fn next_id(&self) -> RequestId {
        RequestId::new(self.next_id)
    }

    /// Take every queued request in enqueue order
    pub fn drain_outbox(&mut self) -> Vec<OutboundRequest> {
        self.outbox.drain(..).collect()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// Remove every pending handler without invoking it
    pub fn discard_pending(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.stats.flushed += count as u64;
        count
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

impl<C: Correlated> RequestCorrelator<C> {
    /// Hand `response` to the handler registered for `id`
    ///
    /// Returns `false` when no handler is pending, so the caller can fall back
    /// to dispatch by event kind.
    pub fn resolve(ctx: &mut C, id: RequestId, response: Result<Payload, ClientError>) -> bool {
        let Some(handler) = ctx.correlator().take(id) else {
            trace!(request_id = id.value(), "no pending handler");
            ctx.correlator().stats.unmatched += 1;
            return false;
        };

        ctx.correlator().stats.resolved += 1;
        handler(ctx, response);
        true
    }

    /// Fail every pending handler with `error`, returning how many were invoked
    pub fn fail_all(ctx: &mut C, error: ClientError) -> usize {
        let handlers: Vec<_> = ctx.correlator().pending.drain().collect();
        let count = handlers.len();
        ctx.correlator().stats.flushed += count as u64;

        for (id, handler) in handlers {
            debug!(request_id = id.value(), "failing pending request");
            handler(ctx, Err(error.clone()));
        }
        count
    }
}

impl<C> Default for RequestCorrelator<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RequestCorrelator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending.len())
            .field("outbox", &self.outbox.len())
            .field("stats", &self.stats)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Correlator Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// Requests queued for transmission
    pub sent: u64,
    /// Responses delivered to a handler
    pub resolved: u64,
    /// Tagged objects that found no pending handler
    pub unmatched: u64,
    /// Handlers removed by a restart flush
    pub flushed: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
