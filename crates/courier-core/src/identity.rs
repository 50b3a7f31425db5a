//! Provisional to durable message id resolution
//!
//! A sent message is acknowledged immediately with a provisional id; the id
//! that later edits must use is announced separately in a "send succeeded"
//! update carrying `(provisional, durable)`. [`MessageIdentityResolver`] parks a
//! callback under the provisional id until that update arrives.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::types::MessageId;

/// Continuation invoked once with the durable id, or [`MessageId::INVALID`] on cancellation
pub type IdentityCallback<C> = Box<dyn FnOnce(&mut C, MessageId) + Send>;

/// Context types that own a [`MessageIdentityResolver`] for themselves
pub trait Identified: Sized {
    fn identities(&mut self) -> &mut MessageIdentityResolver<Self>;
}

// ----------------------------------------------------------------------------
// Message Identity Resolver
// ----------------------------------------------------------------------------

pub struct MessageIdentityResolver<C> {
    pending: HashMap<MessageId, IdentityCallback<C>>,
    resolved: u64,
    cancelled: u64,
}

impl<C> MessageIdentityResolver<C> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            resolved: 0,
            cancelled: 0,
        }
    }

    /// Park `callback` until the durable id for `temp_id` is announced
    ///
    /// Returns `false` (and drops `callback`) if `temp_id` already has a registration.
    pub fn await_real_id(&mut self, temp_id: MessageId, callback: IdentityCallback<C>) -> bool {
        if self.pending.contains_key(&temp_id) {
            warn!(temp_id = temp_id.0, "durable id already awaited");
            return false;
        }
        debug!(temp_id = temp_id.0, "awaiting durable message id");
        self.pending.insert(temp_id, callback);
        true
    }

    /// Register a closure callback
    pub fn await_with<F>(&mut self, temp_id: MessageId, callback: F) -> bool
    where
        F: FnOnce(&mut C, MessageId) + Send + 'static,
    {
        self.await_real_id(temp_id, Box::new(callback))
    }

    pub fn take(&mut self, temp_id: MessageId) -> Option<IdentityCallback<C>> {
        self.pending.remove(&temp_id)
    }

    pub fn is_pending(&self, temp_id: MessageId) -> bool {
        self.pending.contains_key(&temp_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// (resolved, cancelled) counts
    pub fn counts(&self) -> (u64, u64) {
        (self.resolved, self.cancelled)
    }
}

impl<C: Identified> MessageIdentityResolver<C> {
    /// Deliver the durable id for `temp_id`
    ///
    /// Late or duplicate notifications, and sends nobody waits on, return `false`.
    pub fn on_send_succeeded(ctx: &mut C, temp_id: MessageId, real_id: MessageId) -> bool {
        let Some(callback) = ctx.identities().take(temp_id) else {
            return false;
        };
        ctx.identities().resolved += 1;
        debug!(temp_id = temp_id.0, real_id = real_id.0, "durable message id resolved");
        callback(ctx, real_id);
        true
    }

    /// Cancel a registration whose send failed
    pub fn cancel(ctx: &mut C, temp_id: MessageId) -> bool {
        let Some(callback) = ctx.identities().take(temp_id) else {
            return false;
        };
        ctx.identities().cancelled += 1;
        debug!(temp_id = temp_id.0, "durable id registration cancelled");
        callback(ctx, MessageId::INVALID);
        true
    }

    /// Cancel every registration, returning how many were cancelled
    pub fn cancel_all(ctx: &mut C) -> usize {
        let callbacks: Vec<_> = ctx.identities().pending.drain().collect();
        ctx.identities().cancelled += callbacks.len() as u64;
        let count = callbacks.len();
        for (_, callback) in callbacks {
            callback(ctx, MessageId::INVALID);
        }
        count
    }
}

impl<C> Default for MessageIdentityResolver<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for MessageIdentityResolver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageIdentityResolver")
            .field("pending", &self.pending.len())
            .field("resolved", &self.resolved)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestContext {
        identities: MessageIdentityResolver<TestContext>,
        delivered: Vec<MessageId>,
    }

    impl Identified for TestContext {
        fn identities(&mut self) -> &mut MessageIdentityResolver<Self> {
            &mut self.identities
        }
    }

    fn record(ctx: &mut TestContext, id: MessageId) {
        ctx.delivered.push(id);
    }

    #[test]
    fn test_resolves_once() {
        let mut ctx = TestContext::default();
        assert!(ctx.identities.await_with(MessageId(100), record));

        assert!(MessageIdentityResolver::on_send_succeeded(
            &mut ctx,
            MessageId(100),
            MessageId(2_000_000)
        ));
        assert!(!MessageIdentityResolver::on_send_succeeded(
            &mut ctx,
            MessageId(100),
            MessageId(2_000_000)
        ));
        assert_eq!(ctx.delivered, vec![MessageId(2_000_000)]);
        assert_eq!(ctx.identities.counts(), (1, 0));
    }

    #[test]
    fn test_unregistered_notification_ignored() {
        let mut ctx = TestContext::default();
        assert!(!MessageIdentityResolver::on_send_succeeded(
            &mut ctx,
            MessageId(5),
            MessageId(6)
        ));
        assert!(ctx.delivered.is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut ctx = TestContext::default();
        assert!(ctx.identities.await_with(MessageId(1), record));
        assert!(!ctx.identities.await_with(MessageId(1), record));
        assert_eq!(ctx.identities.pending_count(), 1);
    }

    #[test]
    fn test_cancel_delivers_invalid_id() {
        let mut ctx = TestContext::default();
        ctx.identities.await_with(MessageId(7), record);
        ctx.identities.await_with(MessageId(8), record);

        assert!(MessageIdentityResolver::cancel(&mut ctx, MessageId(7)));
        assert_eq!(ctx.delivered, vec![MessageId::INVALID]);

        assert_eq!(MessageIdentityResolver::cancel_all(&mut ctx), 1);
        assert_eq!(ctx.delivered.len(), 2);
        assert!(!ctx.delivered[1].is_valid());
        assert_eq!(ctx.identities.pending_count(), 0);
    }
}
