//! Inbound object dispatch
//!
//! Every object the client delivers goes through [`dispatch`]: a response
//! with a pending handler is handed to that handler; everything else is routed
//! by kind to the authorization state machine, the message handlers, the
//! identity resolver or the transfer tracker.

use tracing::{debug, error, trace, warn};

use courier_core::{
    AuthEffect, CourierError, FileProgress, Incoming, MessageIdentityResolver, Payload,
    RequestCorrelator,
};

use crate::context::BotContext;
use crate::handlers;

/// Route one inbound object
pub fn dispatch(ctx: &mut BotContext, incoming: Incoming) {
    ctx.events_processed += 1;

    match incoming.request_id {
        Some(id) if ctx.correlator.is_pending(id) => {
            trace!(request_id = id.value(), kind = incoming.payload.kind(), "resolving response");
            // An invalid session invalidates every request, not just this one.
            if let Payload::Error(error) = &incoming.payload {
                if error.is_unauthenticated() {
                    warn!(request_id = id.value(), "session unauthenticated, scheduling restart");
                    ctx.auth.force_restart();
                }
            }
            RequestCorrelator::resolve(ctx, id, incoming.into_result());
        }
        _ => dispatch_by_kind(ctx, incoming.payload),
    }
}

fn dispatch_by_kind(ctx: &mut BotContext, payload: Payload) {
    match payload {
        Payload::AuthorizationStateChanged {
            authorization_state,
        } => {
            let transition = ctx.auth.handle(authorization_state);
            debug!(
                from = transition.from.name(),
                to = transition.to.name(),
                "authorization state changed"
            );
            for effect in transition.effects {
                match effect {
                    AuthEffect::Send(request) => {
                        ctx.send(request);
                    }
                    // The loop checks the restart flag before its next poll.
                    AuthEffect::Restart => {}
                }
            }
        }
        Payload::NewMessage { message } => handlers::on_new_message(ctx, message),
        Payload::MessageSendSucceeded {
            message,
            old_message_id,
        } => {
            if !MessageIdentityResolver::on_send_succeeded(ctx, old_message_id, message.id) {
                trace!(temp_id = old_message_id.0, "no callback waiting on durable id");
            }
        }
        Payload::MessageSendFailed {
            old_message_id,
            error,
        } => {
            warn!(
                temp_id = old_message_id.0,
                code = error.code,
                message = %error.message,
                "message send failed"
            );
            MessageIdentityResolver::cancel(ctx, old_message_id);
        }
        Payload::FileUpdated {
            file_id,
            downloaded_size,
            total_size,
            is_complete,
            local_path,
        } => handlers::on_file_update(
            ctx,
            FileProgress {
                file_id,
                downloaded_bytes: downloaded_size,
                total_bytes: total_size,
                is_complete,
                local_path,
            },
        ),
        Payload::Error(client_error) => {
            let error = CourierError::from_client_error(client_error);
            if error.requires_restart() {
                warn!(%error, "session rejected, forcing client restart");
                ctx.auth.force_restart();
            } else {
                error!(%error, "client reported an error");
            }
        }
        Payload::Ok => trace!("acknowledgement discarded"),
        Payload::Message(message) => {
            let error = CourierError::protocol_mismatch("update", "message");
            debug!(%error, message_id = message.id.0, "dropping uncorrelated message object");
        }
        Payload::Unsupported => trace!("unsupported object ignored"),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use courier_core::{
        AuthorizationState, BotConfig, ChatId, ClientError, MessageId, Request, RequestId,
        SystemTimeSource,
    };

    fn create_test_context() -> BotContext {
        let config = BotConfig::new("12345", "0123456789abcdef", "123456:ABCDEF");
        BotContext::new(&config, Arc::new(SystemTimeSource)).unwrap()
    }

    fn auth(state: AuthorizationState) -> Incoming {
        Incoming::update(Payload::AuthorizationStateChanged {
            authorization_state: state,
        })
    }

    #[test]
    fn test_response_goes_to_handler_first() {
        let mut ctx = create_test_context();
        let id = ctx.send_with(Request::Close, |ctx: &mut BotContext, result| {
            assert_eq!(result, Ok(Payload::Ok));
            ctx.send(Request::Close);
        });
        ctx.correlator.drain_outbox();

        dispatch(&mut ctx, Incoming::response(id, Payload::Ok));
        assert_eq!(ctx.correlator.pending_count(), 0);
        assert_eq!(ctx.correlator.drain_outbox().len(), 1);

        // The same id again falls through to kind dispatch and is discarded.
        dispatch(&mut ctx, Incoming::response(id, Payload::Ok));
        assert!(ctx.correlator.drain_outbox().is_empty());
        assert_eq!(ctx.events_processed, 2);
    }

    #[test]
    fn test_correlated_unauthenticated_error_reaches_handler_and_restarts() {
        let mut ctx = create_test_context();
        let id = ctx.send_with(Request::Close, |ctx: &mut BotContext, result| {
            assert_eq!(result, Err(ClientError::new(401, "Unauthorized")));
            ctx.send(Request::Close);
        });
        ctx.correlator.drain_outbox();

        dispatch(
            &mut ctx,
            Incoming::response(id, Payload::Error(ClientError::new(401, "Unauthorized"))),
        );
        assert_eq!(ctx.correlator.pending_count(), 0);
        assert_eq!(ctx.correlator.drain_outbox().len(), 1);
        assert!(ctx.needs_restart());
    }

    #[test]
    fn test_correlated_error_without_auth_failure_keeps_session() {
        let mut ctx = create_test_context();
        let id = ctx.send_logged(Request::send_text(ChatId(5), "hi"));

        dispatch(
            &mut ctx,
            Incoming::response(id, Payload::Error(ClientError::new(400, "Bad Request"))),
        );
        assert_eq!(ctx.correlator.pending_count(), 0);
        assert!(!ctx.needs_restart());
    }

    #[test]
    fn test_uncorrelated_unauthenticated_error_forces_restart() {
        let mut ctx = create_test_context();
        dispatch(&mut ctx, Incoming::update(Payload::Error(ClientError::new(400, "Bad"))));
        assert!(!ctx.needs_restart());

        dispatch(
            &mut ctx,
            Incoming::response(RequestId::new(99), Payload::Error(ClientError::new(401, "x"))),
        );
        assert!(ctx.needs_restart());
    }

    #[test]
    fn test_handshake_sequence() {
        let mut ctx = create_test_context();
        dispatch(&mut ctx, auth(AuthorizationState::NeedParameters));
        dispatch(&mut ctx, auth(AuthorizationState::NeedToken));
        dispatch(&mut ctx, auth(AuthorizationState::Ready));

        let sent: Vec<_> = ctx
            .correlator
            .drain_outbox()
            .into_iter()
            .map(|o| o.request.kind())
            .collect();
        assert_eq!(sent, vec!["setTdlibParameters", "checkAuthenticationBotToken"]);
        assert!(ctx.stats().authorized);

        dispatch(&mut ctx, auth(AuthorizationState::Closed));
        assert!(ctx.needs_restart());
        assert!(!ctx.stats().authorized);
    }

    #[test]
    fn test_send_failed_cancels_registration() {
        let mut ctx = create_test_context();
        ctx.identities
            .await_with(MessageId(3), |_, real| assert_eq!(real, MessageId::INVALID));

        dispatch(
            &mut ctx,
            Incoming::update(Payload::MessageSendFailed {
                old_message_id: MessageId(3),
                error: ClientError::new(400, "Chat not found"),
            }),
        );
        assert_eq!(ctx.identities.pending_count(), 0);
        assert_eq!(ctx.identities.counts(), (0, 1));
    }
}
