//! Reply generation for text messages
//!
//! The event loop does not interpret message text; it hands every admitted
//! text message to a [`Responder`] and sends back whatever reply it produces.

use courier_core::{ChatId, UserId};

use crate::context::BotStats;

/// A text message that passed the access gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundText<'a> {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: &'a str,
}

/// Produces the reply to a text message, if any
pub trait Responder: Send {
    fn respond(&mut self, message: InboundText<'_>, stats: &BotStats) -> Option<String>;
}

/// Default responder: a few fixed commands, echo for everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&mut self, message: InboundText<'_>, stats: &BotStats) -> Option<String> {
        let reply = match message.text.trim() {
            "/start" => "Hello! Send me text and I will echo it, or a file and I will fetch it.".to_string(),
            "/help" => "Commands:\n/start - Greeting\n/help - This help\n/status - Session status".to_string(),
            "/status" => format!(
                "Authorized: {} | restarts: {} | pending requests: {} | active transfers: {}",
                if stats.authorized { "yes" } else { "no" },
                stats.restarts,
                stats.pending_requests,
                stats.active_transfers
            ),
            _ => format!("You said: {}", message.text),
        };
        Some(reply)
    }
}

impl<F> Responder for F
where
    F: FnMut(InboundText<'_>, &BotStats) -> Option<String> + Send,
{
    fn respond(&mut self, message: InboundText<'_>, stats: &BotStats) -> Option<String> {
        self(message, stats)
    }
}
