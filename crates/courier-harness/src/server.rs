//! Simulated client backend
//!
//! Answers transmitted requests the way the real client does: the handshake
//! advances the authorization state, sent messages are acknowledged with a
//! provisional id and later confirmed with a durable one.

use courier_core::{
    AuthorizationState, ChatId, InputMessageContent, Incoming, Message, MessageContent, MessageId,
    MessageSender, OutboundRequest, Payload, Request, UserId,
};

use crate::client::ScriptHandle;
use crate::fixtures::auth_update;

/// First durable id handed out; provisional ids count up from 1
pub const FIRST_DURABLE_ID: i64 = 1_048_576;

#[derive(Debug, Clone)]
pub struct SimulatedServer {
    bot_user: UserId,
    next_provisional: i64,
    next_durable: i64,
}

impl SimulatedServer {
    pub fn new() -> Self {
        Self {
            bot_user: UserId(1),
            next_provisional: 1,
            next_durable: FIRST_DURABLE_ID,
        }
    }

    /// Answer every request sent through `handle`'s clients
    pub fn install(mut self, handle: &ScriptHandle) {
        handle.set_auto_reply(move |outbound| self.reply(outbound));
    }

    pub fn reply(&mut self, outbound: &OutboundRequest) -> Vec<Incoming> {
        let id = outbound.id;
        match &outbound.request {
            Request::SetParameters(_) => vec![
                Incoming::response(id, Payload::Ok),
                auth_update(AuthorizationState::NeedToken),
            ],
            Request::CheckBotToken { .. } => vec![
                Incoming::response(id, Payload::Ok),
                auth_update(AuthorizationState::Ready),
            ],
            Request::SendMessage {
                chat_id,
                input_message_content,
            } => {
                let provisional = MessageId(self.next_provisional);
                let durable = MessageId(self.next_durable);
                self.next_provisional += 1;
                self.next_durable += 1;

                let pending = self.message(provisional, *chat_id, input_message_content);
                let confirmed = self.message(durable, *chat_id, input_message_content);
                vec![
                    Incoming::response(id, Payload::Message(pending)),
                    Incoming::update(Payload::MessageSendSucceeded {
                        message: confirmed,
                        old_message_id: provisional,
                    }),
                ]
            }
            Request::EditMessageText {
                chat_id,
                message_id,
                input_message_content,
            } => vec![Incoming::response(
                id,
                Payload::Message(self.message(*message_id, *chat_id, input_message_content)),
            )],
            Request::SendChatAction { .. } | Request::DownloadFile { .. } => {
                vec![Incoming::response(id, Payload::Ok)]
            }
            Request::Close => vec![
                Incoming::response(id, Payload::Ok),
                auth_update(AuthorizationState::Closed),
            ],
        }
    }

    fn message(&self, id: MessageId, chat_id: ChatId, content: &InputMessageContent) -> Message {
        let InputMessageContent::Text { text } = content;
        Message {
            id,
            chat_id,
            sender: MessageSender::User {
                user_id: self.bot_user,
            },
            content: MessageContent::Text { text: text.clone() },
        }
    }
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new()
    }
}
