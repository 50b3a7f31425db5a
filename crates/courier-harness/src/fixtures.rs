//! Builders for inbound client objects
//!
//! Shorthand for the events tests and transcripts feed into the engine.

use courier_core::{
    Attachment, AuthorizationState, ChatId, ClientError, FileId, FormattedText, Incoming, Message,
    MessageContent, MessageId, MessageSender, Payload, RemoteFile, RequestId, UserId,
};

pub fn auth_update(state: AuthorizationState) -> Incoming {
    Incoming::update(Payload::AuthorizationStateChanged {
        authorization_state: state,
    })
}

pub fn text_message(chat_id: i64, user_id: i64, message_id: i64, text: &str) -> Message {
    Message {
        id: MessageId(message_id),
        chat_id: ChatId(chat_id),
        sender: MessageSender::User {
            user_id: UserId(user_id),
        },
        content: MessageContent::Text {
            text: FormattedText::from(text),
        },
    }
}

/// A message posted on behalf of a chat or channel
pub fn channel_post(chat_id: i64, message_id: i64, text: &str) -> Message {
    Message {
        id: MessageId(message_id),
        chat_id: ChatId(chat_id),
        sender: MessageSender::Chat {
            chat_id: ChatId(chat_id),
        },
        content: MessageContent::Text {
            text: FormattedText::from(text),
        },
    }
}

pub fn document_message(
    chat_id: i64,
    user_id: i64,
    message_id: i64,
    file_id: i32,
    file_name: &str,
    size: i64,
) -> Message {
    Message {
        id: MessageId(message_id),
        chat_id: ChatId(chat_id),
        sender: MessageSender::User {
            user_id: UserId(user_id),
        },
        content: MessageContent::Document {
            document: Attachment {
                file_name: file_name.to_string(),
                mime_type: "application/octet-stream".to_string(),
                file: RemoteFile {
                    id: FileId(file_id),
                    size,
                },
            },
        },
    }
}

pub fn new_message(message: Message) -> Incoming {
    Incoming::update(Payload::NewMessage { message })
}

pub fn send_succeeded(chat_id: i64, provisional: i64, durable: i64) -> Incoming {
    let mut message = text_message(chat_id, 0, durable, "");
    message.sender = MessageSender::Chat {
        chat_id: ChatId(chat_id),
    };
    Incoming::update(Payload::MessageSendSucceeded {
        message,
        old_message_id: MessageId(provisional),
    })
}

pub fn send_failed(provisional: i64, code: i32, message: &str) -> Incoming {
    Incoming::update(Payload::MessageSendFailed {
        old_message_id: MessageId(provisional),
        error: ClientError::new(code, message),
    })
}

pub fn file_update(
    file_id: i32,
    downloaded: i64,
    total: i64,
    is_complete: bool,
    local_path: &str,
) -> Incoming {
    Incoming::update(Payload::FileUpdated {
        file_id: FileId(file_id),
        downloaded_size: downloaded,
        total_size: total,
        is_complete,
        local_path: local_path.to_string(),
    })
}

/// Correlated error response
pub fn error_response(id: RequestId, code: i32, message: &str) -> Incoming {
    Incoming::response(id, Payload::Error(ClientError::new(code, message)))
}

/// Uncorrelated error event
pub fn error_update(code: i32, message: &str) -> Incoming {
    Incoming::update(Payload::Error(ClientError::new(code, message)))
}
