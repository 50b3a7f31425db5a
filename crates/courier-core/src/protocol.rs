//! Wire model of the messaging client boundary
//!
//! Requests flow out with a caller-chosen [`RequestId`] attached as `@extra`;
//! responses and push updates flow back as [`Incoming`] objects. Both sides use
//! the client's JSON shape (`@type` discriminator, snake_case fields) so that
//! transcripts can be recorded and replayed verbatim.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, FileId, MessageId, RequestId, UserId};

// ----------------------------------------------------------------------------
// Outbound Requests
// ----------------------------------------------------------------------------

/// Connection parameters sent while the client waits for them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub api_id: i32,
    pub api_hash: String,
    pub database_directory: String,
    pub files_directory: String,
    pub device_model: String,
    pub application_version: String,
    pub system_language_code: String,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
}

/// Plain text with optional formatting entities (entities are not modelled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedText {
    pub text: String,
}

impl From<&str> for FormattedText {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// Content of an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum InputMessageContent {
    #[serde(rename = "inputMessageText")]
    Text { text: FormattedText },
}

/// Chat action shown to the peer while the bot works
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ChatAction {
    #[serde(rename = "chatActionTyping")]
    Typing,
}

/// Requests understood by the messaging client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Request {
    #[serde(rename = "setTdlibParameters")]
    SetParameters(ConnectionParameters),
    #[serde(rename = "checkAuthenticationBotToken")]
    CheckBotToken { token: String },
    #[serde(rename = "sendMessage")]
    SendMessage {
        chat_id: ChatId,
        input_message_content: InputMessageContent,
    },
    #[serde(rename = "editMessageText")]
    EditMessageText {
        chat_id: ChatId,
        message_id: MessageId,
        input_message_content: InputMessageContent,
    },
    #[serde(rename = "sendChatAction")]
    SendChatAction { chat_id: ChatId, action: ChatAction },
    #[serde(rename = "downloadFile")]
    DownloadFile { file_id: FileId, priority: i32 },
    #[serde(rename = "close")]
    Close,
}

impl Request {
    /// Build a plain text message request
    pub fn send_text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Request::SendMessage {
            chat_id,
            input_message_content: InputMessageContent::Text {
                text: FormattedText { text: text.into() },
            },
        }
    }

    /// Build a request replacing the text of an existing message
    pub fn edit_text(chat_id: ChatId, message_id: MessageId, text: impl Into<String>) -> Self {
        Request::EditMessageText {
            chat_id,
            message_id,
            input_message_content: InputMessageContent::Text {
                text: FormattedText { text: text.into() },
            },
        }
    }

    /// Wire name of the request, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Request::SetParameters(_) => "setTdlibParameters",
            Request::CheckBotToken { .. } => "checkAuthenticationBotToken",
            Request::SendMessage { .. } => "sendMessage",
            Request::EditMessageText { .. } => "editMessageText",
            Request::SendChatAction { .. } => "sendChatAction",
            Request::DownloadFile { .. } => "downloadFile",
            Request::Close => "close",
        }
    }
}

/// A request paired with the id it was allocated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    #[serde(rename = "@extra")]
    pub id: RequestId,
    #[serde(flatten)]
    pub request: Request,
}

// ----------------------------------------------------------------------------
// Authorization State
// ----------------------------------------------------------------------------

/// Connection/authorization state announced by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAuthorizationState", into = "RawAuthorizationState")]
pub enum AuthorizationState {
    NeedParameters,
    NeedToken,
    Ready,
    LoggingOut,
    Closed,
    /// Any state this engine does not act on, kept by wire name
    Unknown(String),
}

impl AuthorizationState {
    /// Short name for logging
    pub fn name(&self) -> &str {
        match self {
            AuthorizationState::NeedParameters => "NeedParameters",
            AuthorizationState::NeedToken => "NeedToken",
            AuthorizationState::Ready => "Ready",
            AuthorizationState::LoggingOut => "LoggingOut",
            AuthorizationState::Closed => "Closed",
            AuthorizationState::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAuthorizationState {
    #[serde(rename = "@type")]
    kind: String,
}

const STATE_WAIT_PARAMETERS: &str = "authorizationStateWaitTdlibParameters";
const STATE_WAIT_TOKEN: &str = "authorizationStateWaitPhoneNumber";
const STATE_READY: &str = "authorizationStateReady";
const STATE_LOGGING_OUT: &str = "authorizationStateLoggingOut";
const STATE_CLOSED: &str = "authorizationStateClosed";

impl From<RawAuthorizationState> for AuthorizationState {
    fn from(raw: RawAuthorizationState) -> Self {
        match raw.kind.as_str() {
            STATE_WAIT_PARAMETERS => AuthorizationState::NeedParameters,
            STATE_WAIT_TOKEN => AuthorizationState::NeedToken,
            STATE_READY => AuthorizationState::Ready,
            STATE_LOGGING_OUT => AuthorizationState::LoggingOut,
            STATE_CLOSED => AuthorizationState::Closed,
            _ => AuthorizationState::Unknown(raw.kind),
        }
    }
}

impl From<AuthorizationState> for RawAuthorizationState {
    fn from(state: AuthorizationState) -> Self {
        let kind = match state {
            AuthorizationState::NeedParameters => STATE_WAIT_PARAMETERS.to_string(),
            AuthorizationState::NeedToken => STATE_WAIT_TOKEN.to_string(),
            AuthorizationState::Ready => STATE_READY.to_string(),
            AuthorizationState::LoggingOut => STATE_LOGGING_OUT.to_string(),
            AuthorizationState::Closed => STATE_CLOSED.to_string(),
            AuthorizationState::Unknown(kind) => kind,
        };
        Self { kind }
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MessageSender {
    #[serde(rename = "messageSenderUser")]
    User { user_id: UserId },
    #[serde(rename = "messageSenderChat")]
    Chat { chat_id: ChatId },
}

impl MessageSender {
    /// User id of the sender, or [`UserId::NON_USER`] for chats and channels
    pub fn user_id(&self) -> UserId {
        match self {
            MessageSender::User { user_id } => *user_id,
            MessageSender::Chat { .. } => UserId::NON_USER,
        }
    }
}

/// Remote file reference attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: FileId,
    /// Size in bytes, 0 when unknown
    #[serde(default)]
    pub size: i64,
}

/// A file-bearing attachment (document, audio, video)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub mime_type: String,
    pub file: RemoteFile,
}

/// Content of a received message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MessageContent {
    #[serde(rename = "messageText")]
    Text { text: FormattedText },
    #[serde(rename = "messageDocument")]
    Document { document: Attachment },
    #[serde(rename = "messageAudio")]
    Audio { audio: Attachment },
    #[serde(rename = "messageVideo")]
    Video { video: Attachment },
    #[serde(other)]
    Unsupported,
}

impl MessageContent {
    /// Text of a text message
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(&text.text),
            _ => None,
        }
    }

    /// File attachment, if this content carries a transferable file
    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            MessageContent::Document { document } => Some(document),
            MessageContent::Audio { audio } => Some(audio),
            MessageContent::Video { video } => Some(video),
            MessageContent::Text { .. } | MessageContent::Unsupported => None,
        }
    }
}

/// A message as reported by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    #[serde(rename = "sender_id")]
    pub sender: MessageSender,
    pub content: MessageContent,
}

// ----------------------------------------------------------------------------
// Errors Reported by the Client
// ----------------------------------------------------------------------------

/// Error object returned by the client, either correlated or free-standing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("client error {code}: {message}")]
pub struct ClientError {
    pub code: i32,
    pub message: String,
}

impl ClientError {
    /// Code signalling that the session is invalid and must be rebuilt
    pub const UNAUTHENTICATED: i32 = 401;
    /// Code used for handlers flushed by a client restart
    pub const RESTARTED: i32 = 503;
    /// Code used when the request never reached the client
    pub const TRANSMIT_FAILED: i32 = 500;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error delivered to handlers discarded by a client restart
    pub fn restarted() -> Self {
        Self::new(Self::RESTARTED, "client restarted")
    }

    pub fn transmit_failed(reason: impl Into<String>) -> Self {
        Self::new(Self::TRANSMIT_FAILED, reason)
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code == Self::UNAUTHENTICATED
    }
}

// ----------------------------------------------------------------------------
// Inbound Objects
// ----------------------------------------------------------------------------

/// Body of an object received from the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Payload {
    #[serde(rename = "updateAuthorizationState")]
    AuthorizationStateChanged {
        authorization_state: AuthorizationState,
    },
    #[serde(rename = "updateNewMessage")]
    NewMessage { message: Message },
    #[serde(rename = "updateMessageSendSucceeded")]
    MessageSendSucceeded {
        message: Message,
        old_message_id: MessageId,
    },
    #[serde(rename = "updateMessageSendFailed")]
    MessageSendFailed {
        old_message_id: MessageId,
        error: ClientError,
    },
    #[serde(rename = "updateFile")]
    FileUpdated {
        file_id: FileId,
        downloaded_size: i64,
        total_size: i64,
        is_complete: bool,
        #[serde(default)]
        local_path: String,
    },
    #[serde(rename = "message")]
    Message(Message),
    #[serde(rename = "error")]
    Error(ClientError),
    #[serde(rename = "ok")]
    Ok,
    #[serde(other)]
    Unsupported,
}

impl Payload {
    /// Wire name of the payload, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::AuthorizationStateChanged { .. } => "updateAuthorizationState",
            Payload::NewMessage { .. } => "updateNewMessage",
            Payload::MessageSendSucceeded { .. } => "updateMessageSendSucceeded",
            Payload::MessageSendFailed { .. } => "updateMessageSendFailed",
            Payload::FileUpdated { .. } => "updateFile",
            Payload::Message(_) => "message",
            Payload::Error(_) => "error",
            Payload::Ok => "ok",
            Payload::Unsupported => "unsupported",
        }
    }
}

/// An object received from the client, tagged with the request id it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incoming {
    #[serde(rename = "@extra", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Incoming {
    /// A push update not tied to any request
    pub fn update(payload: Payload) -> Self {
        Self {
            request_id: None,
            payload,
        }
    }

    /// A response to the request with the given id
    pub fn response(request_id: RequestId, payload: Payload) -> Self {
        Self {
            request_id: Some(request_id),
            payload,
        }
    }

    /// Convert the payload into a handler result
    pub fn into_result(self) -> Result<Payload, ClientError> {
        match self.payload {
            Payload::Error(error) => Err(error),
            other => Ok(other),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
