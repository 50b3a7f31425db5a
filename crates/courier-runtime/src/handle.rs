//! Cross-task access to a running bot
//!
//! Producers outside the event loop never touch its tables. They send
//! [`Command`]s over a bounded channel; the loop drains the channel once per
//! iteration and answers over oneshot channels.

use tokio::sync::{mpsc, oneshot};

use courier_core::{ChatId, ClientError, CourierError, CourierResult, Payload, Request, RequestId};

use crate::context::BotStats;

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

/// Requests from producers to the event loop
#[derive(Debug)]
pub enum Command {
    /// Queue a request without waiting for its response
    Send {
        request: Request,
        reply: oneshot::Sender<RequestId>,
    },
    /// Queue a request and deliver its response
    Call {
        request: Request,
        reply: oneshot::Sender<Result<Payload, ClientError>>,
    },
    Status {
        reply: oneshot::Sender<BotStats>,
    },
    /// Tear the client handle down and rebuild it
    Restart,
}

pub fn create_command_channel(buffer_size: usize) -> (CommandSender, CommandReceiver) {
    mpsc::channel(buffer_size.max(1))
}

// ----------------------------------------------------------------------------
// Bot Handle
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BotHandle {
    sender: CommandSender,
}

impl BotHandle {
    pub fn new(sender: CommandSender) -> Self {
        Self { sender }
    }

    async fn submit(&self, command: Command) -> CourierResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| CourierError::channel_error("event loop is not running"))
    }

    /// Queue `request`; returns the id it was allocated
    pub async fn send(&self, request: Request) -> CourierResult<RequestId> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Send { request, reply }).await?;
        response
            .await
            .map_err(|_| CourierError::channel_error("event loop dropped the request"))
    }

    pub async fn send_text(&self, chat_id: ChatId, text: impl Into<String>) -> CourierResult<RequestId> {
        self.send(Request::send_text(chat_id, text)).await
    }

    /// Queue `request` and wait for its correlated response
    ///
    /// A correlated error comes back as `Ok(Err(_))`; the outer error means the
    /// loop stopped before answering.
    pub async fn call(&self, request: Request) -> CourierResult<Result<Payload, ClientError>> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Call { request, reply }).await?;
        response
            .await
            .map_err(|_| CourierError::channel_error("event loop stopped before the response"))
    }

    pub async fn status(&self) -> CourierResult<BotStats> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Status { reply }).await?;
        response
            .await
            .map_err(|_| CourierError::channel_error("event loop dropped the status request"))
    }

    pub async fn request_restart(&self) -> CourierResult<()> {
        self.submit(Command::Restart).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
