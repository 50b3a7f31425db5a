//! Bot message handling
//!
//! New messages pass the access gate first. Text goes to the responder;
//! documents, audio and video start a tracked download whose progress is
//! reported by editing a single status message.

use tracing::{debug, info, warn};

use courier_core::{
    Attachment, ChatAction, ClientError, FileId, FileMeta, FileProgress, Message, MessageId,
    Payload, Request, TransferDecision, NOT_AUTHORIZED_NOTICE,
};

use crate::context::BotContext;
use crate::responder::InboundText;

/// Priority for downloads started on behalf of a user
const DOWNLOAD_PRIORITY: i32 = 1;

// ----------------------------------------------------------------------------
// New Messages
// ----------------------------------------------------------------------------

pub fn on_new_message(ctx: &mut BotContext, message: Message) {
    let user_id = message.sender.user_id();
    if !ctx.gate.is_allowed(user_id) {
        // Chats and channels have nobody to notify.
        if user_id.is_user() {
            ctx.send_logged(Request::send_text(message.chat_id, NOT_AUTHORIZED_NOTICE));
        }
        return;
    }

    if let Some(text) = message.content.text() {
        reply_to_text(ctx, &message, text);
    } else if let Some(attachment) = message.content.attachment() {
        start_transfer(ctx, &message, attachment);
    } else {
        debug!(
            chat_id = message.chat_id.0,
            message_id = message.id.0,
            "ignoring message without text or file"
        );
    }
}

fn reply_to_text(ctx: &mut BotContext, message: &Message, text: &str) {
    if text.trim().is_empty() {
        debug!(chat_id = message.chat_id.0, "ignoring empty text");
        return;
    }
    info!(
        chat_id = message.chat_id.0,
        message_id = message.id.0,
        "text message received"
    );

    ctx.send(Request::SendChatAction {
        chat_id: message.chat_id,
        action: ChatAction::Typing,
    });

    let stats = ctx.stats();
    let inbound = InboundText {
        chat_id: message.chat_id,
        user_id: message.sender.user_id(),
        text,
    };
    if let Some(reply) = ctx.responder.respond(inbound, &stats) {
        ctx.send_logged(Request::send_text(message.chat_id, reply));
    }
}

// ----------------------------------------------------------------------------
// File Intake
// ----------------------------------------------------------------------------

fn start_transfer(ctx: &mut BotContext, message: &Message, attachment: &Attachment) {
    let file_id = attachment.file.id;
    if ctx.transfers.session(file_id).is_some() {
        debug!(file_id = file_id.0, "file already being transferred");
        return;
    }

    let meta = FileMeta::from_attachment(attachment);
    info!(
        file_id = file_id.0,
        chat_id = message.chat_id.0,
        name = %meta.name,
        size = meta.size_bytes,
        "starting file transfer"
    );

    let now = ctx.now();
    let display_text = ctx
        .transfers
        .begin(file_id, message.chat_id, meta, now)
        .display_text
        .clone();

    ctx.send_with(
        Request::send_text(message.chat_id, display_text),
        move |ctx: &mut BotContext, result| on_progress_message_sent(ctx, file_id, result),
    );
}

/// The initial progress message was acknowledged with a provisional id
fn on_progress_message_sent(
    ctx: &mut BotContext,
    file_id: FileId,
    result: Result<Payload, ClientError>,
) {
    match result {
        Ok(Payload::Message(message)) => {
            let registered = ctx
                .identities
                .await_with(message.id, move |ctx: &mut BotContext, durable| {
                    on_progress_message_durable(ctx, file_id, durable)
                });
            if !registered {
                ctx.transfers.evict(file_id);
            }
        }
        Ok(other) => {
            warn!(file_id = file_id.0, kind = other.kind(), "unexpected reply to progress message");
            ctx.transfers.evict(file_id);
        }
        Err(error) => {
            warn!(
                file_id = file_id.0,
                code = error.code,
                message = %error.message,
                "progress message could not be sent"
            );
            ctx.transfers.evict(file_id);
        }
    }
}

/// The progress message has its durable id; edits can start
fn on_progress_message_durable(ctx: &mut BotContext, file_id: FileId, durable: MessageId) {
    if !durable.is_valid() {
        warn!(file_id = file_id.0, "progress message was never delivered, dropping transfer");
        ctx.transfers.evict(file_id);
        return;
    }
    if !ctx.transfers.attach_progress_message(file_id, durable) {
        debug!(file_id = file_id.0, "transfer session gone before progress message resolved");
        return;
    }

    debug!(file_id = file_id.0, message_id = durable.0, "requesting download");
    ctx.send_logged(Request::DownloadFile {
        file_id,
        priority: DOWNLOAD_PRIORITY,
    });
}

// ----------------------------------------------------------------------------
// File Progress
// ----------------------------------------------------------------------------

pub fn on_file_update(ctx: &mut BotContext, progress: FileProgress) {
    let now = ctx.now();
    match ctx.transfers.on_file_update(&progress, now) {
        TransferDecision::Report(report) => {
            debug!(file_id = progress.file_id.0, bucket = report.bucket, "reporting progress");
            // A failed edit is retried by the next bucket change.
            ctx.send_logged(Request::edit_text(report.chat_id, report.message_id, report.text));
        }
        TransferDecision::Completed(completion) => {
            ctx.send_logged(Request::send_text(completion.chat_id, completion.text));
        }
        TransferDecision::Suppressed { .. }
        | TransferDecision::AwaitingProgressMessage
        | TransferDecision::UnknownTotal
        | TransferDecision::NoSession => {}
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
