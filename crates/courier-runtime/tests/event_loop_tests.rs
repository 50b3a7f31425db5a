//! Integration tests for the event loop
//!
//! Each test runs a real `EventLoop` on its own task against the scripted
//! client from `courier-harness`, feeding inbound objects from the test and
//! inspecting the requests the loop transmitted.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{
    AuthorizationState, BotConfig, ChatId, ClientError, InputMessageContent, MessageId,
    OutboundRequest, Payload, Request, RestartPolicy,
};
use courier_harness::{
    fixtures, ManualTimeSource, ScriptHandle, ScriptedFactory, SimulatedServer, FIRST_DURABLE_ID,
};
use courier_runtime::{BotHandle, CourierError, EventLoop};
use tokio::time::timeout;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(3);

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn create_test_config() -> BotConfig {
    let mut config = BotConfig::new("12345", "0123456789abcdef", "123456:ABCDEF");
    config.runtime.poll_timeout_ms = 20;
    config
}

fn create_test_loop(config: BotConfig, script: &ScriptHandle) -> EventLoop<ScriptedFactory> {
    EventLoop::new(config, script.factory()).expect("valid test config")
}

fn sent_text(outbound: &OutboundRequest) -> Option<&str> {
    match &outbound.request {
        Request::SendMessage {
            input_message_content: InputMessageContent::Text { text },
            ..
        } => Some(&text.text),
        _ => None,
    }
}

fn count_kind(script: &ScriptHandle, kind: &str) -> usize {
    script
        .sent()
        .iter()
        .filter(|o| o.request.kind() == kind)
        .count()
}

async fn wait_until<F>(handle: &BotHandle, predicate: F)
where
    F: Fn(&courier_runtime::BotStats) -> bool,
{
    timeout(WAIT, async {
        loop {
            let stats = handle.status().await.expect("loop running");
            if predicate(&stats) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached within timeout");
}

/// Start a loop backed by the simulated server and wait for authorization
async fn start_authorized(config: BotConfig) -> (EventLoop<ScriptedFactory>, BotHandle, ScriptHandle) {
    let script = ScriptHandle::new();
    SimulatedServer::new().install(&script);
    let mut event_loop = create_test_loop(config, &script);
    let handle = event_loop.start().expect("loop starts");
    wait_until(&handle, |stats| stats.authorized).await;
    (event_loop, handle, script)
}

// ----------------------------------------------------------------------------
// Bring-up and Correlation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_handshake_reaches_ready() {
    let (mut event_loop, handle, script) = start_authorized(create_test_config()).await;

    let kinds: Vec<_> = script.sent().iter().map(|o| o.request.kind()).collect();
    assert_eq!(kinds[0], "setTdlibParameters");
    assert!(kinds.contains(&"checkAuthenticationBotToken"));

    let stats = handle.status().await.unwrap();
    assert_eq!(stats.auth_state, "Ready");
    assert_eq!(stats.restarts, 0);

    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_call_receives_its_own_response() {
    let (mut event_loop, handle, _script) = start_authorized(create_test_config()).await;

    let response = timeout(WAIT, handle.call(Request::send_text(ChatId(5), "hi")))
        .await
        .expect("response within timeout")
        .expect("loop running");
    let Ok(Payload::Message(message)) = &response else {
        panic!("expected message response, got {response:?}");
    };
    assert_eq!(message.chat_id, ChatId(5));

    let stats = handle.status().await.unwrap();
    assert_eq!(stats.pending_requests, 0);
    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_request_ids_strictly_increase_on_the_wire() {
    let (mut event_loop, handle, script) = start_authorized(create_test_config()).await;
    for i in 0..5 {
        handle.send_text(ChatId(1), format!("m{i}")).await.unwrap();
    }
    wait_until(&handle, |stats| stats.pending_requests == 0).await;

    let ids: Vec<_> = script.sent().iter().map(|o| o.id.value()).collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_ok!(event_loop.stop().await);
}

// ----------------------------------------------------------------------------
// Messages and Access
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_text_message_gets_typing_and_echo() {
    let (mut event_loop, _handle, script) = start_authorized(create_test_config()).await;

    script.push(fixtures::new_message(fixtures::text_message(77, 5, 10, "hello")));
    let reply = script
        .wait_for_sent(WAIT, |o| sent_text(o) == Some("You said: hello"))
        .await;
    assert!(reply.is_some());
    assert_eq!(count_kind(&script, "sendChatAction"), 1);

    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_denied_sender_gets_rejection_notice() {
    let mut config = create_test_config();
    config.allowed_users = Some("1, 2".to_string());
    let (mut event_loop, handle, script) = start_authorized(config).await;

    script.push(fixtures::new_message(fixtures::text_message(77, 5, 10, "hello")));
    script.push(fixtures::new_message(fixtures::channel_post(-100, 11, "news")));
    let notice = script
        .wait_for_sent(WAIT, |o| sent_text(o) == Some(courier_core::NOT_AUTHORIZED_NOTICE))
        .await;
    assert!(notice.is_some());

    wait_until(&handle, |stats| stats.denied_senders == 2).await;
    assert_eq!(count_kind(&script, "sendChatAction"), 0);
    assert_ok!(event_loop.stop().await);
}

// ----------------------------------------------------------------------------
// Restart Orchestration
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_closed_state_restarts_and_flushes_pending() {
    let script = ScriptHandle::new();
    let mut event_loop = create_test_loop(create_test_config(), &script);
    let handle = event_loop.start().unwrap();

    let caller = handle.clone();
    let pending = tokio::spawn(async move { caller.call(Request::Close).await });
    script
        .wait_for_sent(WAIT, |o| o.request == Request::Close)
        .await
        .expect("close transmitted");
    let before_restart = script.sent().last().map(|o| o.id).unwrap();

    script.push(fixtures::auth_update(AuthorizationState::Closed));

    let result = timeout(WAIT, pending).await.expect("flushed in time").unwrap();
    assert_eq!(result.unwrap(), Err(ClientError::restarted()));
    assert_eq!(script.clients_created(), 2);

    // Handshake starts over on the new handle; ids keep counting.
    wait_until(&handle, |stats| stats.restarts == 1).await;
    let resent = script
        .wait_for_sent(WAIT, |o| o.id > before_restart && o.request.kind() == "setTdlibParameters")
        .await;
    assert!(resent.is_some());
    assert_eq!(count_kind(&script, "setTdlibParameters"), 2);

    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_unauthenticated_error_forces_restart() {
    let (mut event_loop, handle, script) = start_authorized(create_test_config()).await;

    script.push(fixtures::error_update(401, "Unauthorized"));
    wait_until(&handle, |stats| stats.restarts == 1).await;
    assert_eq!(script.clients_created(), 2);

    // The simulated server walks the new handle through the handshake again.
    wait_until(&handle, |stats| stats.authorized).await;
    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_unauthenticated_reply_to_own_request_forces_restart() {
    let script = ScriptHandle::new();
    let mut event_loop = create_test_loop(create_test_config(), &script);
    let handle = event_loop.start().unwrap();

    script.push(fixtures::new_message(fixtures::text_message(77, 5, 10, "hello")));
    let reply = script
        .wait_for_sent(WAIT, |o| sent_text(o) == Some("You said: hello"))
        .await
        .expect("reply transmitted");

    script.push(fixtures::error_response(reply.id, 401, "Unauthorized"));
    wait_until(&handle, |stats| stats.restarts == 1).await;
    assert_eq!(script.clients_created(), 2);

    let stats = handle.status().await.unwrap();
    assert_eq!(stats.pending_requests, 0);
    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_generic_error_is_ignored() {
    let (mut event_loop, handle, script) = start_authorized(create_test_config()).await;

    script.push(fixtures::error_update(429, "Too Many Requests"));
    assert!(script.wait_until_drained(WAIT).await);
    let stats = handle.status().await.unwrap();
    assert_eq!(stats.restarts, 0);
    assert!(stats.authorized);
    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_restart_command_rebuilds_client() {
    let (mut event_loop, handle, script) = start_authorized(create_test_config()).await;
    handle.request_restart().await.unwrap();
    wait_until(&handle, |stats| stats.restarts == 1 && stats.authorized).await;
    assert_eq!(script.clients_created(), 2);
    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_preserve_policy_leaves_handlers_until_stop() {
    let mut config = create_test_config();
    config.runtime.restart_policy = RestartPolicy::Preserve;
    let script = ScriptHandle::new();
    let mut event_loop = create_test_loop(config, &script);
    let handle = event_loop.start().unwrap();

    let caller = handle.clone();
    let pending = tokio::spawn(async move { caller.call(Request::Close).await });
    script
        .wait_for_sent(WAIT, |o| o.request == Request::Close)
        .await
        .expect("close transmitted");

    script.push(fixtures::auth_update(AuthorizationState::Closed));
    wait_until(&handle, |stats| stats.restarts == 1).await;
    assert_eq!(handle.status().await.unwrap().pending_requests, 1);

    // Shutdown drops the handler without calling it.
    drop(handle);
    assert_ok!(event_loop.stop().await);
    let result = timeout(WAIT, pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(CourierError::Channel { .. })));
}

// ----------------------------------------------------------------------------
// File Transfers
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_file_transfer_reports_bucket_changes_and_completes() {
    let clock = ManualTimeSource::starting_at(1_000);
    let script = ScriptHandle::new();
    SimulatedServer::new().install(&script);
    let mut event_loop =
        create_test_loop(create_test_config(), &script).with_time_source(Arc::new(clock.clone()));
    let handle = event_loop.start().unwrap();
    wait_until(&handle, |stats| stats.authorized).await;

    script.push(fixtures::new_message(fixtures::document_message(
        77, 5, 10, 3, "report.pdf", 1000,
    )));
    script
        .wait_for_sent(WAIT, |o| matches!(o.request, Request::DownloadFile { .. }))
        .await
        .expect("download requested after durable id");

    for downloaded in [250, 260, 300] {
        script.push(fixtures::file_update(3, downloaded, 1000, false, ""));
    }
    let last_edit = script
        .wait_for_sent(WAIT, |o| match &o.request {
            Request::EditMessageText {
                input_message_content: InputMessageContent::Text { text },
                ..
            } => text.text.contains("30% (300/1000 bytes)"),
            _ => false,
        })
        .await
        .expect("bucket 30 reported");
    let Request::EditMessageText { message_id, .. } = last_edit.request else {
        unreachable!();
    };
    assert_eq!(message_id, MessageId(FIRST_DURABLE_ID));
    assert_eq!(count_kind(&script, "editMessageText"), 2);

    clock.advance(65_000);
    script.push(fixtures::file_update(3, 1000, 1000, true, "/files/report.pdf"));
    let notice = script
        .wait_for_sent(WAIT, |o| {
            sent_text(o).is_some_and(|text| text.starts_with("Downloaded report.pdf"))
        })
        .await
        .expect("completion notice sent");
    let text = sent_text(&notice).unwrap();
    assert!(text.contains("in 1:05"));
    assert!(text.ends_with("/files/report.pdf"));

    // Late samples for the finished file change nothing.
    script.push(fixtures::file_update(3, 1000, 1000, false, ""));
    assert!(script.wait_until_drained(WAIT).await);
    wait_until(&handle, |stats| stats.active_transfers == 0).await;
    assert_eq!(count_kind(&script, "editMessageText"), 2);

    assert_ok!(event_loop.stop().await);
}

#[tokio::test]
async fn test_failed_progress_message_drops_transfer() {
    let (mut event_loop, handle, script) = start_authorized(create_test_config()).await;
    // Replace the server: acknowledge, then report the send as failed.
    script.set_auto_reply(|outbound| match outbound.request {
        Request::SendMessage { chat_id, .. } => vec![
            courier_core::Incoming::response(
                outbound.id,
                Payload::Message(fixtures::text_message(chat_id.0, 1, 42, "")),
            ),
            fixtures::send_failed(42, 400, "Bad Request: chat not found"),
        ],
        _ => vec![courier_core::Incoming::response(outbound.id, Payload::Ok)],
    });

    script.push(fixtures::new_message(fixtures::document_message(
        77, 5, 10, 3, "report.pdf", 1000,
    )));
    script
        .wait_for_sent(WAIT, |o| sent_text(o) == Some("Downloading report.pdf..."))
        .await
        .expect("progress message sent");
    assert!(script.wait_until_drained(WAIT).await);
    wait_until(&handle, |stats| {
        stats.active_transfers == 0 && stats.pending_identities == 0
    })
    .await;
    assert_eq!(count_kind(&script, "downloadFile"), 0);

    assert_ok!(event_loop.stop().await);
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_stop_joins_driver_and_closes_handle() {
    let script = ScriptHandle::new();
    let mut event_loop = create_test_loop(create_test_config(), &script);
    let handle = event_loop.start().unwrap();
    assert!(event_loop.is_running());
    assert!(event_loop.start().is_err());

    assert_ok!(timeout(WAIT, event_loop.stop()).await.expect("stop joins promptly"));
    assert!(!event_loop.is_running());
    assert!(handle.status().await.is_err());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let script = ScriptHandle::new();
    let mut config = create_test_config();
    config.credentials.api_id = "not-a-number".to_string();
    assert!(EventLoop::new(config, script.factory()).is_err());
}
