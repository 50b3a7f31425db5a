//! Command handlers for the Courier CLI

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use courier_core::{BotConfig, Incoming, OutboundRequest};
use courier_harness::{ScriptHandle, SimulatedServer};
use courier_runtime::{BotStats, EventLoop};

use crate::cli::Commands;
use crate::config;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the effective configuration
    pub async fn execute(command: Commands, config: BotConfig) -> Result<()> {
        match command {
            Commands::Replay {
                transcript,
                simulate,
                settle_secs,
            } => {
                Self::handle_replay_command(config, &transcript, simulate, settle_secs).await
            }
            Commands::Config => Self::handle_config_command(&config),
            Commands::Check => Self::handle_check_command(&config),
        }
    }

    async fn handle_replay_command(
        config: BotConfig,
        transcript: &Path,
        simulate: bool,
        settle_secs: u64,
    ) -> Result<()> {
        let text = std::fs::read_to_string(transcript)
            .with_context(|| format!("cannot read transcript {}", transcript.display()))?;
        let events = parse_transcript(&text)?;
        info!(
            events = events.len(),
            simulate,
            "Replaying transcript {}",
            transcript.display()
        );

        let report = replay(config, events, simulate, Duration::from_secs(settle_secs)).await?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for outbound in &report.sent {
            writeln!(out, "{}", serde_json::to_string(outbound)?)?;
        }
        writeln!(out, "{}", serde_json::to_string_pretty(&report.stats)?)?;
        Ok(())
    }

    fn handle_config_command(config: &BotConfig) -> Result<()> {
        print!("{}", config::render(config)?);
        Ok(())
    }

    fn handle_check_command(config: &BotConfig) -> Result<()> {
        config.validate()?;
        println!("configuration ok");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Replay
// ----------------------------------------------------------------------------

/// Everything the engine transmitted during a replay, and its final state
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub sent: Vec<OutboundRequest>,
    pub stats: BotStats,
}

/// Parse one inbound object per line; blank lines and `#` comments are skipped
pub fn parse_transcript(text: &str) -> Result<Vec<Incoming>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| CliError::Transcript {
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Run a loop over the scripted client until every event has been handled
///
/// With `simulate` the scripted client answers requests the way a live
/// backend would, so a transcript only needs to carry the user-side events.
pub async fn replay(
    config: BotConfig,
    events: Vec<Incoming>,
    simulate: bool,
    settle: Duration,
) -> Result<ReplayReport> {
    let script = ScriptHandle::new();
    if simulate {
        SimulatedServer::new().install(&script);
    }

    let mut event_loop = EventLoop::new(config, script.factory())?;
    let handle = event_loop.start()?;
    for incoming in events {
        script.push(incoming);
    }

    // Simulated answers refill the queue, so settle until a status round
    // trip leaves it empty.
    let deadline = Instant::now() + settle;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !script.wait_until_drained(remaining).await {
            warn!(
                pending = script.pending_inbound(),
                "transcript not fully consumed before the settle timeout"
            );
            break;
        }
        handle.status().await?;
        if script.pending_inbound() == 0 {
            break;
        }
    }

    let stats = handle.status().await?;
    event_loop.stop().await?;

    Ok(ReplayReport {
        sent: script.sent(),
        stats,
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{AuthorizationState, Payload};

    #[test]
    fn test_transcript_skips_blank_and_comment_lines() {
        let text = r#"
# bring-up
{"@type":"updateAuthorizationState","authorization_state":{"@type":"authorizationStateReady"}}

{"@type":"ok","@extra":4}
"#;
        let events = parse_transcript(text).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].payload,
            Payload::AuthorizationStateChanged {
                authorization_state: AuthorizationState::Ready
            }
        );
        assert_eq!(events[1].request_id.map(|id| id.value()), Some(4));
    }

    #[tokio::test]
    async fn test_missing_transcript_names_the_file() {
        let config = BotConfig::new("12345", "0123456789abcdef", "123456:ABCDEF");
        let command = Commands::Replay {
            transcript: "/nonexistent/events.jsonl".into(),
            simulate: false,
            settle_secs: 1,
        };

        let result = CommandDispatcher::execute(command, config).await;
        let Err(CliError::Config(reason)) = result else {
            panic!("expected configuration error");
        };
        assert!(reason.starts_with("cannot read transcript /nonexistent/events.jsonl: "));
    }

    #[test]
    fn test_transcript_error_names_the_line() {
        let text = "{\"@type\":\"ok\"}\nnot json\n";
        let result = parse_transcript(text);
        assert!(matches!(result, Err(CliError::Transcript { line: 2, .. })));
    }
}
