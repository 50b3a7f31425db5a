//! Transfer progress tracking
//!
//! One [`TransferSession`] per active download. Byte-count updates arrive as
//! unordered push events; the tracker quantizes progress into buckets, reports
//! only when the bucket changes, estimates rate and ETA from the previous
//! reported sample, and finalizes the session when the client marks the file
//! complete. The tracker decides; the caller sends the resulting edit or notice.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::protocol::Attachment;
use crate::types::{ChatId, FileId, MessageId, Timestamp};

/// Default reporting granularity in percent
pub const DEFAULT_BUCKET_STEP: u32 = 5;

const BYTES_PER_MB: f64 = 1_000_000.0;

// ----------------------------------------------------------------------------
// File Metadata
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    /// Lowercased extension without the dot, empty if none
    pub extension: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

impl FileMeta {
    pub fn from_attachment(attachment: &Attachment) -> Self {
        let name = if attachment.file_name.is_empty() {
            format!("file_{}", attachment.file.id)
        } else {
            attachment.file_name.clone()
        };
        let extension = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        Self {
            name,
            extension,
            mime_type: attachment.mime_type.clone(),
            size_bytes: attachment.file.size,
        }
    }
}

// ----------------------------------------------------------------------------
// Transfer Session
// ----------------------------------------------------------------------------

/// Per-file state of one active download, including its sampling history
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSession {
    pub file_id: FileId,
    pub chat_id: ChatId,
    progress_message_id: Option<MessageId>,
    pub start_time: Timestamp,
    pub display_text: String,
    pub meta: FileMeta,
    last_reported_bucket: Option<u32>,
    last_sample: Option<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sample {
    bytes: i64,
    at: Timestamp,
}

impl TransferSession {
    pub fn new(file_id: FileId, chat_id: ChatId, meta: FileMeta, start_time: Timestamp) -> Self {
        Self {
            file_id,
            chat_id,
            progress_message_id: None,
            start_time,
            display_text: format!("Downloading {}...", meta.name),
            meta,
            last_reported_bucket: None,
            last_sample: None,
        }
    }

    pub fn progress_message_id(&self) -> Option<MessageId> {
        self.progress_message_id
    }

    /// Set the progress message id; it can only go from unset to set once
    pub fn attach_progress_message(&mut self, message_id: MessageId) -> bool {
        if self.progress_message_id.is_some() || !message_id.is_valid() {
            return false;
        }
        self.progress_message_id = Some(message_id);
        true
    }

    pub fn last_reported_bucket(&self) -> Option<u32> {
        self.last_reported_bucket
    }
}

// ----------------------------------------------------------------------------
// Updates and Decisions
// ----------------------------------------------------------------------------

/// A byte-count sample for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProgress {
    pub file_id: FileId,
    pub downloaded_bytes: i64,
    pub total_bytes: i64,
    pub is_complete: bool,
    pub local_path: String,
}

/// Edit to apply to a session's progress message
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub bucket: u32,
    pub bytes_per_second: f64,
    pub eta: Duration,
    pub text: String,
}

/// Notice to send when a transfer finishes
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCompletion {
    pub chat_id: ChatId,
    pub file_id: FileId,
    pub progress_message_id: Option<MessageId>,
    pub elapsed: Duration,
    pub local_path: String,
    pub text: String,
}

/// What the caller should do with a sample
#[derive(Debug, Clone, PartialEq)]
pub enum TransferDecision {
    /// No active session (late event after cleanup, or never tracked)
    NoSession,
    /// The progress message has no durable id yet
    AwaitingProgressMessage,
    /// Total size unknown or zero
    UnknownTotal,
    /// Same bucket as the last report
    Suppressed { bucket: u32 },
    Report(ProgressReport),
    Completed(TransferCompletion),
}

// ----------------------------------------------------------------------------
// Transfer Progress Tracker
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct TransferProgressTracker {
    sessions: HashMap<FileId, TransferSession>,
    bucket_step: u32,
    stats: TransferStats,
}

impl TransferProgressTracker {
    pub fn new() -> Self {
        Self::with_bucket_step(DEFAULT_BUCKET_STEP)
    }

    /// `bucket_step` is clamped to 1..=100
    pub fn with_bucket_step(bucket_step: u32) -> Self {
        Self {
            sessions: HashMap::new(),
            bucket_step: bucket_step.clamp(1, 100),
            stats: TransferStats::default(),
        }
    }

    /// Start tracking `file_id`, keeping an existing session if there is one
    pub fn begin(
        &mut self,
        file_id: FileId,
        chat_id: ChatId,
        meta: FileMeta,
        now: Timestamp,
    ) -> &mut TransferSession {
        self.sessions.entry(file_id).or_insert_with(|| {
            self.stats.started += 1;
            debug!(file_id = file_id.0, chat_id = chat_id.0, name = %meta.name, "transfer session created");
            TransferSession::new(file_id, chat_id, meta, now)
        })
    }

    pub fn session(&self, file_id: FileId) -> Option<&TransferSession> {
        self.sessions.get(&file_id)
    }

    pub fn attach_progress_message(&mut self, file_id: FileId, message_id: MessageId) -> bool {
        self.sessions
            .get_mut(&file_id)
            .map(|session| session.attach_progress_message(message_id))
            .unwrap_or(false)
    }

    /// Drop a session without completing it
    pub fn evict(&mut self, file_id: FileId) -> Option<TransferSession> {
        let removed = self.sessions.remove(&file_id);
        if removed.is_some() {
            self.stats.evicted += 1;
        }
        removed
    }

    pub fn evict_all(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        self.stats.evicted += count as u64;
        count
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Process one byte-count sample taken at `now`
    pub fn on_file_update(&mut self, update: &FileProgress, now: Timestamp) -> TransferDecision {
        if update.is_complete {
            let Some(session) = self.sessions.remove(&update.file_id) else {
                return TransferDecision::NoSession;
            };
            self.stats.completed += 1;
            let completion = complete(session, update, now);
            info!(
                file_id = update.file_id.0,
                elapsed_ms = completion.elapsed.as_millis() as u64,
                "transfer complete"
            );
            return TransferDecision::Completed(completion);
        }

        let bucket_step = self.bucket_step;
        let Some(session) = self.sessions.get_mut(&update.file_id) else {
            return TransferDecision::NoSession;
        };
        let Some(message_id) = session.progress_message_id else {
            return TransferDecision::AwaitingProgressMessage;
        };
        if update.total_bytes <= 0 {
            return TransferDecision::UnknownTotal;
        }

        let percent = percent_of(update.downloaded_bytes, update.total_bytes);
        let bucket = percent / bucket_step * bucket_step;
        if session.last_reported_bucket.is_some_and(|last| bucket <= last) {
            return TransferDecision::Suppressed { bucket };
        }

        let bytes_per_second = session
            .last_sample
            .map(|previous| rate(previous, update.downloaded_bytes, now))
            .unwrap_or(0.0);
        session.last_sample = Some(Sample {
            bytes: update.downloaded_bytes,
            at: now,
        });

        let remaining = (update.total_bytes - update.downloaded_bytes).max(0);
        let eta = eta(remaining, bytes_per_second);

        let text = format!(
            "{}\n{}% ({}/{} bytes) | {:.2} MB/s | ETA {}",
            session.display_text,
            bucket,
            update.downloaded_bytes,
            update.total_bytes,
            bytes_per_second / BYTES_PER_MB,
            format_duration(eta)
        );
        session.last_reported_bucket = Some(bucket);
        self.stats.reports += 1;

        TransferDecision::Report(ProgressReport {
            chat_id: session.chat_id,
            message_id,
            bucket,
            bytes_per_second,
            eta,
            text,
        })
    }
}

impl Default for TransferProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn complete(session: TransferSession, update: &FileProgress, now: Timestamp) -> TransferCompletion {
    let elapsed = now.duration_since(session.start_time);
    let size = if update.total_bytes > 0 {
        update.total_bytes
    } else {
        session.meta.size_bytes
    };

    let mut text = format!(
        "Downloaded {} ({}) in {}",
        session.meta.name,
        format_bytes(size.max(0) as u64),
        format_duration(elapsed)
    );
    if !update.local_path.is_empty() {
        text.push_str(&format!("\nSaved to {}", update.local_path));
    }

    TransferCompletion {
        chat_id: session.chat_id,
        file_id: session.file_id,
        progress_message_id: session.progress_message_id,
        elapsed,
        local_path: update.local_path.clone(),
        text,
    }
}

/// Integer percentage in 0..=100
fn percent_of(downloaded: i64, total: i64) -> u32 {
    let percent = i128::from(downloaded.max(0)) * 100 / i128::from(total);
    percent.clamp(0, 100) as u32
}

/// Bytes per second between two samples, never negative
fn rate(previous: Sample, bytes: i64, now: Timestamp) -> f64 {
    let elapsed_ms = now - previous.at;
    if elapsed_ms == 0 {
        return 0.0;
    }
    let delta = bytes as f64 - previous.bytes as f64;
    (delta * 1000.0 / elapsed_ms as f64).max(0.0)
}

/// Time left at `bytes_per_second`; zero when the rate is unknown, saturating
/// at [`Duration::MAX`] for vanishing rates
fn eta(remaining: i64, bytes_per_second: f64) -> Duration {
    if bytes_per_second > 0.0 {
        Duration::try_from_secs_f64(remaining as f64 / bytes_per_second).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Format a duration as m:ss
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ----------------------------------------------------------------------------
// Transfer Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferStats {
    pub started: u64,
    pub reports: u64,
    pub completed: u64,
    pub evicted: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
