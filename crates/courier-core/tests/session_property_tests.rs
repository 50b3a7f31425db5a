//! Property-based tests for the session components
//!
//! These tests verify invariants of request id allocation, progress bucket
//! reporting and access gating over arbitrary inputs.

use courier_core::{
    AccessGate, AllowList, ChatId, FileId, FileMeta, FileProgress, MessageId, Request,
    RequestCorrelator, TransferDecision, TransferProgressTracker, Timestamp, UserId,
};
use proptest::prelude::*;

const FILE: FileId = FileId(42);

fn arb_meta() -> impl Strategy<Value = FileMeta> {
    (1i64..=10_000_000).prop_map(|size| FileMeta {
        name: "archive.zip".to_string(),
        extension: "zip".to_string(),
        mime_type: "application/zip".to_string(),
        size_bytes: size,
    })
}

/// Sorted byte samples for one transfer of `total` bytes
fn arb_samples() -> impl Strategy<Value = (i64, Vec<i64>)> {
    (1i64..=10_000_000).prop_flat_map(|total| {
        (
            Just(total),
            prop::collection::vec(0..=total, 1..50).prop_map(|mut samples| {
                samples.sort_unstable();
                samples
            }),
        )
    })
}

fn tracker_for(meta: FileMeta, step: u32) -> TransferProgressTracker {
    let mut tracker = TransferProgressTracker::with_bucket_step(step);
    tracker.begin(FILE, ChatId(1), meta, Timestamp::new(0));
    tracker.attach_progress_message(FILE, MessageId(1_000));
    tracker
}

fn sample(downloaded: i64, total: i64) -> FileProgress {
    FileProgress {
        file_id: FILE,
        downloaded_bytes: downloaded,
        total_bytes: total,
        is_complete: false,
        local_path: String::new(),
    }
}

proptest! {
    /// Property: ids are strictly increasing and never reused
    #[test]
    fn request_ids_strictly_increase(count in 1usize..200) {
        let mut correlator: RequestCorrelator<()> = RequestCorrelator::new();
        let mut last = 0u64;
        for _ in 0..count {
            let id = correlator.send(Request::Close, None);
            prop_assert!(id.value() > last);
            last = id.value();
        }
        prop_assert_eq!(last, count as u64);
        prop_assert_eq!(correlator.drain_outbox().len(), count);
    }

    /// Property: reported buckets are multiples of the step and strictly increase
    #[test]
    fn reported_buckets_strictly_increase(
        (total, samples) in arb_samples(),
        meta in arb_meta(),
        step in prop::sample::select(vec![1u32, 5, 10, 25]),
    ) {
        let mut tracker = tracker_for(meta, step);
        let mut last: Option<u32> = None;

        for (i, downloaded) in samples.into_iter().enumerate() {
            let now = Timestamp::new(100 * (i as u64 + 1));
            match tracker.on_file_update(&sample(downloaded, total), now) {
                TransferDecision::Report(report) => {
                    prop_assert_eq!(report.bucket % step, 0);
                    prop_assert!(report.bucket <= 100);
                    if let Some(previous) = last {
                        prop_assert!(report.bucket > previous);
                    }
                    prop_assert!(report.bytes_per_second >= 0.0);
                    last = Some(report.bucket);
                }
                TransferDecision::Suppressed { bucket } => {
                    prop_assert!(last.is_some_and(|previous| bucket <= previous));
                }
                other => prop_assert!(false, "unexpected decision {:?}", other),
            }
        }
        prop_assert_eq!(tracker.active_count(), 1);
    }

    /// Property: a zero or negative total never produces an edit
    #[test]
    fn unknown_total_never_reports(
        downloads in prop::collection::vec(0i64..1_000_000, 1..20),
        total in -5i64..=0,
        meta in arb_meta(),
    ) {
        let mut tracker = tracker_for(meta, 5);
        for (i, downloaded) in downloads.into_iter().enumerate() {
            let decision = tracker.on_file_update(&sample(downloaded, total), Timestamp::new(i as u64));
            prop_assert_eq!(decision, TransferDecision::UnknownTotal);
        }
    }

    /// Property: non-user senders are rejected whatever the allow-list holds
    #[test]
    fn non_users_always_rejected(
        ids in prop::collection::vec(any::<i64>(), 0..10),
        sender in i64::MIN..=0,
    ) {
        let mut with_list = AccessGate::new(AllowList::from_ids(ids.into_iter().map(UserId)));
        let mut open = AccessGate::new(AllowList::disabled());
        prop_assert!(!with_list.is_allowed(UserId(sender)));
        prop_assert!(!open.is_allowed(UserId(sender)));
    }

    /// Property: a disabled allow-list admits every real user
    #[test]
    fn disabled_list_admits_users(sender in 1i64..=i64::MAX) {
        let mut gate = AccessGate::new(AllowList::parse("").unwrap());
        prop_assert!(gate.is_allowed(UserId(sender)));
    }
}
