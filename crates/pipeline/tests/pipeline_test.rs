//! Pipeline integration tests driven by a scripted classifier.
//!
//! Each frame's image bytes carry a small script ("safe", "flag:<label>",
//! "block", "fail", optionally prefixed "<ms>+" to delay), so the tests
//! exercise classification flow, failure recovery, ordering, and cancellation
//! without a network or a real video.

use async_trait::async_trait;
use std::time::Duration;
use video_moderation_classifier::{ClassifyError, FrameClassifier, RetryPolicy};
use video_moderation_common::{
    Category, ConfidencePercent, FrameSample, FrameVerdict, ModerationError, SafetyStatus,
};
use video_moderation_pipeline::{CancellationToken, PipelineConfig, VideoModerator};

struct ScriptedClassifier;

#[async_trait]
impl FrameClassifier for ScriptedClassifier {
    async fn classify(&self, image: &[u8]) -> Result<FrameVerdict, ClassifyError> {
        let script = std::str::from_utf8(image).unwrap_or_default();

        let command = match script.split_once('+') {
            Some((delay, rest)) => {
                let ms: u64 = delay.parse().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                rest
            }
            None => script,
        };

        if let Some(("flag", label)) = command.split_once(':') {
            let mut verdict = FrameVerdict {
                status: SafetyStatus::Flag,
                ..Default::default()
            };
            verdict.issues.political.detected = true;
            verdict.issues.political.labels = vec![label.to_string()];
            verdict.issues.political.confidence = ConfidencePercent::new(80.0);
            return Ok(verdict);
        }

        match command {
            "block" => Ok(FrameVerdict {
                status: SafetyStatus::Block,
                ..Default::default()
            }),
            "fail" => Err(ClassifyError::MalformedVerdict(
                "scripted failure".to_string(),
            )),
            _ => Ok(FrameVerdict::default()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn frame(script: &str, timestamp: f64) -> FrameSample {
    FrameSample {
        image: script.as_bytes().to_vec(),
        timestamp,
    }
}

fn moderator(concurrency: usize) -> VideoModerator<ScriptedClassifier> {
    let config = PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(1),
            call_timeout: Duration::from_secs(5),
        },
        concurrency,
        ..Default::default()
    };
    VideoModerator::with_config(ScriptedClassifier, config)
}

#[tokio::test]
async fn test_moderate_frames_builds_full_report() {
    let frames = vec![
        frame("safe", 0.0),
        frame("flag:map issue", 5.0),
        frame("safe", 10.0),
    ];
    let report = moderator(1).moderate_frames(frames).await.unwrap();

    assert_eq!(report.status, SafetyStatus::Flag);
    assert!(report.issues.political.detected);
    assert_eq!(report.issues.political.labels, vec!["map issue"]);
    assert_eq!(report.issues.political.timestamps, vec![5.0]);
    assert_eq!(report.summary.total_frames, 3);
    assert_eq!(report.summary.frames_with_issues, 1);
}

#[tokio::test]
async fn test_failed_frame_is_skipped_not_fatal() {
    let frames = vec![
        frame("safe", 0.0),
        frame("fail", 1.0),
        frame("block", 2.0),
    ];
    let report = moderator(1).moderate_frames(frames).await.unwrap();

    // The failed frame shrinks the sample, nothing else
    assert_eq!(report.summary.total_frames, 2);
    assert_eq!(report.status, SafetyStatus::Block);
    assert_eq!(report.summary.duration, "2.00s");
}

#[tokio::test]
async fn test_all_frames_failing_is_fatal() {
    let frames = vec![frame("fail", 0.0), frame("fail", 1.0), frame("fail", 2.0)];
    let result = moderator(1).moderate_frames(frames).await;

    match result {
        Err(ModerationError::NoResults { attempted }) => assert_eq!(attempted, 3),
        other => panic!("expected NoResults, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_results_message_reports_attempted_count() {
    let frames = vec![frame("fail", 0.0), frame("fail", 1.0)];
    let err = moderator(1).moderate_frames(frames).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("2 attempted"), "message was: {message}");
    assert!(message.contains("0 succeeded"), "message was: {message}");
}

#[tokio::test]
async fn test_concurrent_results_return_to_timestamp_order() {
    // The earlier frame finishes last; first-seen must still be the earlier
    // timestamp once order is restored.
    let frames = vec![
        frame("40+flag:shared issue", 1.0),
        frame("1+flag:shared issue", 2.0),
        frame("1+safe", 3.0),
    ];
    let report = moderator(4).moderate_frames(frames).await.unwrap();

    assert_eq!(report.issues.political.timestamps, vec![1.0]);
    let times: Vec<f64> = report
        .summary
        .timeline
        .iter()
        .map(|entry| entry.timestamp)
        .collect();
    assert_eq!(times, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_cancellation_yields_partial_report() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Cancellation is observed after the first collected verdict, so the
    // report covers exactly the prefix that completed.
    let frames = vec![
        frame("block", 0.0),
        frame("safe", 1.0),
        frame("safe", 2.0),
        frame("safe", 3.0),
    ];
    let report = moderator(1)
        .moderate_frames_with_cancel(frames, &cancel)
        .await
        .unwrap();

    assert_eq!(report.summary.total_frames, 1);
    assert_eq!(report.status, SafetyStatus::Block);
}

#[tokio::test]
async fn test_category_lists_stay_aligned_through_pipeline() {
    let frames = vec![
        frame("flag:disputed map", 1.0),
        frame("flag:altered flag", 4.0),
        frame("flag:disputed map", 7.0),
    ];
    let report = moderator(2).moderate_frames(frames).await.unwrap();

    for category in Category::ALL {
        let entry = report.issues.get(category);
        assert_eq!(entry.labels.len(), entry.timestamps.len());
    }
    assert_eq!(
        report.issues.political.labels,
        vec!["disputed map", "altered flag"]
    );
    assert_eq!(report.issues.political.timestamps, vec![1.0, 4.0]);
}
