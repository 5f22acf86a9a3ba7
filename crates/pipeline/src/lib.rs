//! Pipeline orchestration
//!
//! Ties the stages together: sample frames from a video buffer, classify each
//! frame through a [`FrameClassifier`], and aggregate the surviving verdicts
//! into one report. A failed frame is logged and skipped; the whole operation
//! fails only when decoding fails or every frame fails classification.

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use video_moderation_aggregator::{aggregate, AggregateReport};
use video_moderation_classifier::{classify_with_retry, FrameClassifier, RetryPolicy};
use video_moderation_common::{FrameSample, ModerationError, Result, TimedVerdict};
use video_moderation_sampler::{sample_frames, SamplerConfig};

/// Cooperative cancellation flag shared between a caller and a running
/// moderation pass. Cancelling abandons in-flight classification calls;
/// verdicts collected so far are still aggregated.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sampler: SamplerConfig,
    pub retry: RetryPolicy,
    /// Concurrent classification calls; 1 keeps classification strictly
    /// sequential
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            retry: RetryPolicy::default(),
            concurrency: 1,
        }
    }
}

/// End-to-end video moderator: sample, classify, aggregate
pub struct VideoModerator<C> {
    classifier: C,
    config: PipelineConfig,
}

impl<C: FrameClassifier> VideoModerator<C> {
    pub fn new(classifier: C) -> Self {
        Self::with_config(classifier, PipelineConfig::default())
    }

    pub fn with_config(classifier: C, config: PipelineConfig) -> Self {
        Self { classifier, config }
    }

    /// Analyze a raw video buffer end to end.
    ///
    /// # Errors
    ///
    /// Fails when the video cannot be decoded or when every sampled frame
    /// fails classification.
    pub async fn analyze(&self, video: Vec<u8>) -> Result<AggregateReport> {
        self.analyze_with_cancel(video, &CancellationToken::new())
            .await
    }

    /// Like [`analyze`](Self::analyze), honoring a cancellation token.
    ///
    /// # Errors
    ///
    /// Fails on decode failure, on all frames failing classification, or on
    /// cancellation before any verdict was collected.
    pub async fn analyze_with_cancel(
        &self,
        video: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<AggregateReport> {
        let sampler_config = self.config.sampler.clone();
        let sampled = tokio::task::spawn_blocking(move || sample_frames(&video, &sampler_config))
            .await
            .map_err(|e| ModerationError::Decode(format!("sampler task failed: {e}")))??;

        info!(
            frames = sampled.frames.len(),
            duration = sampled.duration,
            "video sampled"
        );

        self.moderate_frames_with_cancel(sampled.frames, cancel)
            .await
    }

    /// Classify and aggregate frames the caller already holds.
    ///
    /// # Errors
    ///
    /// Fails when every frame fails classification.
    pub async fn moderate_frames(&self, frames: Vec<FrameSample>) -> Result<AggregateReport> {
        self.moderate_frames_with_cancel(frames, &CancellationToken::new())
            .await
    }

    /// Like [`moderate_frames`](Self::moderate_frames), honoring a
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// Fails when no verdict was collected before completion or cancellation.
    pub async fn moderate_frames_with_cancel(
        &self,
        frames: Vec<FrameSample>,
        cancel: &CancellationToken,
    ) -> Result<AggregateReport> {
        let attempted = frames.len();
        let verdicts = self.classify_frames(frames, cancel).await;
        if verdicts.is_empty() {
            return Err(ModerationError::NoResults { attempted });
        }
        aggregate(&verdicts)
    }

    /// Classify frames with bounded concurrency.
    ///
    /// `buffered` yields in submission order, so verdicts reach the
    /// aggregator in timestamp order regardless of completion order — the
    /// first-seen timestamp rule depends on this.
    async fn classify_frames(
        &self,
        frames: Vec<FrameSample>,
        cancel: &CancellationToken,
    ) -> Vec<TimedVerdict> {
        let concurrency = self.config.concurrency.max(1);
        let classifier = &self.classifier;
        let retry = &self.config.retry;

        let mut results = futures::stream::iter(frames.into_iter().map(|frame| async move {
            let outcome = classify_with_retry(classifier, &frame.image, retry).await;
            (frame.timestamp, outcome)
        }))
        .buffered(concurrency);

        let mut verdicts = Vec::new();
        while let Some((timestamp, outcome)) = results.next().await {
            match outcome {
                Ok(verdict) => verdicts.push(TimedVerdict { verdict, timestamp }),
                Err(err) => {
                    warn!(timestamp, error = %err, "skipping frame after classification failure");
                }
            }
            if cancel.is_cancelled() {
                info!(
                    collected = verdicts.len(),
                    "moderation cancelled, aggregating partial results"
                );
                // Dropping the stream abandons in-flight calls
                break;
            }
        }
        verdicts
    }
}
