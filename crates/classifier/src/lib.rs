//! Per-frame classifier invocation
//!
//! Submits one frame image at a time to a streaming vision model and parses
//! the accumulated response into a [`FrameVerdict`]. The [`FrameClassifier`]
//! trait is the seam between the pipeline and the service so the pipeline can
//! be exercised without the network.

pub mod bedrock;

pub use bedrock::{BedrockClassifier, ClaudeModel};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use video_moderation_common::{FrameVerdict, ModerationError};

/// Errors from a single classification call
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification service call failed: {0}")]
    Service(String),

    #[error("response stream interrupted: {0}")]
    Stream(String),

    #[error("verdict parse failed: {0}")]
    MalformedVerdict(String),

    #[error("classification timed out after {0:?}")]
    Timeout(Duration),
}

impl ClassifyError {
    /// Whether retrying the call could plausibly succeed.
    ///
    /// A verdict that parsed as garbage is not evidence of a transient fault.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClassifyError::Service(_) | ClassifyError::Stream(_) | ClassifyError::Timeout(_)
        )
    }
}

impl From<ClassifyError> for ModerationError {
    fn from(err: ClassifyError) -> Self {
        ModerationError::Classification(err.to_string())
    }
}

/// Trait for per-frame classifiers
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    /// Classify one frame image, returning its verdict
    async fn classify(&self, image: &[u8]) -> Result<FrameVerdict, ClassifyError>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Timeout and retry bounds for one classification call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per frame, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubled per subsequent retry
    pub backoff: Duration,
    /// Upper bound on a single service call
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Classify one frame with a bounded per-call timeout, retrying transient
/// failures with doubling backoff.
///
/// # Errors
///
/// Returns the final error once attempts are exhausted, or immediately for
/// non-transient failures.
pub async fn classify_with_retry<C>(
    classifier: &C,
    image: &[u8],
    policy: &RetryPolicy,
) -> Result<FrameVerdict, ClassifyError>
where
    C: FrameClassifier + ?Sized,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.backoff;
    let mut attempt = 1;

    loop {
        let outcome = match tokio::time::timeout(policy.call_timeout, classifier.classify(image))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ClassifyError::Timeout(policy.call_timeout)),
        };

        match outcome {
            Ok(verdict) => return Ok(verdict),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(attempt, error = %err, "transient classification failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Parse an accumulated response into a frame verdict.
///
/// # Errors
///
/// Returns [`ClassifyError::MalformedVerdict`] when no valid JSON envelope is
/// present. Missing fields inside a valid envelope default instead of failing.
pub fn parse_verdict(text: &str) -> Result<FrameVerdict, ClassifyError> {
    let json = extract_json(text);
    serde_json::from_str(&json).map_err(|e| {
        let preview: String = json.chars().take(200).collect();
        ClassifyError::MalformedVerdict(format!("{e}; response began: {preview}"))
    })
}

/// Extract JSON from a model response, handling markdown code blocks.
fn extract_json(text: &str) -> String {
    let text = text.trim();

    // Handle ```json ... ``` wrapper
    if text.starts_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    // Try to find a JSON object directly
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}
