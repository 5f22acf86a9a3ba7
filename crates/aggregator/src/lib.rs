//! Result aggregator
//!
//! Folds an ordered sequence of per-frame verdicts into one video-level
//! report: worst-of status, first-seen issue timestamps, max-of confidence,
//! and a human-readable explanation. Deterministic given its input — no I/O,
//! no clock, no randomness.

#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};
use video_moderation_common::{
    Action, Category, ConfidencePercent, ModerationError, Result, SafetyStatus, TimedVerdict,
    VerdictConfidence,
};

/// Video-level moderation report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub status: SafetyStatus,
    pub confidence: VerdictConfidence,
    pub issues: CategoryReports,
    pub action: Action,
    pub summary: Summary,
    pub explanation: String,
}

/// Aggregated result per category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryReports {
    pub political: CategoryReport,
    pub adult_content: CategoryReport,
    pub other: CategoryReport,
}

impl CategoryReports {
    #[must_use]
    pub fn get(&self, category: Category) -> &CategoryReport {
        match category {
            Category::Political => &self.political,
            Category::AdultContent => &self.adult_content,
            Category::Other => &self.other,
        }
    }
}

/// Aggregated detections for one category.
///
/// `timestamps[i]` is the first-seen time of `labels[i]`; the two lists stay
/// the same length by construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryReport {
    pub detected: bool,

    #[serde(rename = "type")]
    pub labels: Vec<String>,

    pub timestamps: Vec<f64>,

    pub confidence: ConfidencePercent,
}

/// Whole-video statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_frames: usize,
    pub frames_with_issues: usize,
    /// Last frame's timestamp, formatted as `"SS.SSs"`
    pub duration: String,
    pub timeline: Vec<TimelineEntry>,
}

/// One frame that had issues, with the categories flagged there
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "time")]
    pub timestamp: f64,
    pub issues: Vec<Category>,
}

/// Per-category working state during the fold
#[derive(Debug, Default)]
struct CategoryAccumulator {
    detected: bool,
    issues: Vec<IssueTrack>,
    confidence: ConfidencePercent,
}

#[derive(Debug)]
struct IssueTrack {
    label: String,
    first_seen: f64,
    count: usize,
}

impl CategoryAccumulator {
    /// First-seen-wins: a label keeps the timestamp of its first detection;
    /// repeats only bump the occurrence count.
    fn record_label(&mut self, label: &str, timestamp: f64) {
        match self.issues.iter_mut().find(|track| track.label == label) {
            Some(track) => track.count += 1,
            None => self.issues.push(IssueTrack {
                label: label.to_string(),
                first_seen: timestamp,
                count: 1,
            }),
        }
    }

    /// Max-wins: recorded confidence only ever increases.
    fn record_confidence(&mut self, confidence: ConfidencePercent) {
        if confidence.value() > self.confidence.value() {
            self.confidence = confidence;
        }
    }

    fn into_report(self) -> CategoryReport {
        let mut labels = Vec::with_capacity(self.issues.len());
        let mut timestamps = Vec::with_capacity(self.issues.len());
        for track in self.issues {
            labels.push(track.label);
            timestamps.push(track.first_seen);
        }
        CategoryReport {
            detected: self.detected,
            labels,
            timestamps,
            confidence: self.confidence,
        }
    }
}

#[derive(Debug, Default)]
struct Accumulators {
    political: CategoryAccumulator,
    adult_content: CategoryAccumulator,
    other: CategoryAccumulator,
}

impl Accumulators {
    fn get(&self, category: Category) -> &CategoryAccumulator {
        match category {
            Category::Political => &self.political,
            Category::AdultContent => &self.adult_content,
            Category::Other => &self.other,
        }
    }

    fn get_mut(&mut self, category: Category) -> &mut CategoryAccumulator {
        match category {
            Category::Political => &mut self.political,
            Category::AdultContent => &mut self.adult_content,
            Category::Other => &mut self.other,
        }
    }
}

/// Fold per-frame verdicts, already in timestamp order, into one report.
///
/// # Errors
///
/// Returns [`ModerationError::NoResults`] for an empty input — callers must
/// filter out failed frames upstream and only aggregate when at least one
/// verdict survived.
pub fn aggregate(verdicts: &[TimedVerdict]) -> Result<AggregateReport> {
    if verdicts.is_empty() {
        return Err(ModerationError::NoResults { attempted: 0 });
    }

    let total_frames = verdicts.len();
    let duration = verdicts.last().map_or(0.0, |v| v.timestamp);

    let mut status = SafetyStatus::Safe;
    let mut accumulators = Accumulators::default();
    let mut frames_with_issues = 0;
    let mut timeline = Vec::new();

    for timed in verdicts {
        let mut frame_has_issues = false;

        // Sticky escalation: BLOCK is never downgraded by a later frame
        match timed.verdict.status {
            SafetyStatus::Block => {
                status = SafetyStatus::Block;
                frame_has_issues = true;
            }
            SafetyStatus::Flag if status != SafetyStatus::Block => {
                status = SafetyStatus::Flag;
                frame_has_issues = true;
            }
            _ => {}
        }

        let mut flagged_categories = Vec::new();
        for category in Category::ALL {
            let verdict = timed.verdict.issues.get(category);
            if !verdict.detected {
                continue;
            }
            let acc = accumulators.get_mut(category);
            acc.detected = true;
            frame_has_issues = true;
            for label in &verdict.labels {
                acc.record_label(label, timed.timestamp);
            }
            acc.record_confidence(verdict.confidence);
            flagged_categories.push(category);
        }

        if frame_has_issues {
            frames_with_issues += 1;
            timeline.push(TimelineEntry {
                timestamp: timed.timestamp,
                issues: flagged_categories,
            });
        }
    }

    let explanation = compose_explanation(
        status,
        &accumulators,
        total_frames,
        frames_with_issues,
        duration,
    );

    Ok(AggregateReport {
        status,
        confidence: VerdictConfidence::High,
        issues: CategoryReports {
            political: accumulators.political.into_report(),
            adult_content: accumulators.adult_content.into_report(),
            other: accumulators.other.into_report(),
        },
        action: status.action(),
        summary: Summary {
            total_frames,
            frames_with_issues,
            duration: format!("{duration:.2}s"),
            timeline,
        },
        explanation,
    })
}

fn compose_explanation(
    status: SafetyStatus,
    accumulators: &Accumulators,
    total_frames: usize,
    frames_with_issues: usize,
    duration: f64,
) -> String {
    let mut text = String::from("Video analysis summary:\n");
    match status {
        SafetyStatus::Block => {
            text.push_str("\nCritical issues detected requiring immediate removal:");
        }
        SafetyStatus::Flag => text.push_str("\nPotential issues detected requiring review:"),
        SafetyStatus::Safe => text.push_str("\nNo significant issues detected."),
    }

    for category in Category::ALL {
        let acc = accumulators.get(category);
        if !acc.detected {
            continue;
        }
        text.push_str(&format!("\n\n{} Issues:", category.title()));
        for track in &acc.issues {
            let percentage = track.count as f64 / total_frames as f64 * 100.0;
            text.push_str(&format!(
                "\n- {} (in {percentage:.1}% of frames)",
                track.label
            ));
        }
        if !acc.issues.is_empty() {
            text.push_str("\nFirst detections at:");
            for track in &acc.issues {
                text.push_str(&format!("\n- {}: {:.2}s", track.label, track.first_seen));
            }
        }
    }

    let clean_percentage =
        (total_frames - frames_with_issues) as f64 / total_frames as f64 * 100.0;
    text.push_str("\n\nAnalysis Summary:");
    text.push_str(&format!("\n- Total frames: {total_frames}"));
    text.push_str(&format!("\n- Frames with issues: {frames_with_issues}"));
    text.push_str(&format!("\n- Duration: {duration:.2}s"));
    text.push_str(&format!("\n- Clean frames: {clean_percentage:.1}%"));
    text
}
