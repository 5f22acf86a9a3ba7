/// Common types and error taxonomy for the video moderation pipeline
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("video decode failed: {0}")]
    Decode(String),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("all frame classifications failed ({attempted} attempted, 0 succeeded)")]
    NoResults { attempted: usize },

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ModerationError {
    fn from(err: image::ImageError) -> Self {
        ModerationError::Decode(format!("frame encoding failed: {err}"))
    }
}

/// Result type for moderation operations
pub type Result<T> = std::result::Result<T, ModerationError>;

/// Safety verdict for a frame or a whole video.
///
/// Variant order is severity order: escalation never moves left.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SafetyStatus {
    #[default]
    Safe,
    Flag,
    Block,
}

impl SafetyStatus {
    /// Sticky escalation: the result is never less severe than either input.
    #[must_use]
    pub fn escalate(self, other: Self) -> Self {
        self.max(other)
    }

    /// Recommended action for this status
    #[must_use]
    pub fn action(self) -> Action {
        match self {
            SafetyStatus::Safe => Action::Approve,
            SafetyStatus::Flag => Action::Review,
            SafetyStatus::Block => Action::Remove,
        }
    }
}

/// Recommended handling for moderated content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Approve,
    Review,
    Remove,
}

/// Qualitative confidence attached to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictConfidence {
    #[default]
    High,
    Medium,
    Low,
}

/// Moderation categories, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Political,
    AdultContent,
    Other,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Political, Category::AdultContent, Category::Other];

    /// Heading used in the human-readable explanation
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Category::Political => "Political",
            Category::AdultContent => "Adult Content",
            Category::Other => "Other",
        }
    }
}

/// Percentage confidence carried as a `"NN%"` string on the wire.
///
/// Comparison is always numeric. Non-numeric or missing values parse as 0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ConfidencePercent(f64);

impl ConfidencePercent {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Parse the leading numeric substring of a percentage string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let numeric: String = s
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        Self(numeric.parse().unwrap_or(0.0))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for ConfidencePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Serialize for ConfidencePercent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ConfidencePercent {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct PercentVisitor;

        impl Visitor<'_> for PercentVisitor {
            type Value = ConfidencePercent;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a percentage string like \"85%\" or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(ConfidencePercent::parse(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
                Ok(ConfidencePercent(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(ConfidencePercent(v as f64))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Ok(ConfidencePercent(v as f64))
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(ConfidencePercent::default())
            }
        }

        deserializer.deserialize_any(PercentVisitor)
    }
}

/// One still image sampled from a video at a known timestamp.
///
/// Produced by the sampler, consumed once by the classifier, then discarded.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// JPEG-encoded image bytes
    pub image: Vec<u8>,
    /// Position in the video, seconds
    pub timestamp: f64,
}

/// Per-category result within a single frame verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryVerdict {
    #[serde(default)]
    pub detected: bool,

    /// Distinct issue labels reported for this category
    #[serde(default, rename = "type")]
    pub labels: Vec<String>,

    #[serde(default)]
    pub confidence: ConfidencePercent,
}

/// Category breakdown of one frame verdict.
///
/// A missing category key deserializes as not detected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryVerdicts {
    #[serde(default)]
    pub political: CategoryVerdict,
    #[serde(default)]
    pub adult_content: CategoryVerdict,
    #[serde(default)]
    pub other: CategoryVerdict,
}

impl CategoryVerdicts {
    #[must_use]
    pub fn get(&self, category: Category) -> &CategoryVerdict {
        match category {
            Category::Political => &self.political,
            Category::AdultContent => &self.adult_content,
            Category::Other => &self.other,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategoryVerdict {
        match category {
            Category::Political => &mut self.political,
            Category::AdultContent => &mut self.adult_content,
            Category::Other => &mut self.other,
        }
    }
}

/// Classification result for a single frame.
///
/// Every field defaults so a sparse service response still parses; the
/// service's own per-frame action/explanation fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameVerdict {
    #[serde(default)]
    pub status: SafetyStatus,

    #[serde(default)]
    pub confidence: VerdictConfidence,

    #[serde(default)]
    pub issues: CategoryVerdicts,
}

/// A frame verdict paired with the frame's timestamp, ready for aggregation
#[derive(Debug, Clone)]
pub struct TimedVerdict {
    pub verdict: FrameVerdict,
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_severity_order() {
        assert!(SafetyStatus::Safe < SafetyStatus::Flag);
        assert!(SafetyStatus::Flag < SafetyStatus::Block);
    }

    #[test]
    fn test_status_escalation_is_sticky() {
        let status = SafetyStatus::Block;
        assert_eq!(status.escalate(SafetyStatus::Safe), SafetyStatus::Block);
        assert_eq!(status.escalate(SafetyStatus::Flag), SafetyStatus::Block);
        assert_eq!(
            SafetyStatus::Safe.escalate(SafetyStatus::Flag),
            SafetyStatus::Flag
        );
    }

    #[test]
    fn test_status_action_mapping() {
        assert_eq!(SafetyStatus::Safe.action(), Action::Approve);
        assert_eq!(SafetyStatus::Flag.action(), Action::Review);
        assert_eq!(SafetyStatus::Block.action(), Action::Remove);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&SafetyStatus::Block).unwrap(), "\"BLOCK\"");
        let parsed: SafetyStatus = serde_json::from_str("\"FLAG\"").unwrap();
        assert_eq!(parsed, SafetyStatus::Flag);
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_string(&Category::AdultContent).unwrap(),
            "\"adult_content\""
        );
        assert_eq!(Category::AdultContent.title(), "Adult Content");
    }

    #[test]
    fn test_confidence_parse() {
        assert_eq!(ConfidencePercent::parse("85%").value(), 85.0);
        assert_eq!(ConfidencePercent::parse("85.5%").value(), 85.5);
        assert_eq!(ConfidencePercent::parse(" 90% ").value(), 90.0);
        assert_eq!(ConfidencePercent::parse("90").value(), 90.0);
        assert_eq!(ConfidencePercent::parse("high").value(), 0.0);
        assert_eq!(ConfidencePercent::parse("").value(), 0.0);
    }

    #[test]
    fn test_confidence_serialization() {
        let confidence = ConfidencePercent::new(90.0);
        assert_eq!(serde_json::to_string(&confidence).unwrap(), "\"90%\"");

        let parsed: ConfidencePercent = serde_json::from_str("\"72%\"").unwrap();
        assert_eq!(parsed.value(), 72.0);

        // Numbers are accepted too
        let parsed: ConfidencePercent = serde_json::from_str("72.5").unwrap();
        assert_eq!(parsed.value(), 72.5);
    }

    #[test]
    fn test_verdict_tolerates_sparse_response() {
        let verdict: FrameVerdict = serde_json::from_str("{}").unwrap();
        assert_eq!(verdict.status, SafetyStatus::Safe);
        assert!(!verdict.issues.political.detected);
        assert!(!verdict.issues.adult_content.detected);
        assert!(!verdict.issues.other.detected);
    }

    #[test]
    fn test_verdict_tolerates_missing_category() {
        let json = r#"{
            "status": "FLAG",
            "issues": {
                "political": {"detected": true, "type": ["map issue"], "confidence": "80%"}
            },
            "action": "REVIEW",
            "explanation": "ignored per-frame field"
        }"#;
        let verdict: FrameVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.status, SafetyStatus::Flag);
        assert!(verdict.issues.political.detected);
        assert_eq!(verdict.issues.political.labels, vec!["map issue"]);
        assert_eq!(verdict.issues.political.confidence.value(), 80.0);
        assert!(!verdict.issues.adult_content.detected);
    }

    #[test]
    fn test_verdict_tolerates_junk_confidence() {
        let json = r#"{
            "issues": {
                "other": {"detected": true, "type": ["violence"], "confidence": "unsure"}
            }
        }"#;
        let verdict: FrameVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.issues.other.confidence.value(), 0.0);
    }
}
