//! AWS Bedrock classifier for Claude models.
//!
//! Calls the ConverseStream API once per frame with the JPEG image and the
//! moderation instruction, accumulates the streamed text deltas into one
//! string, then parses it as a [`FrameVerdict`].
//!
//! ## Authentication
//!
//! Uses the default AWS credentials chain:
//! 1. Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
//! 2. AWS credentials file (`~/.aws/credentials`)
//! 3. IAM role (for EC2/Lambda)

use crate::{parse_verdict, ClassifyError, FrameClassifier};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::{
    primitives::Blob,
    types::{
        ContentBlock, ContentBlockDelta, ConversationRole, ConverseStreamOutput, ImageBlock,
        ImageFormat, ImageSource, InferenceConfiguration, Message,
    },
    Client,
};
use tracing::debug;
use video_moderation_common::FrameVerdict;

/// Claude model variants available on Bedrock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaudeModel {
    /// Claude Sonnet 3.5 v2 - good balance of speed and quality
    ClaudeSonnet35V2,
    /// Claude Haiku 3.5 - cheapest per frame
    ClaudeHaiku35,
}

impl ClaudeModel {
    /// Get the AWS Bedrock model identifier string
    #[inline]
    #[must_use]
    pub const fn model_id(&self) -> &str {
        match self {
            Self::ClaudeSonnet35V2 => "us.anthropic.claude-3-5-sonnet-20241022-v2:0",
            Self::ClaudeHaiku35 => "us.anthropic.claude-3-5-haiku-20241022-v1:0",
        }
    }

    /// Get the human-readable model name for display purposes
    #[inline]
    #[must_use]
    pub const fn display_name(&self) -> &str {
        match self {
            Self::ClaudeSonnet35V2 => "claude-sonnet-3.5-v2",
            Self::ClaudeHaiku35 => "claude-haiku-3.5",
        }
    }
}

impl std::fmt::Display for ClaudeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for ClaudeModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude-sonnet-3.5-v2" | "sonnet-3.5-v2" | "sonnet35v2" | "sonnet" => {
                Ok(Self::ClaudeSonnet35V2)
            }
            "claude-haiku-3.5" | "haiku-3.5" | "haiku35" | "haiku" => Ok(Self::ClaudeHaiku35),
            _ => Err(format!(
                "unknown Claude model '{s}'. Valid options: claude-sonnet-3.5-v2, sonnet, claude-haiku-3.5, haiku"
            )),
        }
    }
}

/// AWS Bedrock frame classifier.
#[derive(Debug, Clone)]
pub struct BedrockClassifier {
    client: Client,
    model: ClaudeModel,
}

impl BedrockClassifier {
    /// Create a new classifier using default AWS credentials.
    pub async fn new(model: ClaudeModel) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
            model,
        }
    }

    /// Create a new classifier for a specific region.
    pub async fn new_with_region(region: &str, model: ClaudeModel) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            model,
        }
    }
}

#[async_trait]
impl FrameClassifier for BedrockClassifier {
    async fn classify(&self, image: &[u8]) -> Result<FrameVerdict, ClassifyError> {
        let image_block = ImageBlock::builder()
            .format(ImageFormat::Jpeg)
            .source(ImageSource::Bytes(Blob::new(image.to_vec())))
            .build()
            .map_err(|e| ClassifyError::Service(format!("failed to build image block: {e}")))?;

        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Image(image_block))
            .content(ContentBlock::Text(MODERATION_PROMPT.to_string()))
            .build()
            .map_err(|e| ClassifyError::Service(format!("failed to build message: {e}")))?;

        let response = self
            .client
            .converse_stream()
            .model_id(self.model.model_id())
            .messages(message)
            .inference_config(
                InferenceConfiguration::builder()
                    .max_tokens(2048)
                    .temperature(0.0)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| ClassifyError::Service(format!("Bedrock API error: {e:?}")))?;

        // Accumulate the streamed text fragments into one string
        let mut stream = response.stream;
        let mut text = String::new();
        while let Some(event) = stream
            .recv()
            .await
            .map_err(|e| ClassifyError::Stream(format!("{e:?}")))?
        {
            if let ConverseStreamOutput::ContentBlockDelta(delta_event) = event {
                if let Some(ContentBlockDelta::Text(fragment)) = delta_event.delta() {
                    text.push_str(fragment);
                }
            }
        }

        debug!(model = %self.model, bytes = text.len(), "accumulated classification response");
        parse_verdict(&text)
    }

    fn name(&self) -> &str {
        self.model.display_name()
    }
}

const MODERATION_PROMPT: &str = r#"Review this image for prohibited or sensitive content in three categories:

1. political: maps of disputed territories, altered national flags or emblems, political symbols or gestures, protests or demonstrations.
2. adult_content: explicit or graphic material, age-restricted themes, suggestive imagery or inappropriate text overlays.
3. other: violence, hate symbols, harassment, dangerous activities, misinformation, offensive gestures.

Provide your analysis in this exact JSON format:
{
    "status": "SAFE/FLAG/BLOCK",
    "confidence": "HIGH/MEDIUM/LOW",
    "issues": {
        "political": {"detected": true/false, "type": ["list of detected issues"], "confidence": "percentage"},
        "adult_content": {"detected": true/false, "type": ["list of detected issues"], "confidence": "percentage"},
        "other": {"detected": true/false, "type": ["list of detected issues"], "confidence": "percentage"}
    },
    "action": "APPROVE/REVIEW/REMOVE",
    "explanation": "Brief explanation of the decision"
}

Return ONLY the JSON response with no additional text."#;
