//! Model Gateway: turns briefs into prompts, sends them to a text-generation
//! backend and shapes the answer into post content.

pub mod ollama;
pub mod openai;
mod parse;
mod prompt;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use parse::{parse_json_from_content, strip_code_fences};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{MalformedContentPolicy, ModelConfig, ModelProvider};
use crate::db::models::{PostLength, Section, SeoMetadata};
use crate::error::{AppError, GatewayError};

/// Placed in `introduction` when the model's answer could not be shaped into
/// a post and the degrade policy is active.
pub const DEGRADED_INTRODUCTION: &str = "The model returned an invalid blog structure";

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User { content: content.into() }
    }
}

/// Whether the caller expects a JSON document back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

/// A text-generation service. Implementations return the raw answer text or
/// a transport-class error; they never interpret the content.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        format: ResponseFormat,
    ) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationBrief {
    pub title: String,
    /// Comma-separated, as typed by the user.
    pub keywords: Option<String>,
    pub tone: String,
    pub audience: String,
    pub length: PostLength,
}

#[derive(Debug, Clone)]
pub struct SectionContext {
    pub brief: GenerationBrief,
    pub current: String,
    pub other_sections: Vec<(Section, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub introduction: String,
    pub body: String,
    pub conclusion: String,
    pub seo: Option<SeoMetadata>,
}

impl GeneratedContent {
    fn degraded(raw: String) -> Self {
        Self {
            introduction: DEGRADED_INTRODUCTION.to_string(),
            body: raw,
            conclusion: String::new(),
            seo: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.seo.is_none() && self.introduction == DEGRADED_INTRODUCTION
    }
}

#[derive(Deserialize)]
struct BlogPayload {
    introduction: String,
    body: String,
    conclusion: String,
    seo: SeoMetadata,
}

pub struct ModelGateway {
    backend: Arc<dyn CompletionBackend>,
    policy: MalformedContentPolicy,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: MalformedContentPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, AppError> {
        let backend: Arc<dyn CompletionBackend> = match config.provider {
            ModelProvider::OpenAi => Arc::new(OpenAiBackend::new(config)?),
            ModelProvider::Ollama => Arc::new(OllamaBackend::new(config)),
        };
        info!(provider = ?config.provider, model = %config.model, "model gateway configured");
        Ok(Self::new(backend, config.malformed_content_policy))
    }

    pub fn policy(&self) -> MalformedContentPolicy {
        self.policy
    }

    pub async fn generate(&self, brief: &GenerationBrief) -> Result<GeneratedContent, GatewayError> {
        let raw = self
            .backend
            .complete(prompt::full_post(brief), ResponseFormat::Json)
            .await?;

        match shape_blog(&raw) {
            Ok(content) => Ok(content),
            Err(err) => match self.policy {
                MalformedContentPolicy::Degrade => {
                    warn!(error = %err, "model answer was not a valid blog payload; degrading");
                    Ok(GeneratedContent::degraded(raw))
                }
                MalformedContentPolicy::Reject => Err(err),
            },
        }
    }

    /// Section answers are opaque text: fences are stripped and the result
    /// trimmed, nothing else.
    pub async fn regenerate_section(
        &self,
        section: Section,
        context: &SectionContext,
    ) -> Result<String, GatewayError> {
        let raw = self
            .backend
            .complete(prompt::section_rewrite(section, context), ResponseFormat::Text)
            .await?;

        let text = strip_code_fences(&raw);
        if text.is_empty() {
            return Err(GatewayError::MalformedContent(format!(
                "empty {section} after removing code fences"
            )));
        }
        Ok(text)
    }
}

fn shape_blog(raw: &str) -> Result<GeneratedContent, GatewayError> {
    let value = parse_json_from_content(raw)?;
    let payload: BlogPayload = serde_json::from_value(value)
        .map_err(|e| GatewayError::MalformedContent(format!("unexpected blog shape: {e}")))?;
    Ok(GeneratedContent {
        introduction: payload.introduction,
        body: payload.body,
        conclusion: payload.conclusion,
        seo: Some(payload.seo),
    })
}
