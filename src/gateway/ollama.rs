use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::GatewayError;
use crate::gateway::{ChatMessage, CompletionBackend, ResponseFormat};

pub const OLLAMA_API_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

// https://github.com/ollama/ollama/blob/main/docs/modelfile.md#valid-parameters-and-values
#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Local Ollama server, non-streaming `/api/chat`.
pub struct OllamaBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
}

impl OllamaBackend {
    pub fn new(config: &ModelConfig) -> Self {
        let api_url = if config.base_url.is_empty() {
            OLLAMA_API_URL
        } else {
            config.base_url.as_str()
        };

        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        format: ResponseFormat,
    ) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: (format == ResponseFormat::Json).then_some("json"),
            options: ChatOptions { temperature: self.temperature },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.api_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        let response: ChatResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(GatewayError::Transport(format!("ollama error: {error}")));
        }

        response
            .message
            .and_then(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GatewayError::EmptyContent)
    }
}
