//! Generative-language collaborator: trait seam plus the Anthropic
//! messages-API client used in production.
//!
//! The pipeline never talks HTTP directly; it calls [`LanguageModel`] and
//! lets the retry controller interpret transient vs terminal failures.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};
use crate::types::TokenUsage;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const API_VERSION: &str = "2023-06-01";

/// A completion returned by the collaborator.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// The generative-language collaborator contract: text completion and
/// two-image visual comparison.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in error signals (e.g. "anthropic").
    fn provider_name(&self) -> &str;

    /// Complete a prompt, bounded to `max_output` response tokens.
    async fn complete(&self, prompt: &str, max_output: u32) -> Result<Completion>;

    /// Compare two PNG screenshots under the given instruction and return
    /// the model's textual analysis.
    async fn compare_images(
        &self,
        image_a: &[u8],
        image_b: &[u8],
        instruction: &str,
    ) -> Result<Completion>;
}

/// Anthropic messages-API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn from_env_with_timeout(timeout: Duration) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CloneError::provider_terminal("anthropic", "ANTHROPIC_API_KEY is not set")
            })?;
        Self::with_base_url_and_timeout(api_key, DEFAULT_BASE_URL, timeout)
    }

    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url_and_timeout(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url_and_timeout(
        api_key: String,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CloneError::Network)?;

        Ok(Self {
            http,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.into(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn send(&self, request: MessagesRequest) -> Result<Completion> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CloneError::provider_transient("anthropic", format!("request timed out: {e}"))
                } else {
                    CloneError::provider_transient("anthropic", format!("transport failure: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            CloneError::provider_transient("anthropic", format!("malformed response: {e}"))
        })?;

        let text = parsed
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            usage: TokenUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

fn map_status_error(status: StatusCode, body: &str) -> CloneError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CloneError::provider_terminal("anthropic", message)
        }
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            CloneError::provider_terminal("anthropic", message)
        }
        _ => CloneError::provider_transient("anthropic", message),
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &str, max_output: u32) -> Result<Completion> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: max_output,
            temperature: 0.1,
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![ContentBlock::text(prompt)],
            }],
        };
        self.send(request).await
    }

    async fn compare_images(
        &self,
        image_a: &[u8],
        image_b: &[u8],
        instruction: &str,
    ) -> Result<Completion> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 2048,
            temperature: 0.1,
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![
                    ContentBlock::image(image_a),
                    ContentBlock::image(image_b),
                    ContentBlock::text(instruction),
                ],
            }],
        };
        self.send(request).await
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
}

impl ContentBlock {
    fn text(text: &str) -> Self {
        ContentBlock::Text {
            text: text.to_string(),
        }
    }

    fn image(png: &[u8]) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: "image/png".to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(png),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
