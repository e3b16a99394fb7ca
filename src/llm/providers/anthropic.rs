//! Anthropic Messages API adapter (`/v1/messages`).
//!
//! Text content blocks of the reply are joined with newlines; any other block
//! type is ignored. The API requires `max_tokens`, so a default is always
//! sent.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_status, http_client, read_json, transport_error};
use crate::config::ProviderConfig;
use crate::llm::{Completion, GenerateRequest, ProviderError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_seconds: u64,
    api_key: Option<String>,
}

impl AnthropicProvider {
    pub fn new(cfg: &ProviderConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(cfg.timeout_seconds)?,
            api_base_url: cfg.api_base_url.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout_seconds: cfg.timeout_seconds,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, req: &GenerateRequest<'_>) -> Result<Completion, ProviderError> {
        if req.attachment.is_some() {
            warn!(model = %self.model, "image attachments are not forwarded to Anthropic; sending text only");
        }

        let payload = MessagesRequest {
            model: &self.model,
            max_tokens: req.max_tokens.unwrap_or(self.max_tokens),
            system: req.system,
            messages: vec![WireMessage { role: "user", content: req.prompt }],
            temperature: req.temperature.unwrap_or(self.temperature),
        };

        debug!(model = %self.model, prompt_len = req.prompt.len(), "sending Anthropic request");

        let mut http = self
            .client
            .post(&self.api_base_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);
        if let Some(key) = &self.api_key {
            http = http.header("x-api-key", key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_base_url, self.timeout_seconds))?;
        let response = check_status(response).await?;
        let parsed: MessagesResponse = read_json(response).await?;

        debug!(blocks = parsed.content.len(), "received Anthropic response");

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Completion::from_text(text))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}
