//! Cohere chat adapter (v2 `/chat`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_status, http_client, read_json, transport_error};
use crate::config::ProviderConfig;
use crate::llm::{Completion, GenerateRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct CohereProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout_seconds: u64,
    api_key: Option<String>,
}

impl CohereProvider {
    pub fn new(cfg: &ProviderConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(cfg.timeout_seconds)?,
            api_base_url: cfg.api_base_url.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            timeout_seconds: cfg.timeout_seconds,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, req: &GenerateRequest<'_>) -> Result<Completion, ProviderError> {
        if req.attachment.is_some() {
            warn!(model = %self.model, "image attachments are not forwarded to Cohere; sending text only");
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = req.system {
            messages.push(WireMessage { role: "system", content: sys });
        }
        messages.push(WireMessage { role: "user", content: req.prompt });

        let payload = ChatRequest {
            model: &self.model,
            messages,
            temperature: req.temperature.unwrap_or(self.temperature),
            max_tokens: req.max_tokens.or(self.max_tokens),
        };

        debug!(model = %self.model, prompt_len = req.prompt.len(), "sending Cohere request");

        let mut http = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_base_url, self.timeout_seconds))?;
        let response = check_status(response).await?;
        let parsed: ChatResponse = read_json(response).await?;

        let text: String = parsed
            .message
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        debug!(reply_len = text.len(), "received Cohere response");
        Ok(Completion::from_text(text))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(default)]
    text: Option<String>,
}
