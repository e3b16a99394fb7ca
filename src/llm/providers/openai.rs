//! OpenAI chat completion adapter (`/v1/chat/completions`).
//!
//! Also covers OpenAI-compatible servers (Ollama, LM Studio…) when
//! `api_base_url` points at them. All wire types are private to this module.
//! An image attachment is sent as an `image_url` content part next to the
//! prompt text.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{check_status, http_client, read_json, transport_error};
use crate::config::ProviderConfig;
use crate::llm::{Completion, GenerateRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout_seconds: u64,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
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
        // gpt-5 family rejects an explicit temperature.
        let temperature = if self.model.starts_with("gpt-5") {
            None
        } else {
            Some(req.temperature.unwrap_or(self.temperature))
        };

        let mut messages = Vec::new();
        if let Some(sys) = req.system {
            messages.push(Message {
                role: "system",
                content: MessageContent::Text(sys.to_string()),
            });
        }
        let user_content = match req.attachment {
            Some(att) => MessageContent::Parts(vec![
                ContentPart::Text { text: req.prompt.to_string() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: att.image_url.clone() },
                },
            ]),
            None => MessageContent::Text(req.prompt.to_string()),
        };
        messages.push(Message { role: "user", content: user_content });

        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens: req.max_tokens.or(self.max_tokens),
        };

        debug!(
            model = %self.model,
            temperature = ?payload.temperature,
            prompt_len = req.prompt.len(),
            has_image = req.attachment.is_some(),
            "sending OpenAI request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full OpenAI request payload");
        }

        let mut http = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_base_url, self.timeout_seconds))?;
        let response = check_status(response).await?;
        let parsed: ChatCompletionResponse = read_json(response).await?;

        debug!(choices = parsed.choices.len(), "received OpenAI response");

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(Completion::from_text(text))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Attachment;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        let cfg = ProviderConfig {
            enabled: true,
            api_base_url: format!("{}/v1/chat/completions", server.uri()),
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: None,
            timeout_seconds: 5,
        };
        OpenAiProvider::new(&cfg, Some("test-key".into())).unwrap()
    }

    #[tokio::test]
    async fn extracts_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Hello!  "}}]
            })))
            .mount(&server)
            .await;

        let out = provider(&server)
            .generate(&GenerateRequest::new("hi").with_system("be brief"))
            .await
            .unwrap();
        assert_eq!(out, Completion::Text("Hello!".into()));
    }

    #[tokio::test]
    async fn image_is_sent_as_content_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "what is this?"},
                        {"type": "image_url", "image_url": {"url": "https://img.test/cat.png"}}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "a cat"}}]
            })))
            .mount(&server)
            .await;

        let att = Attachment::image("https://img.test/cat.png");
        let out = provider(&server)
            .generate(&GenerateRequest::new("what is this?").with_attachment(Some(&att)))
            .await
            .unwrap();
        assert_eq!(out.into_reply_text(), "a cat");
    }

    #[tokio::test]
    async fn null_content_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}}]
            })))
            .mount(&server)
            .await;

        let out = provider(&server).generate(&GenerateRequest::new("hi")).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).generate(&GenerateRequest::new("hi")).await.unwrap_err();
        match err {
            ProviderError::Auth(msg) => assert!(msg.contains("Incorrect API key")),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server).generate(&GenerateRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
