//! Google Gemini adapter (`models/{model}:generateContent`).
//!
//! `api_base_url` is the models collection URL; the model name and method are
//! appended per request. The API key travels as the `key` query parameter.
//! Only `data:` URL images can be forwarded (as `inline_data`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_status, http_client, read_json, transport_error};
use crate::config::ProviderConfig;
use crate::llm::{Completion, GenerateRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout_seconds: u64,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(cfg: &ProviderConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(cfg.timeout_seconds)?,
            api_base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
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

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.api_base_url, self.model)
    }

    pub async fn generate(&self, req: &GenerateRequest<'_>) -> Result<Completion, ProviderError> {
        let mut parts = vec![Part::Text { text: req.prompt.to_string() }];
        if let Some(att) = req.attachment {
            match att.as_inline_data() {
                Some((mime, data)) => parts.push(Part::InlineData {
                    inline_data: InlineData {
                        mime_type: mime.to_string(),
                        data: data.to_string(),
                    },
                }),
                None => warn!(model = %self.model, "Gemini needs inline image data; remote image URL dropped"),
            }
        }

        let payload = GenerateContentRequest {
            contents: vec![Content { role: Some("user"), parts }],
            system_instruction: req.system.map(|s| Content {
                role: None,
                parts: vec![Part::Text { text: s.to_string() }],
            }),
            generation_config: GenerationConfig {
                temperature: req.temperature.unwrap_or(self.temperature),
                max_output_tokens: req.max_tokens.or(self.max_tokens),
            },
        };

        let url = self.endpoint();
        debug!(model = %self.model, prompt_len = req.prompt.len(), "sending Gemini request");

        let mut http = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            http = http.query(&[("key", key)]);
        }

        let response = http
            .send()
            .await
            .map_err(|e| transport_error(e, &url, self.timeout_seconds))?;
        let response = check_status(response).await?;
        let parsed: GenerateContentResponse = read_json(response).await?;

        debug!(candidates = parsed.candidates.len(), "received Gemini response");

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(Completion::from_text(text))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Attachment;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiProvider {
        let cfg = ProviderConfig {
            enabled: true,
            api_base_url: format!("{}/v1beta/models/", server.uri()),
            model: "gemini-2.5-pro".into(),
            temperature: 0.4,
            max_tokens: None,
            timeout_seconds: 5,
        };
        GeminiProvider::new(&cfg, Some("g-key".into())).unwrap()
    }

    #[tokio::test]
    async fn concatenates_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "debug this"}]}],
                "systemInstruction": {"parts": [{"text": "sys"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Fix "}, {"text": "the loop."}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let out = provider(&server)
            .generate(&GenerateRequest::new("debug this").with_system("sys"))
            .await
            .unwrap();
        assert_eq!(out, Completion::Text("Fix the loop.".into()));
    }

    #[tokio::test]
    async fn data_url_image_sent_inline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "contents": [{"parts": [
                    {"text": "describe"},
                    {"inline_data": {"mime_type": "image/png", "data": "AAAA"}}
                ]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "a square"}]}}]
            })))
            .mount(&server)
            .await;

        let att = Attachment::image("data:image/png;base64,AAAA");
        let out = provider(&server)
            .generate(&GenerateRequest::new("describe").with_attachment(Some(&att)))
            .await
            .unwrap();
        assert_eq!(out.into_reply_text(), "a square");
    }

    #[tokio::test]
    async fn blocked_prompt_without_candidates_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let out = provider(&server).generate(&GenerateRequest::new("x")).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn bad_request_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).generate(&GenerateRequest::new("x")).await.unwrap_err();
        match err {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
