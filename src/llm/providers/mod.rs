//! LLM provider implementations.
//!
//! [`build`] is the factory, called once at startup. Adding a new backend =
//! new module + new match arm. The HTTP helpers at the bottom are shared by
//! every network adapter.

pub mod anthropic;
pub mod cohere;
pub mod dummy;
pub mod gemini;
pub mod openai;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{error, info, warn};

use crate::config::{ApiKeys, LlmConfig};
use crate::llm::{LlmProvider, ProviderError, ProviderId};

// ── Registry ──────────────────────────────────────────────────────────────────

/// The set of adapters available to this process, keyed by provider.
#[derive(Debug, Clone, Default)]
pub struct Providers {
    inner: BTreeMap<ProviderId, LlmProvider>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ProviderId, provider: LlmProvider) -> Self {
        self.inner.insert(id, provider);
        self
    }

    pub fn get(&self, id: ProviderId) -> Result<&LlmProvider, ProviderError> {
        self.inner.get(&id).ok_or(ProviderError::NotConfigured(id))
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.inner.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Construct every enabled adapter from config.
///
/// API keys come from env only. A missing key is not fatal (keyless
/// OpenAI-compatible local servers exist) but it is logged.
/// `[llm] dummy = true` replaces every provider with the echo adapter.
pub fn build(config: &LlmConfig, keys: &ApiKeys) -> Result<Providers, ProviderError> {
    let mut providers = Providers::new();

    for id in ProviderId::ALL {
        if config.dummy {
            providers = providers.with(id, LlmProvider::Dummy(dummy::DummyProvider::echo()));
            continue;
        }

        let cfg = config.provider(id);
        if !cfg.enabled {
            info!(provider = %id, "provider disabled in config");
            continue;
        }

        let api_key = keys.for_provider(id);
        if api_key.is_none() {
            warn!(provider = %id, "no API key in environment, requests may be rejected upstream");
        }

        let provider = match id {
            ProviderId::Gpt4o => LlmProvider::OpenAi(openai::OpenAiProvider::new(cfg, api_key)?),
            ProviderId::Claude => {
                LlmProvider::Anthropic(anthropic::AnthropicProvider::new(cfg, api_key)?)
            }
            ProviderId::Gemini => LlmProvider::Gemini(gemini::GeminiProvider::new(cfg, api_key)?),
            ProviderId::Cohere => LlmProvider::Cohere(cohere::CohereProvider::new(cfg, api_key)?),
        };
        info!(provider = %id, model = %provider.model(), "provider ready");
        providers = providers.with(id, provider);
    }

    Ok(providers)
}

// ── Shared HTTP helpers ───────────────────────────────────────────────────────

pub(crate) fn http_client(timeout_seconds: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level `reqwest` failure onto the provider taxonomy.
pub(crate) fn transport_error(e: reqwest::Error, url: &str, timeout_seconds: u64) -> ProviderError {
    if e.is_timeout() {
        error!(%url, timeout_seconds, "LLM HTTP request timed out");
        ProviderError::Timeout(timeout_seconds)
    } else {
        error!(%url, error = %e, "LLM HTTP request failed (transport)");
        ProviderError::Request(e.to_string())
    }
}

/// Consume the response and return it if successful, or a classified error.
///
/// Error bodies are searched for the `{"error": {"message": …}}` envelope
/// (OpenAI, Anthropic, Gemini) and a top-level `{"message": …}` (Cohere).
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let message = error_message(&body);

    error!(%status, %message, "LLM request returned HTTP error");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        s if s.is_server_error() => ProviderError::Server(format!("HTTP {s}: {message}")),
        s => ProviderError::Status {
            status: s.as_u16(),
            message,
        },
    })
}

fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(ToString::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Deserialize a success body, logging the raw text on failure.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Request(format!("failed to read response body: {e}")))?;
    serde_json::from_str(&text).map_err(|e| {
        error!(error = %e, "failed to deserialize LLM response");
        tracing::trace!(body = %text, "unparseable LLM response body");
        ProviderError::Malformed(e.to_string())
    })
}
