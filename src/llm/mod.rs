//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider adapters. Every adapter
//! takes a [`GenerateRequest`] and returns a [`Completion`]; wire types stay
//! private to each adapter module.
//!
//! Provider instances are shared immutable capabilities; clone them freely
//! (`reqwest::Client` is an `Arc` internally).

pub mod providers;
pub mod retry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reply text handed to callers when a provider answered with nothing usable.
pub const NO_RESPONSE: &str = "No response";

// ── Provider identity ─────────────────────────────────────────────────────────

/// Concrete upstream providers a request can be routed to.
///
/// `auto` is not a variant: it is resolved by the router before
/// any adapter sees the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gpt4o,
    Claude,
    Gemini,
    Cohere,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Gpt4o,
        ProviderId::Claude,
        ProviderId::Gemini,
        ProviderId::Cohere,
    ];

    /// Stable machine key (config files, JSON).
    pub fn key(self) -> &'static str {
        match self {
            ProviderId::Gpt4o => "gpt4o",
            ProviderId::Claude => "claude",
            ProviderId::Gemini => "gemini",
            ProviderId::Cohere => "cohere",
        }
    }

    /// Human-facing agent label returned to chat clients.
    pub fn label(self) -> &'static str {
        match self {
            ProviderId::Gpt4o => "GPT-4o",
            ProviderId::Claude => "Claude 3.5",
            ProviderId::Gemini => "Gemini 2.5",
            ProviderId::Cohere => "Cohere",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProviderId {
    type Err = ProviderError;

    /// Accepts keys (`gemini`), labels (`Gemini 2.5`) and short vendor
    /// aliases (`gpt`, `openai`, `anthropic`, `google`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        let id = match norm.as_str() {
            "gpt4o" | "gpt-4o" | "gpt" | "openai" => ProviderId::Gpt4o,
            "claude" | "claude 3.5" | "claude-3.5" | "anthropic" => ProviderId::Claude,
            "gemini" | "gemini 2.5" | "gemini-2.5" | "google" => ProviderId::Gemini,
            "cohere" | "command-r" => ProviderId::Cohere,
            _ => return Err(ProviderError::UnknownProvider(s.to_string())),
        };
        Ok(id)
    }
}

// ── Request / response ────────────────────────────────────────────────────────

/// Image attached to a chat message: an `https://` URL or a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub image_url: String,
}

impl Attachment {
    pub fn image(url: impl Into<String>) -> Self {
        Self { image_url: url.into() }
    }

    /// Split a `data:<mime>;base64,<payload>` URL into `(mime, payload)`.
    pub fn as_inline_data(&self) -> Option<(&str, &str)> {
        let rest = self.image_url.strip_prefix("data:")?;
        let (meta, data) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        Some((mime, data))
    }
}

/// One round-trip to a provider.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub system: Option<&'a str>,
    pub attachment: Option<&'a Attachment>,
    /// Per-call override; `None` uses the adapter's configured temperature.
    pub temperature: Option<f32>,
    /// Per-call override; `None` uses the adapter's configured limit.
    pub max_tokens: Option<u32>,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(prompt: &'a str) -> Self {
        Self {
            prompt,
            system: None,
            attachment: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: &'a str) -> Self {
        self.system = Some(system);
        self
    }

    pub fn with_attachment(mut self, attachment: Option<&'a Attachment>) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Outcome of a successful provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    /// The provider answered but carried no usable text.
    Empty,
}

impl Completion {
    /// Build from raw extracted text; blank text becomes [`Completion::Empty`].
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Completion::Empty
        } else {
            Completion::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Completion::Empty)
    }

    /// Text to show the caller, [`NO_RESPONSE`] for the empty case.
    pub fn into_reply_text(self) -> String {
        match self {
            Completion::Text(t) => t,
            Completion::Empty => NO_RESPONSE.to_string(),
        }
    }
}

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider not configured: {0}")]
    NotConfigured(ProviderId),
    #[error("provider request timed out after {0}s")]
    Timeout(u64),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("provider server error: {0}")]
    Server(String),
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Errors worth one more attempt: timeouts, transport failures,
    /// throttling and upstream 5xx.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Request(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Server(_)
        )
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `generate` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAi(providers::openai::OpenAiProvider),
    Anthropic(providers::anthropic::AnthropicProvider),
    Gemini(providers::gemini::GeminiProvider),
    Cohere(providers::cohere::CohereProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl LlmProvider {
    /// Send one request to the provider and return its completion.
    pub async fn generate(&self, req: &GenerateRequest<'_>) -> Result<Completion, ProviderError> {
        match self {
            LlmProvider::OpenAi(p) => p.generate(req).await,
            LlmProvider::Anthropic(p) => p.generate(req).await,
            LlmProvider::Gemini(p) => p.generate(req).await,
            LlmProvider::Cohere(p) => p.generate(req).await,
            LlmProvider::Dummy(p) => p.generate(req).await,
        }
    }

    /// Model name sent upstream, for logs.
    pub fn model(&self) -> &str {
        match self {
            LlmProvider::OpenAi(p) => p.model(),
            LlmProvider::Anthropic(p) => p.model(),
            LlmProvider::Gemini(p) => p.model(),
            LlmProvider::Cohere(p) => p.model(),
            LlmProvider::Dummy(_) => "dummy",
        }
    }
}
