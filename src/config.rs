//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file (default `config/default.toml`) into raw `serde`
//! structs, resolves defaults into the typed [`Config`], then applies the
//! `CHATROUTE_LOG_LEVEL` and `CHATROUTE_BIND` env overrides. Provider API keys
//! are read from the environment only, never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::llm::ProviderId;
use crate::router::{ClassifierFailurePolicy, RoutingRule, RoutingStrategy};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Resolved config ───────────────────────────────────────────────────────────

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind to.
    pub bind: String,
    /// Hard deadline for one chat request end to end.
    pub request_timeout_seconds: u64,
}

/// One upstream provider (`[llm.<name>]`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub enabled: bool,
    /// Endpoint URL (full path for OpenAI/Anthropic/Cohere, models
    /// collection URL for Gemini).
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Retry budget for provider calls (`[llm.retry]`).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Replace every provider with the offline echo provider.
    pub dummy: bool,
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub gemini: ProviderConfig,
    pub cohere: ProviderConfig,
    pub retry: RetryConfig,
}

impl LlmConfig {
    pub fn provider(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::Gpt4o => &self.openai,
            ProviderId::Claude => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
            ProviderId::Cohere => &self.cohere,
        }
    }
}

/// Routing configuration (`[routing]`).
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub strategy: RoutingStrategy,
    /// Provider used when no rule or category matches.
    pub default_provider: ProviderId,
    /// Provider that rewrites the previous reply on follow-ups.
    pub follow_up_provider: ProviderId,
    /// Provider that answers classification calls.
    pub classifier_provider: ProviderId,
    pub on_classifier_error: ClassifierFailurePolicy,
    /// Keyword rules in priority order; `None` uses the built-in set.
    pub rules: Option<Vec<RoutingRule>>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub routing: RoutingConfig,
    /// JSON knowledge file; `None` disables knowledge injection.
    pub knowledge_path: Option<PathBuf>,
    /// Session store cap; `None` keeps every session.
    pub session_capacity: Option<usize>,
}

/// Provider API keys, sourced from env.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub google: Option<String>,
    pub cohere: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        let key = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai: key("OPENAI_API_KEY"),
            anthropic: key("ANTHROPIC_API_KEY"),
            google: key("GOOGLE_API_KEY"),
            cohere: key("COHERE_API_KEY"),
        }
    }

    pub fn for_provider(&self, id: ProviderId) -> Option<String> {
        match id {
            ProviderId::Gpt4o => self.openai.clone(),
            ProviderId::Claude => self.anthropic.clone(),
            ProviderId::Gemini => self.google.clone(),
            ProviderId::Cohere => self.cohere.clone(),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    routing: RawRouting,
    #[serde(default)]
    knowledge: RawKnowledge,
    #[serde(default)]
    session: RawSession,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawLlm {
    #[serde(default)]
    dummy: bool,
    #[serde(default)]
    openai: RawProvider,
    #[serde(default)]
    anthropic: RawProvider,
    #[serde(default)]
    gemini: RawProvider,
    #[serde(default)]
    cohere: RawProvider,
    #[serde(default)]
    retry: RawRetry,
}

/// Every field optional; defaults differ per provider.
#[derive(Deserialize, Default)]
struct RawProvider {
    enabled: Option<bool>,
    api_base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_seconds: Option<u64>,
}

#[derive(Deserialize)]
struct RawRetry {
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    backoff_ms: u64,
}

impl Default for RawRetry {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawRouting {
    #[serde(default)]
    strategy: RoutingStrategy,
    #[serde(default = "default_provider")]
    default_provider: ProviderId,
    #[serde(default = "default_follow_up_provider")]
    follow_up_provider: ProviderId,
    #[serde(default = "default_classifier_provider")]
    classifier_provider: ProviderId,
    #[serde(default)]
    on_classifier_error: ClassifierFailurePolicy,
    #[serde(default)]
    rules: Option<Vec<RoutingRule>>,
}

impl Default for RawRouting {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::default(),
            default_provider: default_provider(),
            follow_up_provider: default_follow_up_provider(),
            classifier_provider: default_classifier_provider(),
            on_classifier_error: ClassifierFailurePolicy::default(),
            rules: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawKnowledge {
    path: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawSession {
    capacity: Option<usize>,
}

fn default_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_request_timeout_seconds() -> u64 { 120 }
fn default_max_retries() -> u32 { 1 }
fn default_backoff_ms() -> u64 { 250 }
fn default_provider() -> ProviderId { ProviderId::Gpt4o }
fn default_follow_up_provider() -> ProviderId { ProviderId::Cohere }
fn default_classifier_provider() -> ProviderId { ProviderId::Gemini }

/// Built-in endpoint/model/temperature for each provider.
struct ProviderDefaults {
    api_base_url: &'static str,
    model: &'static str,
    temperature: f32,
    max_tokens: Option<u32>,
}

fn provider_defaults(id: ProviderId) -> ProviderDefaults {
    match id {
        ProviderId::Gpt4o => ProviderDefaults {
            api_base_url: "https://api.openai.com/v1/chat/completions",
            model: "gpt-4o",
            temperature: 0.7,
            max_tokens: None,
        },
        ProviderId::Claude => ProviderDefaults {
            api_base_url: "https://api.anthropic.com/v1/messages",
            model: "claude-3-5-sonnet-20240620",
            temperature: 0.7,
            max_tokens: Some(1000),
        },
        ProviderId::Gemini => ProviderDefaults {
            api_base_url: "https://generativelanguage.googleapis.com/v1beta/models",
            model: "gemini-2.5-pro",
            temperature: 0.7,
            max_tokens: None,
        },
        ProviderId::Cohere => ProviderDefaults {
            api_base_url: "https://api.cohere.com/v2/chat",
            model: "command-r",
            temperature: 0.3,
            max_tokens: None,
        },
    }
}

fn resolve_provider(id: ProviderId, raw: RawProvider) -> ProviderConfig {
    let d = provider_defaults(id);
    ProviderConfig {
        enabled: raw.enabled.unwrap_or(true),
        api_base_url: raw.api_base_url.unwrap_or_else(|| d.api_base_url.to_string()),
        model: raw.model.unwrap_or_else(|| d.model.to_string()),
        temperature: raw.temperature.unwrap_or(d.temperature),
        max_tokens: raw.max_tokens.or(d.max_tokens),
        timeout_seconds: raw.timeout_seconds.unwrap_or(60),
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path`, or `config/default.toml`, then apply env
/// overrides. With no explicit path and no default file, built-in defaults
/// are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("CHATROUTE_LOG_LEVEL").ok();
    let bind_override = env::var("CHATROUTE_BIND").ok();

    let path = Path::new(config_path.unwrap_or(DEFAULT_CONFIG_PATH));
    if config_path.is_none() && !path.exists() {
        return from_raw(RawConfig::default(), log_level_override.as_deref(), bind_override.as_deref(), None);
    }
    load_from(path, log_level_override.as_deref(), bind_override.as_deref())
}

/// Internal loader. Accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    bind_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    from_raw(parsed, log_level_override, bind_override, path.parent())
}

/// Resolve raw values. A relative knowledge path is taken relative to the
/// config file's directory.
fn from_raw(
    parsed: RawConfig,
    log_level_override: Option<&str>,
    bind_override: Option<&str>,
    config_dir: Option<&Path>,
) -> Result<Config, AppError> {
    let s = parsed.server;
    let r = parsed.routing;

    if let Some(rules) = &r.rules {
        if let Some(bad) = rules.iter().find(|rule| rule.keywords.is_empty()) {
            return Err(AppError::Config(format!(
                "routing rule for '{}' has no keywords",
                bad.provider
            )));
        }
    }
    if parsed.session.capacity == Some(0) {
        return Err(AppError::Config("session.capacity must be greater than zero".into()));
    }

    // Directive strings are checked later by `EnvFilter`.
    let log_level = log_level_override.unwrap_or(&s.log_level);
    if !log_level.contains(['=', ',']) {
        crate::logger::parse_level(log_level).map_err(|e| AppError::Config(e.to_string()))?;
    }

    let knowledge_path = parsed.knowledge.path.map(|p| {
        let path = expand_home(&p);
        match config_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    });

    let llm = parsed.llm;
    Ok(Config {
        log_level: log_level.to_string(),
        server: ServerConfig {
            bind: bind_override.unwrap_or(&s.bind).to_string(),
            request_timeout_seconds: s.request_timeout_seconds,
        },
        llm: LlmConfig {
            dummy: llm.dummy,
            openai: resolve_provider(ProviderId::Gpt4o, llm.openai),
            anthropic: resolve_provider(ProviderId::Claude, llm.anthropic),
            gemini: resolve_provider(ProviderId::Gemini, llm.gemini),
            cohere: resolve_provider(ProviderId::Cohere, llm.cohere),
            retry: RetryConfig {
                max_retries: llm.retry.max_retries,
                backoff_ms: llm.retry.backoff_ms,
            },
        },
        routing: RoutingConfig {
            strategy: r.strategy,
            default_provider: r.default_provider,
            follow_up_provider: r.follow_up_provider,
            classifier_provider: r.classifier_provider,
            on_classifier_error: r.on_classifier_error,
            rules: r.rules,
        },
        knowledge_path,
        session_capacity: parsed.session.capacity,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: dummy LLMs, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        let mut cfg = from_raw(RawConfig::default(), None, None, None)
            .expect("built-in defaults must resolve");
        cfg.llm.dummy = true;
        cfg.llm.retry.backoff_ms = 1;
        cfg
    }
}
