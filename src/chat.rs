//! Request handler: the chat pipeline behind `POST /api/chat`.
//!
//! ```text
//! request ─▶ follow-up? ─yes─▶ rewrite previous reply (follow-up provider)
//!               │no
//!               ▼
//!            route ─▶ knowledge lookup ─▶ provider call ─▶ store reply
//! ```
//!
//! [`ChatService`] owns every collaborator. It is built once at startup and
//! shared between request tasks behind an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ApiKeys, Config};
use crate::error::AppError;
use crate::knowledge::KnowledgeBase;
use crate::llm::providers::{self, Providers};
use crate::llm::retry::RetryPolicy;
use crate::llm::{Attachment, Completion, GenerateRequest, ProviderError, ProviderId};
use crate::router::{
    Classifier, KeywordRules, ProviderDescription, RequestedAgent, RouteError, Router,
    RoutingStrategy,
};
use crate::session::{MemorySessionStore, SessionStore};

const BASE_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub agent: RequestedAgent,
    /// `None` disables session memory for this request.
    pub session_id: Option<String>,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub text: String,
    pub provider: ProviderId,
    /// Agent label shown to the caller, e.g. `"Claude 3.5 + Knowledge"`.
    pub label: String,
    pub augmented: bool,
    /// The provider answered with nothing; `text` is the "No response" sentinel.
    pub empty: bool,
}

/// How follow-up rewrites are generated.
#[derive(Debug, Clone, Copy)]
pub struct FollowUp {
    pub provider: ProviderId,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for FollowUp {
    fn default() -> Self {
        Self {
            provider: ProviderId::Cohere,
            temperature: 0.5,
            max_tokens: 300,
        }
    }
}

/// One row of `GET /api/providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub label: &'static str,
    pub description: String,
    pub available: bool,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    Input(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Routing(#[from] RouteError),
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct ChatService {
    providers: Providers,
    router: Router,
    knowledge: KnowledgeBase,
    sessions: Arc<dyn SessionStore>,
    follow_up: FollowUp,
    retry: RetryPolicy,
    /// Per-attempt deadlines that override `retry.timeout` for one provider.
    timeouts: HashMap<ProviderId, Duration>,
}

impl ChatService {
    pub fn new(
        providers: Providers,
        router: Router,
        knowledge: KnowledgeBase,
        sessions: Arc<dyn SessionStore>,
        follow_up: FollowUp,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            providers,
            router,
            knowledge,
            sessions,
            follow_up,
            retry,
            timeouts: HashMap::new(),
        }
    }

    pub fn with_provider_timeout(mut self, id: ProviderId, timeout: Duration) -> Self {
        self.timeouts.insert(id, timeout);
        self
    }

    fn retry_for(&self, id: ProviderId) -> RetryPolicy {
        match self.timeouts.get(&id) {
            Some(&timeout) => RetryPolicy { timeout, ..self.retry },
            None => self.retry,
        }
    }

    /// Wire the service from resolved config. Fails on an unreadable
    /// knowledge file or a classifier strategy without a classifier provider.
    pub fn from_config(config: &Config, keys: &ApiKeys) -> Result<Self, AppError> {
        let providers = providers::build(&config.llm, keys)
            .map_err(|e| AppError::Provider(e.to_string()))?;

        let retry = RetryPolicy {
            max_retries: config.llm.retry.max_retries,
            backoff: Duration::from_millis(config.llm.retry.backoff_ms),
            ..RetryPolicy::default()
        };
        let timeout_of = |id: ProviderId| Duration::from_secs(config.llm.provider(id).timeout_seconds);

        let knowledge = match &config.knowledge_path {
            Some(path) => KnowledgeBase::load(path)?,
            None => KnowledgeBase::empty(),
        };

        let routing = &config.routing;
        let rules = routing
            .rules
            .clone()
            .map(KeywordRules::new)
            .unwrap_or_default();
        let mut router = Router::keyword(rules, routing.default_provider);
        if routing.strategy == RoutingStrategy::Classifier {
            let provider = providers.get(routing.classifier_provider).map_err(|_| {
                AppError::Config(format!(
                    "classifier provider '{}' is not enabled",
                    routing.classifier_provider
                ))
            })?;
            router = router.with_classifier(
                Classifier::new(
                    provider.clone(),
                    RetryPolicy {
                        timeout: timeout_of(routing.classifier_provider),
                        ..retry
                    },
                ),
                routing.on_classifier_error,
            );
        }

        for id in [routing.default_provider, routing.follow_up_provider] {
            if !providers.contains(id) {
                warn!(provider = %id, "routing refers to a disabled provider");
            }
        }

        let follow_up = FollowUp {
            provider: routing.follow_up_provider,
            ..FollowUp::default()
        };

        let service = Self::new(
            providers,
            router,
            knowledge,
            Arc::new(MemorySessionStore::new(config.session_capacity)),
            follow_up,
            retry,
        );
        Ok(ProviderId::ALL
            .into_iter()
            .fold(service, |svc, id| svc.with_provider_timeout(id, timeout_of(id))))
    }

    pub async fn handle(&self, req: ChatRequest) -> Result<ProviderReply, ChatError> {
        if req.message.trim().is_empty() {
            return Err(ChatError::Input("Missing message or agent".into()));
        }

        let request_id = Uuid::new_v4();
        let session_id = req.session_id.as_deref();
        debug!(%request_id, session_id = ?session_id, agent = ?req.agent, "chat request");

        if let (RequestedAgent::Auto, Some(sid)) = (req.agent, session_id) {
            if let Some(previous) = self.sessions.get(sid) {
                return self.rewrite_previous(request_id, sid, &req.message, &previous).await;
            }
        }

        let decision = self
            .router
            .route(&req.message, req.agent, req.attachment.is_some())
            .await?;

        let knowledge = self.knowledge.lookup(&req.message);
        let system = match &knowledge {
            Some(ctx) => format!("{BASE_SYSTEM_PROMPT} Here's relevant internal knowledge:\n\n{ctx}"),
            None => BASE_SYSTEM_PROMPT.to_string(),
        };
        let gen_req = GenerateRequest::new(&req.message)
            .with_system(&system)
            .with_attachment(req.attachment.as_ref());

        let completion = self.invoke(request_id, decision.provider, &gen_req).await?;

        let augmented = knowledge.is_some();
        let label = if augmented {
            format!("{} + Knowledge", decision.provider.label())
        } else {
            decision.provider.label().to_string()
        };
        Ok(self.finish(request_id, session_id, decision.provider, label, augmented, completion))
    }

    async fn rewrite_previous(
        &self,
        request_id: Uuid,
        session_id: &str,
        instruction: &str,
        previous: &str,
    ) -> Result<ProviderReply, ChatError> {
        let provider = self.follow_up.provider;
        info!(%request_id, %session_id, %provider, "follow-up rewrite of previous reply");

        let prompt = follow_up_prompt(instruction, previous);
        let gen_req = GenerateRequest::new(&prompt)
            .with_temperature(self.follow_up.temperature)
            .with_max_tokens(self.follow_up.max_tokens);

        let completion = self.invoke(request_id, provider, &gen_req).await?;
        let label = format!("{} + Instruction", provider.label());
        Ok(self.finish(request_id, Some(session_id), provider, label, false, completion))
    }

    async fn invoke(
        &self,
        request_id: Uuid,
        id: ProviderId,
        req: &GenerateRequest<'_>,
    ) -> Result<Completion, ProviderError> {
        let provider = self.providers.get(id)?;
        let started = Instant::now();
        tracing::trace!(%request_id, prompt = %req.prompt, system = ?req.system, "provider request");

        let result = self
            .retry_for(id)
            .run(id.key(), || provider.generate(req))
            .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(c) => info!(
                %request_id,
                provider = %id,
                model = %provider.model(),
                latency_ms,
                prompt_len = req.prompt.len(),
                empty = c.is_empty(),
                "provider call complete"
            ),
            Err(e) => warn!(%request_id, provider = %id, latency_ms, error = %e, "provider call failed"),
        }
        result
    }

    fn finish(
        &self,
        request_id: Uuid,
        session_id: Option<&str>,
        provider: ProviderId,
        label: String,
        augmented: bool,
        completion: Completion,
    ) -> ProviderReply {
        let empty = completion.is_empty();
        if empty {
            warn!(%request_id, %provider, "provider returned no text");
        }
        let text = completion.into_reply_text();

        // An empty turn still replaces the last reply; the sentinel itself is
        // never offered for rewriting, so the session is cleared instead.
        match (session_id, empty) {
            (Some(sid), false) => self.sessions.set(sid, &text),
            (Some(sid), true) => {
                self.sessions.delete(sid);
            }
            (None, _) => {}
        }

        ProviderReply {
            text,
            provider,
            label,
            augmented,
            empty,
        }
    }

    /// Replace provider descriptions used by the classifier prompt.
    /// Unknown ids are skipped; returns how many entries were applied.
    pub fn update_routing_preferences(
        &self,
        models: Vec<ProviderDescription>,
    ) -> Result<usize, ChatError> {
        if models.is_empty() {
            return Err(ChatError::Input("No routing models supplied".into()));
        }

        let mut catalog = self
            .router
            .catalog()
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut applied = 0;
        for model in models {
            let description = model.description.trim();
            match model.id.parse::<ProviderId>() {
                Ok(id) if !description.is_empty() => {
                    catalog.set(id, description);
                    applied += 1;
                }
                Ok(id) => warn!(provider = %id, "ignoring empty routing description"),
                Err(_) => warn!(id = %model.id, "ignoring routing description for unknown provider"),
            }
        }

        if applied == 0 {
            return Err(ChatError::Input("No known provider ids in routing update".into()));
        }
        info!(applied, "routing preferences updated");
        Ok(applied)
    }

    pub fn provider_catalog(&self) -> Vec<ProviderInfo> {
        let catalog = self
            .router
            .catalog()
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        catalog
            .iter()
            .map(|(id, description)| ProviderInfo {
                id,
                label: id.label(),
                description: description.to_string(),
                available: self.providers.contains(id),
            })
            .collect()
    }

    pub fn forget_session(&self, session_id: &str) -> bool {
        self.sessions.delete(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

fn follow_up_prompt(instruction: &str, previous: &str) -> String {
    format!("Instruction: {instruction}\n\nOriginal Text:\n{previous}")
}
