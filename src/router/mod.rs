//! Provider selection.
//!
//! An explicit provider always wins. For `auto` the router either applies
//! ordered keyword rules or asks a classifier model for a category; an image
//! attachment short-circuits to the multimodal provider. Every outcome is a
//! concrete [`ProviderId`]; `auto` never reaches an adapter.

pub mod catalog;
pub mod classifier;
pub mod keyword;

pub use catalog::{ProviderCatalog, ProviderDescription};
pub use classifier::{Category, Classifier};
pub use keyword::{KeywordRules, RoutingRule};

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{ProviderError, ProviderId};

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedAgent {
    Auto,
    Provider(ProviderId),
}

impl FromStr for RequestedAgent {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(RequestedAgent::Auto)
        } else {
            s.parse().map(RequestedAgent::Provider)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    #[default]
    Keyword,
    Classifier,
}

/// What to do when the classifier call itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierFailurePolicy {
    #[default]
    FallbackToKeywords,
    Fail,
}

/// How a decision was reached, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    Explicit,
    Multimodal,
    Keyword,
    Classifier,
    /// No rule or category matched.
    Default,
    /// Classifier failed; keyword rules decided instead.
    Fallback,
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteSource::Explicit => "explicit",
            RouteSource::Multimodal => "multimodal",
            RouteSource::Keyword => "keyword",
            RouteSource::Classifier => "classifier",
            RouteSource::Default => "default",
            RouteSource::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub provider: ProviderId,
    pub source: RouteSource,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("classification failed: {0}")]
    Classification(#[source] ProviderError),
}

pub struct Router {
    rules: KeywordRules,
    default_provider: ProviderId,
    classifier: Option<Classifier>,
    on_classifier_error: ClassifierFailurePolicy,
    catalog: Arc<RwLock<ProviderCatalog>>,
}

impl Router {
    /// Keyword-only router.
    pub fn keyword(rules: KeywordRules, default_provider: ProviderId) -> Self {
        Self {
            rules,
            default_provider,
            classifier: None,
            on_classifier_error: ClassifierFailurePolicy::default(),
            catalog: Arc::new(RwLock::new(ProviderCatalog::default())),
        }
    }

    /// Switch `auto` routing to the classifier, keeping the keyword rules as
    /// the fallback path.
    pub fn with_classifier(mut self, classifier: Classifier, policy: ClassifierFailurePolicy) -> Self {
        self.classifier = Some(classifier);
        self.on_classifier_error = policy;
        self
    }

    pub fn strategy(&self) -> RoutingStrategy {
        if self.classifier.is_some() {
            RoutingStrategy::Classifier
        } else {
            RoutingStrategy::Keyword
        }
    }

    pub fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    /// Shared routing preferences (read by the classifier, written by admin).
    pub fn catalog(&self) -> &Arc<RwLock<ProviderCatalog>> {
        &self.catalog
    }

    pub async fn route(
        &self,
        prompt: &str,
        requested: RequestedAgent,
        has_attachment: bool,
    ) -> Result<RouteDecision, RouteError> {
        let decision = match requested {
            RequestedAgent::Provider(provider) => RouteDecision {
                provider,
                source: RouteSource::Explicit,
            },
            RequestedAgent::Auto if has_attachment => RouteDecision {
                provider: Category::Multimodal.provider(self.default_provider),
                source: RouteSource::Multimodal,
            },
            RequestedAgent::Auto => match &self.classifier {
                None => self.route_by_keywords(prompt, RouteSource::Keyword),
                Some(classifier) => self.route_by_classifier(classifier, prompt).await?,
            },
        };

        info!(provider = %decision.provider, source = %decision.source, "route resolved");
        Ok(decision)
    }

    fn route_by_keywords(&self, prompt: &str, on_match: RouteSource) -> RouteDecision {
        match self.rules.first_match(prompt) {
            Some(provider) => RouteDecision { provider, source: on_match },
            None => RouteDecision {
                provider: self.default_provider,
                source: if on_match == RouteSource::Fallback {
                    RouteSource::Fallback
                } else {
                    RouteSource::Default
                },
            },
        }
    }

    async fn route_by_classifier(
        &self,
        classifier: &Classifier,
        prompt: &str,
    ) -> Result<RouteDecision, RouteError> {
        // Snapshot: the std lock must not be held across the await.
        let catalog = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match classifier.classify(prompt, &catalog).await {
            Ok(raw) => match Category::parse(&raw) {
                Some(category) => {
                    debug!(?category, "classifier category recognised");
                    Ok(RouteDecision {
                        provider: category.provider(self.default_provider),
                        source: RouteSource::Classifier,
                    })
                }
                None => {
                    warn!(reply = %raw, "unrecognised classifier category, using default provider");
                    Ok(RouteDecision {
                        provider: self.default_provider,
                        source: RouteSource::Default,
                    })
                }
            },
            Err(e) => match self.on_classifier_error {
                ClassifierFailurePolicy::FallbackToKeywords => {
                    warn!(error = %e, "classifier failed, falling back to keyword rules");
                    Ok(self.route_by_keywords(prompt, RouteSource::Fallback))
                }
                ClassifierFailurePolicy::Fail => Err(RouteError::Classification(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::llm::retry::RetryPolicy;

    fn keyword_router() -> Router {
        Router::keyword(KeywordRules::defaults(), ProviderId::Gpt4o)
    }

    fn classifier_router(reply: DummyProvider, policy: ClassifierFailurePolicy) -> Router {
        keyword_router().with_classifier(
            Classifier::new(LlmProvider::Dummy(reply), RetryPolicy::default()),
            policy,
        )
    }

    #[test]
    fn requested_agent_parses_auto_and_providers() {
        assert_eq!("auto".parse::<RequestedAgent>().unwrap(), RequestedAgent::Auto);
        assert_eq!("AUTO".parse::<RequestedAgent>().unwrap(), RequestedAgent::Auto);
        assert_eq!(
            "Gemini 2.5".parse::<RequestedAgent>().unwrap(),
            RequestedAgent::Provider(ProviderId::Gemini)
        );
        assert!("nobody".parse::<RequestedAgent>().is_err());
    }

    #[tokio::test]
    async fn explicit_selection_always_wins() {
        let router = keyword_router();
        for prompt in ["debug this code", "write a poem", "summary please", ""] {
            for id in ProviderId::ALL {
                let d = router.route(prompt, RequestedAgent::Provider(id), true).await.unwrap();
                assert_eq!(d.provider, id);
                assert_eq!(d.source, RouteSource::Explicit);
            }
        }
    }

    #[tokio::test]
    async fn keyword_scenarios() {
        let router = keyword_router();
        let d = router.route("debug this Python function", RequestedAgent::Auto, false).await.unwrap();
        assert_eq!(d.provider, ProviderId::Gemini);
        assert_eq!(d.source, RouteSource::Keyword);

        let d = router
            .route("write a heartfelt birthday message", RequestedAgent::Auto, false)
            .await
            .unwrap();
        assert_eq!(d.provider, ProviderId::Cohere);

        let d = router.route("how far is the moon", RequestedAgent::Auto, false).await.unwrap();
        assert_eq!(d, RouteDecision { provider: ProviderId::Gpt4o, source: RouteSource::Default });
    }

    #[tokio::test]
    async fn attachment_routes_to_multimodal_provider() {
        let router = keyword_router();
        let d = router.route("debug this screenshot", RequestedAgent::Auto, true).await.unwrap();
        assert_eq!(d.provider, ProviderId::Gpt4o);
        assert_eq!(d.source, RouteSource::Multimodal);
    }

    #[tokio::test]
    async fn classifier_category_is_mapped() {
        let router = classifier_router(DummyProvider::fixed("long-context"), ClassifierFailurePolicy::Fail);
        assert_eq!(router.strategy(), RoutingStrategy::Classifier);
        let d = router.route("hello", RequestedAgent::Auto, false).await.unwrap();
        assert_eq!(d, RouteDecision { provider: ProviderId::Claude, source: RouteSource::Classifier });
    }

    #[tokio::test]
    async fn unknown_category_falls_back_to_default() {
        let router = classifier_router(DummyProvider::fixed("astrology"), ClassifierFailurePolicy::Fail);
        let d = router.route("debug my code", RequestedAgent::Auto, false).await.unwrap();
        assert_eq!(d, RouteDecision { provider: ProviderId::Gpt4o, source: RouteSource::Default });
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_keywords() {
        let router = classifier_router(DummyProvider::failing(), ClassifierFailurePolicy::FallbackToKeywords);
        let d = router.route("debug my code", RequestedAgent::Auto, false).await.unwrap();
        assert_eq!(d, RouteDecision { provider: ProviderId::Gemini, source: RouteSource::Fallback });

        let d = router.route("hi there", RequestedAgent::Auto, false).await.unwrap();
        assert_eq!(d, RouteDecision { provider: ProviderId::Gpt4o, source: RouteSource::Fallback });
    }

    #[tokio::test]
    async fn classifier_failure_can_fail_the_request() {
        let router = classifier_router(DummyProvider::failing(), ClassifierFailurePolicy::Fail);
        let err = router.route("debug my code", RequestedAgent::Auto, false).await.unwrap_err();
        assert!(matches!(err, RouteError::Classification(ProviderError::Auth(_))));
    }
}
