//! Delegated routing: ask an LLM which category a prompt belongs to.
//!
//! The model is told to answer with one word, but its reply is treated as
//! untrusted free text: [`Category::parse`] maps it loosely and callers
//! fall back to the default provider when nothing is recognised.

use tracing::debug;

use super::catalog::ProviderCatalog;
use crate::llm::retry::RetryPolicy;
use crate::llm::{Completion, GenerateRequest, LlmProvider, ProviderError, ProviderId};

const CLASSIFIER_TEMPERATURE: f32 = 0.2;
const CLASSIFIER_MAX_TOKENS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Multimodal,
    Summarization,
    LongContext,
    Coding,
    GoogleDocs,
    Creative,
    General,
    /// The model named a provider directly (`gpt`, `gemini`, …).
    Provider(ProviderId),
}

/// Accepted spellings, checked in order.
const CATEGORY_WORDS: &[(&str, Category)] = &[
    ("multimodal", Category::Multimodal),
    ("summarization", Category::Summarization),
    ("summarisation", Category::Summarization),
    ("long-context", Category::LongContext),
    ("long context", Category::LongContext),
    ("coding", Category::Coding),
    ("google-docs", Category::GoogleDocs),
    ("google docs", Category::GoogleDocs),
    ("creative", Category::Creative),
    ("general", Category::General),
];

impl Category {
    /// Map a raw classifier reply onto a category.
    ///
    /// Exact word first, then provider names, then a substring scan so
    /// replies like `"**Coding**."` or `"I'd pick gemini"` still resolve.
    pub fn parse(raw: &str) -> Option<Category> {
        let lower = raw.trim().to_lowercase();
        let word = lower.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');

        if let Some((_, c)) = CATEGORY_WORDS.iter().find(|(w, _)| *w == word) {
            return Some(*c);
        }
        if let Ok(id) = word.parse::<ProviderId>() {
            return Some(Category::Provider(id));
        }
        if let Some((_, c)) = CATEGORY_WORDS.iter().find(|(w, _)| lower.contains(w)) {
            return Some(*c);
        }
        [
            ("gpt", ProviderId::Gpt4o),
            ("claude", ProviderId::Claude),
            ("gemini", ProviderId::Gemini),
            ("cohere", ProviderId::Cohere),
        ]
        .into_iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, id)| Category::Provider(id))
    }

    /// Fixed category → provider table. `General` goes to `default`.
    pub fn provider(self, default: ProviderId) -> ProviderId {
        match self {
            Category::Multimodal => ProviderId::Gpt4o,
            Category::Summarization | Category::LongContext => ProviderId::Claude,
            Category::Coding | Category::GoogleDocs => ProviderId::Gemini,
            Category::Creative => ProviderId::Cohere,
            Category::General => default,
            Category::Provider(id) => id,
        }
    }
}

/// Remote classification collaborator.
#[derive(Debug, Clone)]
pub struct Classifier {
    provider: LlmProvider,
    retry: RetryPolicy,
}

impl Classifier {
    pub fn new(provider: LlmProvider, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Return the classifier's raw reply for `prompt`.
    pub async fn classify(
        &self,
        prompt: &str,
        catalog: &ProviderCatalog,
    ) -> Result<String, ProviderError> {
        let instruction = build_prompt(prompt, catalog);
        let req = GenerateRequest::new(&instruction)
            .with_temperature(CLASSIFIER_TEMPERATURE)
            .with_max_tokens(CLASSIFIER_MAX_TOKENS);

        let completion = self
            .retry
            .run("classifier", || self.provider.generate(&req))
            .await?;

        let raw = match completion {
            Completion::Text(t) => t,
            Completion::Empty => String::new(),
        };
        debug!(model = %self.provider.model(), reply = %raw, "classifier replied");
        Ok(raw)
    }
}

fn build_prompt(prompt: &str, catalog: &ProviderCatalog) -> String {
    let mut out = String::from(
        "You are a routing assistant for a multi-model chatbot. Classify the user's request \
         into exactly one of: multimodal, summarization, long-context, coding, google-docs, \
         creative, general.\n\nAvailable models and their specialities:\n",
    );
    for (id, description) in catalog.iter() {
        out.push_str(&format!("- {}: {}\n", id.label(), description));
    }
    out.push_str("\nReturn only one word.\n\nPrompt: ");
    out.push_str(prompt);
    out
}
