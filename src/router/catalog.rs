//! Routing preferences: what each provider should specialise in.
//!
//! The descriptions feed the classifier prompt and are editable at runtime
//! through the admin routing endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::llm::ProviderId;

/// One admin-supplied `{id, description}` pair. `id` may be a provider key
/// or label (`"gemini"`, `"Gemini 2.5"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescription {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCatalog {
    descriptions: BTreeMap<ProviderId, String>,
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        let descriptions = ProviderId::ALL
            .into_iter()
            .map(|id| (id, default_description(id).to_string()))
            .collect();
        Self { descriptions }
    }
}

fn default_description(id: ProviderId) -> &'static str {
    match id {
        ProviderId::Gpt4o => {
            "General knowledge, complex reasoning, casual conversation, math, multi-topic tasks and images."
        }
        ProviderId::Claude => "Summaries, document analysis and long-context reading.",
        ProviderId::Gemini => {
            "Coding help, debugging, technical explanations, developer tools, and software walkthroughs."
        }
        ProviderId::Cohere => {
            "Creative writing, conversational tone, tone rewriting, brand voice, and emotional writing."
        }
    }
}

impl ProviderCatalog {
    pub fn description(&self, id: ProviderId) -> &str {
        self.descriptions
            .get(&id)
            .map(String::as_str)
            .unwrap_or_else(|| default_description(id))
    }

    pub fn set(&mut self, id: ProviderId, description: impl Into<String>) {
        self.descriptions.insert(id, description.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderId, &str)> {
        self.descriptions.iter().map(|(id, d)| (*id, d.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_provider() {
        let catalog = ProviderCatalog::default();
        assert_eq!(catalog.iter().count(), ProviderId::ALL.len());
        assert!(catalog.description(ProviderId::Gemini).contains("debugging"));
    }

    #[test]
    fn set_replaces_description() {
        let mut catalog = ProviderCatalog::default();
        catalog.set(ProviderId::Cohere, "Marketing copy");
        assert_eq!(catalog.description(ProviderId::Cohere), "Marketing copy");
    }
}
