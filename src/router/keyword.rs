//! Ordered substring rules, the deterministic routing strategy.

use serde::Deserialize;

use crate::llm::ProviderId;

/// Route to `provider` when any keyword occurs in the lowercased prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoutingRule {
    pub provider: ProviderId,
    pub keywords: Vec<String>,
}

impl RoutingRule {
    pub fn new(provider: ProviderId, keywords: &[&str]) -> Self {
        Self {
            provider,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Rules checked in list order; the first hit wins.
#[derive(Debug, Clone)]
pub struct KeywordRules {
    rules: Vec<RoutingRule>,
}

impl KeywordRules {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| RoutingRule {
                provider: r.provider,
                keywords: r
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    /// Built-in priority order: summarisation, coding, creative writing.
    pub fn defaults() -> Self {
        Self::new(vec![
            RoutingRule::new(ProviderId::Claude, &["summary", "summarize", "summarise", "analyze", "analyse"]),
            RoutingRule::new(ProviderId::Gemini, &["code", "debug", "bug", "function", "compile", "stack trace"]),
            RoutingRule::new(
                ProviderId::Cohere,
                &["chat", "tone", "rewrite", "write", "poem", "story", "birthday", "heartfelt"],
            ),
        ])
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn first_match(&self, prompt: &str) -> Option<ProviderId> {
        let lower = prompt.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|r| r.provider)
    }
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_map_each_family() {
        let rules = KeywordRules::defaults();
        assert_eq!(rules.first_match("Give me a summary of this report"), Some(ProviderId::Claude));
        assert_eq!(rules.first_match("debug this Python function"), Some(ProviderId::Gemini));
        assert_eq!(rules.first_match("write a heartfelt birthday message"), Some(ProviderId::Cohere));
        assert_eq!(rules.first_match("fix the TONE of my email"), Some(ProviderId::Cohere));
        assert_eq!(rules.first_match("what is the capital of France"), None);
    }

    #[test]
    fn earlier_rule_wins_when_several_match() {
        let rules = KeywordRules::defaults();
        // "analyze" (rule 1) and "code" (rule 2) both occur.
        assert_eq!(rules.first_match("analyze this code"), Some(ProviderId::Claude));
        // "write" (rule 3) loses to "function" (rule 2).
        assert_eq!(rules.first_match("write a function"), Some(ProviderId::Gemini));
    }

    #[test]
    fn custom_rules_are_normalised() {
        let rules = KeywordRules::new(vec![RoutingRule::new(ProviderId::Gemini, &["  RUST ", ""])]);
        assert_eq!(rules.rules()[0].keywords, vec!["rust".to_string()]);
        assert_eq!(rules.first_match("Rust lifetimes"), Some(ProviderId::Gemini));
    }
}
