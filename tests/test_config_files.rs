//! Tests for the shipped config/default.toml and config/knowledge.json

use std::path::Path;

use chatroute::config;
use chatroute::knowledge::KnowledgeBase;
use chatroute::llm::ProviderId;
use chatroute::router::{ClassifierFailurePolicy, KeywordRules, RoutingStrategy};

#[test]
fn test_default_config_loads() {
    let cfg = config::load_from(Path::new("config/default.toml"), None, None).unwrap();
    assert_eq!(cfg.server.bind, "127.0.0.1:8080");
    assert_eq!(cfg.routing.strategy, RoutingStrategy::Keyword);
    assert_eq!(cfg.routing.default_provider, ProviderId::Gpt4o);
    assert_eq!(cfg.routing.follow_up_provider, ProviderId::Cohere);
    assert_eq!(cfg.routing.on_classifier_error, ClassifierFailurePolicy::FallbackToKeywords);
    assert!(!cfg.llm.dummy);
    assert_eq!(cfg.llm.anthropic.max_tokens, Some(1000));
}

#[test]
fn test_default_rules_match_builtin_rules() {
    let cfg = config::load_from(Path::new("config/default.toml"), None, None).unwrap();
    let from_file = KeywordRules::new(cfg.routing.rules.unwrap());
    assert_eq!(from_file.rules(), KeywordRules::defaults().rules());
}

#[test]
fn test_knowledge_path_resolves_next_to_config() {
    let cfg = config::load_from(Path::new("config/default.toml"), None, None).unwrap();
    let path = cfg.knowledge_path.unwrap();
    assert!(path.ends_with("config/knowledge.json"));
    assert!(path.exists(), "knowledge.json missing");
}

#[test]
fn test_knowledge_file_parses() {
    let kb = KnowledgeBase::load(Path::new("config/knowledge.json")).unwrap();
    assert!(!kb.is_empty());
    let hit = kb.lookup("What are your opening HOURS?").unwrap();
    assert!(hit.contains("7am"));
}
