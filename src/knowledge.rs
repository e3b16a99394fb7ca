//! Static keyword-triggered knowledge base.
//!
//! Loaded once at startup from a JSON array of
//! `{ "keywords": [...], "response": "..." }` objects and never mutated.
//! Keywords are lowercased on load so lookups only lowercase the prompt.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeEntry {
    pub keywords: Vec<String>,
    pub response: String,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| KnowledgeEntry {
                keywords: e
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                response: e.response,
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Knowledge(format!("cannot read {}: {e}", path.display())))?;
        let entries: Vec<KnowledgeEntry> = serde_json::from_str(&raw)
            .map_err(|e| AppError::Knowledge(format!("malformed {}: {e}", path.display())))?;
        let kb = Self::new(entries);
        info!(path = %path.display(), entries = kb.len(), "knowledge base loaded");
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Responses of every entry with a keyword contained in `prompt`,
    /// newline-joined in list order. `None` when nothing matches.
    pub fn lookup(&self, prompt: &str) -> Option<String> {
        let lower = prompt.to_lowercase();
        let matches: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|e| e.response.as_str())
            .collect();

        if matches.is_empty() {
            return None;
        }
        debug!(matched = matches.len(), "knowledge entries matched");
        Some(matches.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry(keywords: &[&str], response: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            response: response.to_string(),
        }
    }

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new(vec![
            entry(&["location", "store"], "We have 12 locations."),
            entry(&["Hours"], "Open 7am to 9pm."),
            entry(&["bagel"], "Bagels are baked daily."),
        ])
    }

    #[test]
    fn no_keywords_returns_none() {
        assert_eq!(kb().lookup("tell me a joke"), None);
        assert_eq!(KnowledgeBase::empty().lookup("store hours"), None);
    }

    #[test]
    fn match_is_case_insensitive_both_ways() {
        assert_eq!(kb().lookup("What are your HOURS?"), Some("Open 7am to 9pm.".into()));
    }

    #[test]
    fn multiple_matches_join_in_list_order() {
        let out = kb().lookup("bagel store hours").unwrap();
        assert_eq!(out, "We have 12 locations.\nOpen 7am to 9pm.\nBagels are baked daily.");
    }

    #[test]
    fn entry_counted_once_even_if_several_keywords_hit() {
        let out = kb().lookup("store location").unwrap();
        assert_eq!(out, "We have 12 locations.");
    }

    #[test]
    fn load_from_json_file() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(br#"[{"keywords": ["Menu"], "response": "See the menu."}]"#).unwrap();
        let kb = KnowledgeBase::load(f.path()).unwrap();
        assert_eq!(kb.len(), 1);
        assert_eq!(kb.lookup("show me the menu"), Some("See the menu.".into()));
    }

    #[test]
    fn malformed_file_errors() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"{not json").unwrap();
        let err = KnowledgeBase::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("knowledge base error"));
    }
}
