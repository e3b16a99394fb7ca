//! Dummy LLM provider with no network access.
//!
//! The default mode echoes the prompt back prefixed with `[echo]`, which is
//! enough to exercise the whole request path without an API key. The other
//! modes script a fixed reply, an empty reply, a failure, a reply that
//! shows the system prompt, or an echo that arrives late.

use std::time::Duration;

use crate::llm::{Completion, GenerateRequest, ProviderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyReply {
    Echo,
    /// Replies with the system prompt it was given.
    EchoSystem,
    Fixed(String),
    Empty,
    Fail,
    /// Echoes after sleeping.
    Delayed(Duration),
}

#[derive(Debug, Clone)]
pub struct DummyProvider {
    reply: DummyReply,
}

impl DummyProvider {
    pub fn echo() -> Self {
        Self { reply: DummyReply::Echo }
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self { reply: DummyReply::Fixed(text.into()) }
    }

    pub fn empty() -> Self {
        Self { reply: DummyReply::Empty }
    }

    pub fn failing() -> Self {
        Self { reply: DummyReply::Fail }
    }

    pub fn echo_system() -> Self {
        Self { reply: DummyReply::EchoSystem }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self { reply: DummyReply::Delayed(delay) }
    }

    pub async fn generate(&self, req: &GenerateRequest<'_>) -> Result<Completion, ProviderError> {
        match &self.reply {
            DummyReply::Echo => Ok(Completion::Text(format!("[echo] {}", req.prompt))),
            DummyReply::EchoSystem => Ok(Completion::Text(format!("[system] {}", req.system.unwrap_or_default()))),
            DummyReply::Delayed(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Completion::Text(format!("[echo] {}", req.prompt)))
            }
            DummyReply::Fixed(text) => Ok(Completion::from_text(text.as_str())),
            DummyReply::Empty => Ok(Completion::Empty),
            DummyReply::Fail => Err(ProviderError::Auth("dummy provider configured to fail".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_prefixes_prompt() {
        let p = DummyProvider::echo();
        let out = p.generate(&GenerateRequest::new("hello")).await.unwrap();
        assert_eq!(out, Completion::Text("[echo] hello".into()));
    }

    #[tokio::test]
    async fn fixed_and_empty_modes() {
        let req = GenerateRequest::new("ignored");
        assert_eq!(
            DummyProvider::fixed("coding").generate(&req).await.unwrap(),
            Completion::Text("coding".into())
        );
        assert!(DummyProvider::empty().generate(&req).await.unwrap().is_empty());
        assert!(DummyProvider::failing().generate(&req).await.is_err());
    }

    #[tokio::test]
    async fn echo_system_shows_system_prompt() {
        let p = DummyProvider::echo_system();
        let out = p.generate(&GenerateRequest::new("hi").with_system("Be brief.")).await.unwrap();
        assert_eq!(out, Completion::Text("[system] Be brief.".into()));
        let out = p.generate(&GenerateRequest::new("hi")).await.unwrap();
        assert_eq!(out, Completion::Text("[system] ".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_echo_waits_before_replying() {
        let p = DummyProvider::delayed(Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        let out = p.generate(&GenerateRequest::new("late")).await.unwrap();
        assert_eq!(out, Completion::Text("[echo] late".into()));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
