//! chatroute: a chat gateway that routes each prompt to the best-suited
//! LLM provider, with keyword-triggered knowledge injection and one-step
//! follow-up rewrites per session.

pub mod chat;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod logger;
pub mod router;
pub mod server;
pub mod session;
