//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("provider setup error: {0}")]
    Provider(String),

    #[error("knowledge base error: {0}")]
    Knowledge(String),

    #[error("server error: {0}")]
    Server(String),
}
