//! HTTP front end: axum routes over a shared [`ChatService`].
//!
//! ## URL layout
//!
//! ```text
//! POST   /api/chat             chat turn; session id in `x-session-id`
//! POST   /api/admin/routing    replace provider routing descriptions
//! GET    /api/providers        provider ids, labels, descriptions
//! GET    /api/health           liveness + session count
//! DELETE /api/sessions/{id}    forget one session
//! ```
//!
//! [`serve`] wires the shutdown [`CancellationToken`] into axum's graceful
//! shutdown.

mod api;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat::ChatService;
use crate::error::AppError;

// ── Shared request state ──────────────────────────────────────────────────────

/// Injected into every handler via [`axum::extract::State`].
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ChatService>,
    /// End-to-end deadline for one chat request.
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(service: Arc<ChatService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

pub async fn serve(
    bind_addr: &str,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("axum server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/chat",              post(api::chat))
        .route("/api/admin/routing",     post(api::update_routing))
        .route("/api/providers",         get(api::providers))
        .route("/api/health",            get(api::health))
        .route("/api/sessions/{id}",     delete(api::forget_session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeys, Config};

    #[tokio::test]
    async fn bind_failure_is_server_error() {
        let service = ChatService::from_config(&Config::test_default(), &ApiKeys::default()).unwrap();
        let state = ApiState::new(Arc::new(service), Duration::from_secs(1));
        let err = serve("no-port-here", state, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Server(msg) if msg.contains("no-port-here")));
    }
}
