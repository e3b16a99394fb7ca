//! Axum handlers for `/api/*` routes.
//!
//! Error bodies are always `{"error": "..."}`. Input problems answer 400
//! with a specific message; upstream failures answer 500 with a generic
//! message and the detail goes to the log only.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::ApiState;
use crate::chat::{ChatError, ChatRequest};
use crate::llm::Attachment;
use crate::router::{ProviderDescription, RequestedAgent};

const SESSION_HEADER: &str = "x-session-id";
const MISSING_INPUT: &str = "Missing message or agent";
const GENERIC_FAILURE: &str = "Something went wrong";

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct ChatBody {
    message: Option<String>,
    agent: Option<String>,
    /// `https://` or `data:` image URL.
    image: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct RoutingUpdate {
    models: Vec<ProviderDescription>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn json_error(msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": format!("{msg}") }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// POST /api/chat
pub(super) async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(e) => {
            warn!("rejected chat body: {e}");
            return (StatusCode::BAD_REQUEST, json_error(MISSING_INPUT)).into_response();
        }
    };

    let (Some(message), Some(agent)) = (non_blank(body.message), non_blank(body.agent)) else {
        return (StatusCode::BAD_REQUEST, json_error(MISSING_INPUT)).into_response();
    };
    let agent = match agent.parse::<RequestedAgent>() {
        Ok(agent) => agent,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, json_error(format!("Unknown agent: {agent}")))
                .into_response();
        }
    };

    let req = ChatRequest {
        message,
        agent,
        session_id: session_id(&headers),
        attachment: non_blank(body.image).map(Attachment::image),
    };

    match tokio::time::timeout(state.request_timeout, state.service.handle(req)).await {
        Ok(Ok(reply)) => (
            StatusCode::OK,
            Json(json!({ "reply": reply.text, "agent": reply.label })),
        )
            .into_response(),
        Ok(Err(ChatError::Input(msg))) => (StatusCode::BAD_REQUEST, json_error(msg)).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "chat request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error(GENERIC_FAILURE)).into_response()
        }
        Err(_) => {
            warn!(timeout_seconds = state.request_timeout.as_secs(), "chat request timed out");
            (StatusCode::GATEWAY_TIMEOUT, json_error("Request timed out")).into_response()
        }
    }
}

/// POST /api/admin/routing
pub(super) async fn update_routing(
    State(state): State<ApiState>,
    body: Result<Json<RoutingUpdate>, JsonRejection>,
) -> Response {
    let update = match body {
        Ok(Json(update)) => update,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.body_text() })),
            )
                .into_response();
        }
    };

    match state.service.update_routing_preferences(update.models) {
        Ok(updated) => (
            StatusCode::OK,
            Json(json!({ "success": true, "updated": updated })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// GET /api/providers
pub(super) async fn providers(State(state): State<ApiState>) -> Response {
    Json(json!({ "providers": state.service.provider_catalog() })).into_response()
}

/// GET /api/health
pub(super) async fn health(State(state): State<ApiState>) -> Response {
    Json(json!({
        "status": "ok",
        "providers": state.service.provider_count(),
        "sessions": state.service.session_count(),
    }))
    .into_response()
}

/// DELETE /api/sessions/{id}
pub(super) async fn forget_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    if state.service.forget_session(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, json_error("Session not found")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::chat::ChatService;
    use crate::server::build_router;
    use crate::config::{ApiKeys, Config};

    fn app() -> axum::Router {
        let service = ChatService::from_config(&Config::test_default(), &ApiKeys::default()).unwrap();
        build_router(ApiState::new(Arc::new(service), Duration::from_secs(5)))
    }

    fn post_json(uri: &str, body: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(sid) = session {
            builder = builder.header("x-session-id", sid);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_returns_reply_and_agent() {
        let resp = app()
            .oneshot(post_json("/api/chat", r#"{"message":"debug this","agent":"auto"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_json(resp).await;
        assert_eq!(body["agent"], "Gemini 2.5");
        assert_eq!(body["reply"], "[echo] debug this");
    }

    #[tokio::test]
    async fn missing_agent_is_bad_request() {
        let resp = app()
            .oneshot(post_json("/api/chat", r#"{"message":"hi"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(resp).await["error"], MISSING_INPUT);
    }

    #[tokio::test]
    async fn unknown_agent_is_bad_request() {
        let resp = app()
            .oneshot(post_json("/api/chat", r#"{"message":"hi","agent":"llama"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(resp).await["error"].as_str().unwrap().contains("llama"));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let resp = app().oneshot(post_json("/api/chat", "{nope", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_update_then_list_providers() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/admin/routing",
                r#"{"models":[{"id":"gemini","description":"Spreadsheet formulas"}]}"#,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_json(resp).await["success"], true);

        let resp = app
            .oneshot(Request::builder().uri("/api/providers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = read_json(resp).await;
        let gemini = body["providers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["id"] == "gemini")
            .unwrap()
            .clone();
        assert_eq!(gemini["description"], "Spreadsheet formulas");
        assert_eq!(gemini["label"], "Gemini 2.5");
    }

    #[tokio::test]
    async fn delete_unknown_session_is_not_found() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/sessions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
