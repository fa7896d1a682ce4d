use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub name: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub greeting: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub html: String,
    pub cited_urls: Vec<String>,
}

pub async fn run_server(bind_addr: &str, state: AppState) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/session", post(create_session))
        .route("/api/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Json<SessionResponse> {
    let now = chrono::Utc::now().timestamp();
    let session_id = state
        .sessions
        .create(request.name, request.location, now)
        .await;
    let greeting = state
        .sessions
        .greeting(&session_id)
        .await
        .unwrap_or_default();
    Json(SessionResponse {
        session_id,
        greeting,
    })
}

/// The chat endpoint never surfaces pipeline errors: the engine already
/// degrades to a generic message, so the only failure here is an unknown
/// or expired session.
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let history = state
        .sessions
        .history(&request.session_id, now)
        .await
        .ok_or(ApiError::UnknownSession)?;

    let answer = state.engine.answer(&history, &request.message).await;

    state
        .sessions
        .append_exchange(&request.session_id, &request.message, &answer.text, now)
        .await;

    Ok(Json(ChatResponse {
        html: answer.html,
        cited_urls: answer.cited_urls,
    }))
}

#[derive(Debug)]
enum ApiError {
    UnknownSession,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::UnknownSession => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "unknown or expired session"})),
            )
                .into_response(),
        }
    }
}
