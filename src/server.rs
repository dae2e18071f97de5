use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::models::{SummarizeRequest, TutorRequest};
use crate::tutor::{TurnOutcome, TutorService};

#[derive(Clone)]
struct AppState {
    config: AppConfig,
    tutor: TutorService,
}

pub async fn run_server(config: AppConfig, tutor: TutorService) -> Result<()> {
    let state = AppState {
        config: config.clone(),
        tutor,
    };
    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/chat",
            get(liveness)
                .post(chat_handler)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/summarize",
            get(liveness)
                .post(summarize_handler)
                .fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "hasKey": state.config.api_key.is_some(),
    }))
}

async fn method_not_allowed() -> ApiError {
    ApiError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: "method not allowed".to_string(),
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    body: String,
) -> Result<Response, ApiError> {
    require_api_key(&state)?;
    let request: TutorRequest = parse_body(&body)?;

    tracing::debug!("chat turn for session {}", request.session_id);
    match state.tutor.respond(request).await.map_err(ApiError::from)? {
        TurnOutcome::Reply(reply) => Ok(Json(reply).into_response()),
        TurnOutcome::UpstreamError { status, body } => Ok(upstream_passthrough(status, body)),
    }
}

async fn summarize_handler(
    State(state): State<AppState>,
    body: String,
) -> Result<Response, ApiError> {
    require_api_key(&state)?;
    let request: SummarizeRequest = parse_body(&body)?;

    if request.transcript.trim().is_empty() {
        return Err(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "transcript required".to_string(),
        });
    }

    let response = state
        .tutor
        .summarize_transcript(request)
        .await
        .map_err(ApiError::from)?;
    Ok(upstream_passthrough(response.status, response.body))
}

/// An absent body is treated as `{}` so every request field keeps its
/// permissive default; anything unparsable is a caller error.
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|err| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("invalid JSON body: {err}"),
    })
}

fn require_api_key(state: &AppState) -> Result<(), ApiError> {
    if state.config.api_key.is_none() {
        return Err(ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "missing OPENAI_API_KEY".to_string(),
        });
    }
    Ok(())
}

/// Relays an upstream answer unchanged; the UI distinguishes provider
/// failures (401/429/quota) from our own errors by the untouched status.
fn upstream_passthrough(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
