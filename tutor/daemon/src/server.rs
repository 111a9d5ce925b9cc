//! HTTP Surface
//!
//! Routes the chat stream endpoint and the ops endpoints onto the streaming
//! core:
//!
//! ```text
//!   POST /api/chat/stream ──► ChatStreamBody::validate ──► 400 on failure
//!                                      │
//!                                      ▼
//!                    StreamSession::run (spawned task)
//!                                      │ frames
//!                                      ▼
//!                 ChannelSink ──► mpsc ──► response body (SSE)
//!
//!   GET  /api/health    liveness
//!   GET  /api/sessions  registry snapshot
//! ```
//!
//! The response body owns the receiving half of the sink. When the client
//! goes away the body is dropped, the sink reports closed and the session
//! cancels its producer.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use tutor_core::{
    ChannelSink, ChatStreamBody, Producer, SessionRegistry, StreamSession, TutorConfig,
    ValidationError,
};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Active sessions
    pub registry: SessionRegistry,
    /// Producer bound to new sessions
    pub producer: Arc<dyn Producer>,
    /// Effective configuration
    pub config: Arc<TutorConfig>,
    /// Cancelled when the daemon starts shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create state with a fresh registry
    pub fn new(producer: Arc<dyn Producer>, config: TutorConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            producer,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Refuse new streams once `token` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

/// Errors returned before a stream opens
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The daemon is shutting down
    #[error("server shutting down")]
    ShuttingDown,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let permissive = state.config.cors_permissive;

    let router = Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/health", get(health))
        .route("/api/sessions", get(sessions))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if permissive {
        router.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
    } else {
        router
    }
}

async fn chat_stream(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request = ChatStreamBody::parse(&body).validate(state.config.max_message_length)?;
    if state.shutdown.is_cancelled() {
        return Err(ApiError::ShuttingDown);
    }

    let (sink, rx) = ChannelSink::new(state.config.channel_capacity);
    let session = StreamSession::new(
        &state.registry,
        Arc::clone(&state.producer),
        request,
        sink,
        state.config.session_config(),
    );
    // Shutdown may have swept the registry between the check above and admission
    if state.shutdown.is_cancelled() {
        session.cancel_token().cancel();
    }

    tokio::spawn(async move {
        let outcome = session.run().await;
        debug!(
            session_id = %outcome.id,
            state = %outcome.state,
            "Session task finished"
        );
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response())
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

async fn sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list_active();
    Json(json!({
        "active": sessions.len(),
        "sessions": sessions,
    }))
}
