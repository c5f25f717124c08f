// HTTP server module
// Chat, streaming chat and health endpoints over the query service


use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::rag::RagService;
use crate::{ErrorKind, RagError, Result};

/// Shown to the user in place of an answer when the pipeline fails
pub const APOLOGY: &str =
    "Sorry, I ran into a problem while answering your question. Please try again in a moment.";

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const STREAM_BUFFER: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagService>,
    pub config: Arc<Config>,
    pub request_timeout: Duration,
}

impl AppState {
    #[inline]
    pub fn new(rag: Arc<RagService>, config: Arc<Config>) -> Self {
        let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
        Self {
            rag,
            config,
            request_timeout,
        }
    }

    #[inline]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RagError> for ErrorBody {
    #[inline]
    fn from(error: &RagError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Build the router with CORS and request tracing
#[inline]
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins; `*` allows any origin
#[inline]
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Bind the configured address and serve until Ctrl-C
#[inline]
pub async fn serve(config: Arc<Config>, rag: Arc<RagService>) -> Result<()> {
    let address = config.bind_address();
    let app = create_app(AppState::new(rag, config));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Query service listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Query service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Extract a non-blank query or render the 400 response
fn read_query(
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<String, Response> {
    let Json(request) = payload.map_err(|rejection| bad_request(&rejection.body_text()))?;

    if request.query.trim().is_empty() {
        return Err(bad_request("Query must not be empty"));
    }
    Ok(request.query)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Answers questions about the textbook from its indexed content",
        "endpoints": ["POST /api/chat", "POST /api/chat/stream", "GET /health"],
    }))
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let missing = state.config.missing_required();

    if missing.is_empty() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "collection": state.config.qdrant.collection,
                "model": state.config.gemini.generation_model,
            })),
        )
            .into_response()
    } else {
        warn!("Health check failed, missing: {}", missing.join(", "));
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "missing": missing })),
        )
            .into_response()
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let query = match read_query(payload) {
        Ok(query) => query,
        Err(response) => return response,
    };
    debug!("Chat request ({} chars)", query.chars().count());

    let rag = Arc::clone(&state.rag);
    let task = tokio::task::spawn_blocking(move || rag.answer(&query));

    let result = match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(RagError::Other(anyhow::anyhow!(
            "Answer task failed: {}",
            join_error
        ))),
        Err(_) => Err(RagError::Timeout(state.request_timeout)),
    };

    let body = match result {
        Ok(response) => ChatResponse {
            response,
            error: None,
        },
        Err(e) => {
            error!("Failed to answer chat request: {}", e);
            ChatResponse {
                response: APOLOGY.to_string(),
                error: Some(ErrorBody::from(&e)),
            }
        }
    };

    Json(body).into_response()
}

fn ndjson_line(value: &serde_json::Value) -> String {
    let mut line = value.to_string();
    line.push('\n');
    line
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let query = match read_query(payload) {
        Ok(query) => query,
        Err(response) => return response,
    };
    debug!("Streaming chat request ({} chars)", query.chars().count());

    let (tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let rag = Arc::clone(&state.rag);

    tokio::task::spawn_blocking(move || {
        let result = rag.answer_stream(&query, &mut |fragment| {
            tx.blocking_send(ndjson_line(&json!({ "text": fragment }))).is_ok()
        });

        if let Err(e) = result {
            error!("Failed to stream chat response: {}", e);
            let line = ndjson_line(&json!({ "error": ErrorBody::from(&e) }));
            if tx.blocking_send(line).is_err() {
                debug!("Client went away before the error was delivered");
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response()
}
