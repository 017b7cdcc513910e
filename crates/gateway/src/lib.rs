//! HTTP API for Sleuth.
//!
//! Routes:
//! - `GET /health` liveness and version
//! - `POST /chat` with `{query, chat_history}`, answered with
//!   `{response, chunks, queries}`
//! - `POST /eval` with `{user_query, response, chunks, queries}`, answered
//!   with `{score, claims}`; 404 when evaluation is disabled
//!
//! Built on Axum; the agent is shared read-only between requests.

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use sleuth_agent::{AgentResponse, AgentService, EvalRequest, FaithfulnessJudge, FaithfulnessScore};
use sleuth_core::error::{Error, ToolError};
use sleuth_core::message::HistoryEntry;

/// Request bodies above this size are rejected with 413.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub agent: Arc<AgentService>,
    pub judge: Option<Arc<FaithfulnessJudge>>,
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: GatewayState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/eval", post(eval_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins))
                .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES)),
        )
}

/// CORS for the configured origins; none configured means same-origin only.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    if origins.is_empty() {
        cors
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Start the gateway HTTP server.
pub async fn start(config: sleuth_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let agent = Arc::new(sleuth_agent::build_service(&config).await?);
    info!(tools = ?agent.tool_names(), "Agent ready");

    let judge = if config.eval.enabled {
        Some(Arc::new(sleuth_agent::build_judge(&config).await?))
    } else {
        None
    };

    let app = build_router(GatewayState { agent, judge }, &config.gateway.allowed_origins);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,

    #[serde(default)]
    pub chat_history: Vec<HistoryEntry>,
}

async fn chat_handler(
    State(state): State<GatewayState>,
    Json(payload): Json<ChatRequest>,
) -> Json<AgentResponse> {
    info!(
        query_len = payload.query.len(),
        history = payload.chat_history.len(),
        "Chat request received"
    );

    Json(
        state
            .agent
            .get_response(&payload.query, &payload.chat_history)
            .await,
    )
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

async fn eval_handler(
    State(state): State<GatewayState>,
    Json(payload): Json<EvalRequest>,
) -> Result<Json<FaithfulnessScore>, (StatusCode, Json<ErrorResponse>)> {
    let Some(judge) = state.judge else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                detail: "answer evaluation is disabled".into(),
            }),
        ));
    };

    info!(
        chunks = payload.chunks.len(),
        queries = payload.queries.len(),
        "Eval request received"
    );

    judge.evaluate(&payload).await.map(Json).map_err(|e| {
        let status = match &e {
            Error::Config { .. } | Error::Tool(ToolError::StatementRejected(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %e, status = status.as_u16(), "Eval failed");
        (status, Json(ErrorResponse { detail: e.to_string() }))
    })
}
