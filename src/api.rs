//! REST API server for the research agent
//!
//! One process-wide session behind a mutex, so queries run one at a time.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::ResearchAgent;
use crate::error::ResearchError;
use crate::memory::Session;
use crate::presenter;
use crate::tools::ToolSummary;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub query: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<ResearchAgent>,
    pub session: Arc<Mutex<Session>>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query must not be empty".into())),
        );
    }

    info!(query = %req.query, "Received query");

    let mut session = state.session.lock().await;

    match state.agent.process(&req.query, &mut session).await {
        Ok(outcome) => {
            let rendered = presenter::render_outcome(&outcome);
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "intent": outcome.query.intent,
                    "entities": outcome.query.entities,
                    "ambiguity": outcome.query.ambiguity,
                    "reply": outcome.reply,
                    "report": outcome.report,
                    "rendered": rendered,
                }))),
            )
        }
        Err(e) => {
            warn!(error = %e, "Query rejected");
            let status = match e {
                ResearchError::PlanConstruction(_) | ResearchError::NoPriorAnalysis(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// Session Endpoints
/// =============================

async fn session_summary(State(state): State<ApiState>) -> Json<ApiResponse> {
    let session = state.session.lock().await;
    Json(ApiResponse::success(session.summary()))
}

async fn session_history(State(state): State<ApiState>) -> Json<ApiResponse> {
    let session = state.session.lock().await;
    let entries: Vec<serde_json::Value> = session
        .history()
        .iter()
        .map(|e| {
            serde_json::json!({
                "query_id": e.query.query_id,
                "text": e.query.text,
                "intent": e.query.intent,
                "received_at": e.query.received_at,
                "tasks": e.report.task_order(),
                "success": e.report.success,
            })
        })
        .collect();
    Json(ApiResponse::success(entries))
}

async fn clear_session(State(state): State<ApiState>) -> Json<ApiResponse> {
    let mut session = state.session.lock().await;
    session.clear();
    Json(ApiResponse::success(serde_json::json!({
        "session_id": session.session_id,
    })))
}

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    let tools: Vec<ToolSummary> = state
        .agent
        .registry()
        .list()
        .into_iter()
        .map(|d| d.summary())
        .collect();
    Json(ApiResponse::success(tools))
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<ResearchAgent>, session: Session) -> Router {
    let state = ApiState {
        agent,
        session: Arc::new(Mutex::new(session)),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(run_query))
        .route("/api/session", get(session_summary))
        .route("/api/session/clear", post(clear_session))
        .route("/api/history", get(session_history))
        .route("/api/tools", get(list_tools))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<ResearchAgent>,
    session: Session,
    port: u16,
) -> crate::Result<()> {
    let router = create_router(agent, session);

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API Server listening on http://{}", addr);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
