use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use super::models::{ProjectDetail, RunRequest};
use super::store::StoreHandle;
use super::workflow::{RunWorkflow, invoke_receipt};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: StoreHandle,
    pub workflow: Arc<RunWorkflow>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub text: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/invoke", post(invoke))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/{id}", get(get_project))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

/// Trigger a generation run. Fire-and-forget: the run executes in the
/// background and the caller polls `GET /api/projects/{id}` for progress.
async fn invoke(
    State(state): State<SharedState>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let event_id = Uuid::new_v4().to_string();
    let workflow = state.workflow.clone();
    let request = RunRequest { value: req.text };
    tokio::spawn(async move {
        // Failures are recorded on the project itself; nothing to return.
        if let Err(err) = workflow.run(request).await {
            error!(error = %err, "background run failed");
        }
    });
    Ok(Json(invoke_receipt(&event_id)))
}

async fn list_projects(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summaries = state
        .store
        .call(|db| db.list_projects(20))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "projects": summaries })))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetail>, ApiError> {
    let detail = state
        .store
        .call(move |db| {
            let Some(project) = db.get_project(&id)? else {
                return Ok(None);
            };
            let files = db.list_files(&project.id)?;
            Ok(Some(ProjectDetail { project, files }))
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound("Project not found".to_string())),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
