//! HTTP API: crawl triggers and build-record queries.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use buildtrace_crawler::Crawler;
use buildtrace_shared::{AppConfig, BuildRecord};
use buildtrace_storage::StoragePort;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StoragePort>,
    pub crawler: Arc<dyn Crawler>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/process", post(process_build))
        .route("/api/v1/build/:id", get(get_build))
        .route("/service-metadata", get(service_metadata))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /api/v1/process
// ---------------------------------------------------------------------------

/// Trigger payload for processing one build.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    /// Storage key; generated when absent.
    #[serde(default)]
    build_id: Option<String>,
    build_url: String,
    /// Drop any existing record and crawl again.
    #[serde(default)]
    force_recrawl: bool,
}

/// Points the caller at the record that is being produced.
#[derive(Debug, Serialize)]
struct ProcessResponse {
    location: String,
}

async fn process_build(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Response {
    if request.build_url.is_empty() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "buildUrl is required");
    }

    let build_id = match request.build_id {
        Some(id) if !id.is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };
    let location = format!("/api/v1/build/{build_id}");

    let exists = match state.storage.has(&build_id).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(%build_id, error = %e, "unable to check for existing record");
            false
        }
    };

    if exists && !request.force_recrawl {
        return (StatusCode::FOUND, Json(ProcessResponse { location })).into_response();
    }

    if exists {
        if let Err(e) = state.storage.remove(&build_id).await {
            warn!(%build_id, error = %e, "unable to remove record for forced recrawl");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
        info!(%build_id, "removed record for forced recrawl");
    }

    // Seed a placeholder so queries can see the build is known while the
    // crawl is still running.
    let placeholder = BuildRecord::placeholder(&build_id);
    if let Err(e) = state.storage.put(&placeholder, &build_id).await {
        warn!(%build_id, error = %e, "unable to seed placeholder record");
    }

    if let Err(e) = state.crawler.start(&request.build_url, &build_id).await {
        warn!(%build_id, error = %e, "unable to dispatch crawl");
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string());
    }

    info!(%build_id, build_url = %request.build_url, "crawl dispatched");
    (StatusCode::CREATED, Json(ProcessResponse { location })).into_response()
}

// ---------------------------------------------------------------------------
// GET /api/v1/build/:id
// ---------------------------------------------------------------------------

async fn get_build(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.storage.get(&id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) if e.is_not_found() => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "build_id": id,
                "message": "build not found in database, has it been processed?",
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(build_id = %id, error = %e, "unable to query record");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// GET /service-metadata
// ---------------------------------------------------------------------------

async fn service_metadata(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "service_name": "buildtrace",
            "service_version": env!("CARGO_PKG_VERSION"),
            "description": "CI build log ingestion",
            "owner": state.config.owner,
            "storage_backend": state.config.storage.backend,
            "crawler_flavor": state.crawler.name(),
        })),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
