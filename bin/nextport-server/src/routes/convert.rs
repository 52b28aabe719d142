//! Single-file routes: reference-project fetch and snippet conversion.

use std::path::{Component, Path};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::convert::{FetchQuery, FetchResponse, MigrateRequest, MigrateResponse};
use crate::state::AppState;

/// Maximum accepted snippet length in bytes.
const MAX_SNIPPET_BYTES: usize = 128 * 1024; // 128 KiB

#[derive(OpenApi)]
#[openapi(
    paths(fetch_file, migrate),
    components(schemas(FetchResponse, MigrateRequest, MigrateResponse))
)]
pub struct ConvertApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fetch", get(fetch_file))
        .route("/migrate", post(migrate))
}

/// Accept only plain relative paths (no root, prefix or `..`).
fn validate_relative_path(file: &str) -> Result<&Path, ServerError> {
    if file.trim().is_empty() {
        return Err(ServerError::BadRequest("file must not be empty".into()));
    }
    let path = Path::new(file);
    let plain = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        return Err(ServerError::BadRequest(format!(
            "file must be a relative path inside the reference project: {file}"
        )));
    }
    Ok(path)
}

/// Read a file from the local reference project.
#[utoipa::path(
    get,
    path = "/fetch",
    tag = "convert",
    params(FetchQuery),
    responses(
        (status = 200, description = "File contents", body = FetchResponse),
        (status = 400, description = "Invalid path"),
        (status = 404, description = "File not found"),
    )
)]
pub async fn fetch_file(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FetchQuery>,
) -> Result<Json<FetchResponse>, ServerError> {
    let rel = validate_relative_path(&q.file)?;
    let target = state.config.reference_dir.join(rel);

    let is_file = tokio::fs::metadata(&target)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ServerError::NotFound(format!("{} not found", q.file)));
    }

    let code = tokio::fs::read_to_string(&target)
        .await
        .map_err(|e| ServerError::Internal(format!("failed to read {}: {e}", target.display())))?;
    debug!(file = %q.file, len = code.len(), "reference file served");
    Ok(Json(FetchResponse { code }))
}

/// Convert one React snippet to a Next.js App Router component.
#[utoipa::path(
    post,
    path = "/migrate",
    tag = "convert",
    request_body = MigrateRequest,
    responses(
        (status = 200, description = "Converted code", body = MigrateResponse),
        (status = 400, description = "Empty or oversized snippet"),
        (status = 502, description = "Model API failure"),
    )
)]
pub async fn migrate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MigrateRequest>,
) -> Result<Json<MigrateResponse>, ServerError> {
    if req.code.trim().is_empty() {
        return Err(ServerError::BadRequest("code must not be empty".into()));
    }
    if req.code.len() > MAX_SNIPPET_BYTES {
        return Err(ServerError::BadRequest(format!(
            "snippet too large ({} bytes); maximum is {} bytes",
            req.code.len(),
            MAX_SNIPPET_BYTES,
        )));
    }

    let converted_code = state.converter.convert(&req.code).await?;
    info!(
        model = %state.converter.model(),
        input_len = req.code.len(),
        output_len = converted_code.len(),
        "snippet converted"
    );
    Ok(Json(MigrateResponse { converted_code }))
}
