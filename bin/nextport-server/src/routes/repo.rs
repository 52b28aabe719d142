//! Repository routes: clone + list, batch migration, archive download.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nextport_core::session::ARCHIVE_NAME;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::repo::{
    DownloadQuery, ListFilesRequest, ListFilesResponse, MigrateRepoRequest, MigrateRepoResponse,
    SkippedFileResponse,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_react_files, migrate_repo, download_zip),
    components(schemas(
        ListFilesRequest,
        ListFilesResponse,
        MigrateRepoRequest,
        MigrateRepoResponse,
        SkippedFileResponse
    ))
)]
pub struct RepoApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/list-react-files", post(list_react_files))
        .route("/migrate-repo", post(migrate_repo))
        .route("/download-zip", get(download_zip))
}

/// Shallow-clone a repository and list its React source files.
#[utoipa::path(
    post,
    path = "/list-react-files",
    tag = "repo",
    request_body = ListFilesRequest,
    responses(
        (status = 200, description = "Repository cloned", body = ListFilesResponse),
        (status = 400, description = "Invalid repository URL"),
        (status = 413, description = "Repository too large"),
        (status = 500, description = "Clone failed"),
        (status = 503, description = "Too many active sessions"),
    )
)]
pub async fn list_react_files(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ListFilesRequest>,
) -> Result<Json<ListFilesResponse>, ServerError> {
    let cloned = state.migrator.clone_repo(&req.repo_url).await?;
    Ok(Json(cloned.into()))
}

/// Convert every source file of a cloned repository and zip the output.
///
/// Files that fail to convert are left out of the archive and listed under
/// `skipped`. The archive stays downloadable for the session TTL.
#[utoipa::path(
    post,
    path = "/migrate-repo",
    tag = "repo",
    request_body = MigrateRepoRequest,
    responses(
        (status = 200, description = "Archive ready", body = MigrateRepoResponse),
        (status = 404, description = "Unknown or expired session"),
        (status = 409, description = "Session already migrated or migrating"),
        (status = 500, description = "Archive failure"),
    )
)]
pub async fn migrate_repo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MigrateRepoRequest>,
) -> Result<Json<MigrateRepoResponse>, ServerError> {
    let report = state.migrator.migrate_repo(&req.repo_id).await?;
    Ok(Json(MigrateRepoResponse::from(&report)))
}

/// Download the archive produced by `/migrate-repo`.
#[utoipa::path(
    get,
    path = "/download-zip",
    tag = "repo",
    params(DownloadQuery),
    responses(
        (status = 200, description = "ZIP archive", content_type = "application/zip", body = Vec<u8>),
        (status = 404, description = "Archive not found or expired"),
    )
)]
pub async fn download_zip(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, ServerError> {
    // The lease keeps the reaper away until the bytes are in memory.
    let lease = state.migrator.open_archive(&q.repo_id).await?;
    let bytes = tokio::fs::read(lease.archive()).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ServerError::NotFound(format!("archive for {} not found", q.repo_id))
        } else {
            ServerError::Core(e.into())
        }
    })?;
    drop(lease);

    info!(repo_id = %q.repo_id, size = bytes.len(), "archive downloaded");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_NAME}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
