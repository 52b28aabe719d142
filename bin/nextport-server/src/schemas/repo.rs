use nextport_core::{ClonedRepo, MigrationReport};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListFilesRequest {
    pub repo_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListFilesResponse {
    pub repo_id: String,
    /// Source files found in the clone, relative and `/`-separated.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MigrateRepoRequest {
    pub repo_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SkippedFileResponse {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MigrateRepoResponse {
    /// Relative URL of the archive, e.g. `/download-zip?repo_id=…`.
    pub download_url: String,
    /// Number of files converted into the archive.
    pub converted: usize,
    /// Files left out of the archive and why.
    pub skipped: Vec<SkippedFileResponse>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    pub repo_id: String,
}

pub fn download_url(repo_id: &str) -> String {
    format!("/download-zip?repo_id={repo_id}")
}

impl From<ClonedRepo> for ListFilesResponse {
    fn from(repo: ClonedRepo) -> Self {
        Self {
            repo_id: repo.id,
            files: repo.files,
        }
    }
}

impl From<&MigrationReport> for MigrateRepoResponse {
    fn from(report: &MigrationReport) -> Self {
        Self {
            download_url: download_url(&report.id),
            converted: report.converted.len(),
            skipped: report
                .skipped
                .iter()
                .map(|s| SkippedFileResponse {
                    path: s.path.clone(),
                    reason: s.reason.clone(),
                })
                .collect(),
        }
    }
}
