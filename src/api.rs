//! HTTP surface: job submission, status polling and download of the
//! rendered file.

use crate::job::{ExportJob, JobRegistry};
use crate::project::Project;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub submit: mpsc::Sender<Arc<ExportJob>>,
    pub export_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/export", post(submit_export))
        .route("/api/export/:id", get(export_status))
        .route("/video/:id/video.mp4", get(download_video))
        .with_state(state)
}

/// Accept a project, register a job and queue it for export.
async fn submit_export(
    State(state): State<AppState>,
    Json(project): Json<Project>,
) -> Response {
    let job = Arc::new(ExportJob::new(project));
    state.registry.put(Arc::clone(&job));
    info!(id = %job.id, "accepted export job");

    if state.submit.send(Arc::clone(&job)).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Export queue is closed.").into_response();
    }

    Json(serde_json::json!({ "jobId": job.id })).into_response()
}

#[derive(Serialize)]
struct JobStatus {
    id: String,
    finished: bool,
    progress: f64,
}

async fn export_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id) {
        Some(job) => Json(JobStatus {
            id: job.id.clone(),
            finished: job.finished(),
            progress: job.progress(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Serve the rendered file from the job's workspace. The id doubles as a
/// directory name, so anything but plain letters is rejected outright.
async fn download_video(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphabetic()) {
        return (StatusCode::FORBIDDEN, "Invalid id.").into_response();
    }

    let path = state.export_dir.join(&id).join("rendered.mp4");
    match File::open(&path).await {
        Ok(file) => (
            [(header::CONTENT_TYPE, "video/mp4")],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
