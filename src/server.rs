//! HTTP surface.
//!
//! | Method | Path               | Reply                                   |
//! |--------|--------------------|-----------------------------------------|
//! | POST   | `/api/assets`      | 202 `{jobId, images}` (multipart upload) |
//! | GET    | `/api/random`      | 202 `{jobId, images}` (sample corpus)    |
//! | GET    | `/jobs/:id`        | 200 `[ImageRecord]`, 404 if unknown      |
//! | GET    | `/jobs/:id/status` | 200 `{jobId, status, total, done, failed}` |
//! | GET    | `/api/health`      | 200 `{status, version, uptimeSeconds}`   |
//!
//! Submissions return as soon as the job exists; clients poll `/jobs/:id`.

use crate::config::ServiceConfig;
use crate::error::OcrJobError;
use crate::record::{ImageDescriptor, ImageRecord, JobSummary, Submission};
use crate::shutdown::Shutdown;
use crate::submit::JobSubmitter;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Multipart field carrying the uploaded images.
pub const UPLOAD_FIELD: &str = "userFiles";

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    submitter: JobSubmitter,
    upload_dir: Arc<PathBuf>,
    started_at: Instant,
}

impl AppState {
    pub fn new(submitter: JobSubmitter, config: &ServiceConfig) -> Self {
        Self {
            submitter,
            upload_dir: Arc::new(config.upload_dir.clone()),
            started_at: Instant::now(),
        }
    }
}

/// Build the service router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/assets", post(upload_assets))
        .route("/api/random", get(submit_random))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/status", get(get_job_status))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.listen_addr` and serve until `shutdown` is triggered.
///
/// In-flight requests are allowed to finish. Background recognition is not
/// stopped here; shut the processor down separately.
pub async fn serve(
    config: &ServiceConfig,
    submitter: JobSubmitter,
    shutdown: Shutdown,
) -> Result<(), OcrJobError> {
    let addr = config.listen_addr;
    let app = router(AppState::new(submitter, config), config.max_upload_bytes);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| OcrJobError::Server { addr, source })?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await
        .map_err(|source| OcrJobError::Server { addr, source })?;

    info!("HTTP server stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn upload_assets(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let dir = state.upload_dir.as_path();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| OcrJobError::StorageUnavailable {
            path: dir.to_path_buf(),
            source,
        })?;

    // Every part is read and sniffed before the first file is written.
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(ApiError::from_multipart)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;

        if image::guess_format(&bytes).is_err() {
            warn!("Rejected upload '{}': not a recognised image", original);
            return Err(ApiError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("'{original}' is not a supported image"),
            ));
        }
        parts.push((original, bytes));
    }

    let mut images = Vec::with_capacity(parts.len());
    for (original, bytes) in parts {
        match store_upload(dir, &original, &bytes).await {
            Ok(path) => images.push(ImageDescriptor::new(original, path)),
            Err(e) => {
                for image in &images {
                    let _ = tokio::fs::remove_file(&image.storage_path).await;
                }
                return Err(e.into());
            }
        }
    }

    if images.is_empty() {
        return Err(OcrJobError::Upload(format!("no files in field '{UPLOAD_FIELD}'")).into());
    }

    let (submission, handle) = state.submitter.submit(images).await?;
    handle.detach();
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

async fn submit_random(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let (submission, handle) = state.submitter.submit_sample().await?;
    handle.detach();
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ImageRecord>>, ApiError> {
    let job = state.submitter.store().get(&id).await?;
    Ok(Json(job.records))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    let job = state.submitter.store().get(&id).await?;
    Ok(Json(job.summary()))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Reduce a client-supplied name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(128).collect()
    }
}

/// Write `bytes` under a unique name, via a temporary file and a rename so
/// the sweeper and the engine never see a partial upload under its final name.
async fn store_upload(
    dir: &std::path::Path,
    original: &str,
    bytes: &[u8],
) -> Result<PathBuf, OcrJobError> {
    let stored = format!("{}-{}", Uuid::new_v4(), sanitize_filename(original));
    let path = dir.join(&stored);
    let partial = dir.join(format!(".{stored}.part"));
    let unavailable = |source| OcrJobError::StorageUnavailable {
        path: path.clone(),
        source,
    };

    tokio::fs::write(&partial, bytes).await.map_err(unavailable)?;
    if let Err(e) = tokio::fs::rename(&partial, &path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(unavailable(e));
    }
    Ok(path)
}

/// Error reply: a status code and `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Keep axum's status for multipart failures: 413 when the body limit
    /// is hit, 400 for a malformed stream.
    fn from_multipart(err: MultipartError) -> Self {
        let status = err.status();
        debug!("Multipart upload rejected ({}): {}", status, err.body_text());
        Self::new(status, err.body_text())
    }
}

impl From<OcrJobError> for ApiError {
    fn from(err: OcrJobError) -> Self {
        let status = match &err {
            OcrJobError::UnknownJob { .. } => StatusCode::NOT_FOUND,
            OcrJobError::EmptyBatch | OcrJobError::Upload(_) => StatusCode::BAD_REQUEST,
            OcrJobError::EmptyCorpus { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
