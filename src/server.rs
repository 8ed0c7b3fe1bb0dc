//! HTTP surface over [`Pipeline`].
//!
//! ```text
//! GET  /                               service status and endpoint list
//! GET  /health                         {status, active_tasks}
//! POST /upload                         multipart, repeated field `files`
//! POST /convert/:task_id
//! POST /merge/:task_id
//! POST /package/:task_id               optional JSON {filename}
//! GET  /progress/:task_id
//! GET  /download/:task_id/:filetype    merged | pdfs | docx | complete, ?filename=
//! ```
//!
//! Stages block (LibreOffice subprocesses, pdfium, disk I/O), so every
//! handler hands its stage to `tokio::task::spawn_blocking`. A client that
//! disconnects does not cancel the stage; it runs to completion and its
//! result shows up in the task's progress.

use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::{ArtifactKind, Pipeline, UploadFile};
use crate::registry::{TaskId, TaskProgress};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Largest accepted upload request body.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Handler error: a pipeline error or a malformed request.
#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    BadRequest(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Pipeline(e) => {
                let status = match e.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    warn!("Request failed: {}", e);
                }
                (
                    status,
                    json!({ "error": e.to_string(), "kind": e.kind(), "code": e.code() }),
                )
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg, "kind": ErrorKind::InvalidInput, "code": "bad_request" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the router with every endpoint, CORS and request tracing.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/convert/:task_id", post(convert))
        .route("/merge/:task_id", post(merge))
        .route("/package/:task_id", post(package))
        .route("/progress/:task_id", get(progress))
        .route("/download/:task_id/:filetype", get(download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn serve(addr: SocketAddr, pipeline: Arc<Pipeline>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// Run a blocking stage on the blocking pool.
async fn blocking<T, F>(pipeline: &Arc<Pipeline>, stage: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Pipeline) -> Result<T, PipelineError> + Send + 'static,
{
    let pipeline = Arc::clone(pipeline);
    let result = tokio::task::spawn_blocking(move || stage(&pipeline))
        .await
        .map_err(|e| PipelineError::Internal(format!("Stage task panicked: {e}")))?;
    Ok(result?)
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn index() -> Json<Value> {
    Json(json!({
        "service": "pdfbatch",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /upload",
            "POST /convert/:task_id",
            "POST /merge/:task_id",
            "POST /package/:task_id",
            "GET /progress/:task_id",
            "GET /download/:task_id/:filetype",
            "GET /health",
        ],
    }))
}

async fn health(State(pipeline): State<Arc<Pipeline>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "active_tasks": pipeline.registry().len(),
    }))
}

async fn upload(
    State(pipeline): State<Arc<Pipeline>>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        files.push(UploadFile::new(name, content.to_vec()));
    }

    let out = blocking(&pipeline, move |p| p.upload(files)).await?;
    Ok(Json(json!({
        "task_id": out.task_id,
        "msg": "Files uploaded",
        "file_count": out.file_count,
    })))
}

async fn convert(
    State(pipeline): State<Arc<Pipeline>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task_id = TaskId::parse(&task_id)?;
    let out = blocking(&pipeline, move |p| p.convert(&task_id)).await?;
    Ok(Json(json!({
        "msg": "Conversion finished",
        "results": out.results,
        "pdf_folder": out.pdf_folder,
        "success_count": out.success_count,
    })))
}

async fn merge(
    State(pipeline): State<Arc<Pipeline>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let task_id = TaskId::parse(&task_id)?;
    let out = blocking(&pipeline, move |p| p.merge(&task_id)).await?;
    let msg = if out.merged_file.is_some() {
        "Merge finished"
    } else {
        "No PDF files to merge"
    };
    Ok(Json(json!({
        "msg": msg,
        "merged_file": out.merged_file,
        "pdf_count": out.pdf_count,
        "appended": out.appended,
        "skipped": out.skipped,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct PackageRequest {
    filename: Option<String>,
}

async fn package(
    State(pipeline): State<Arc<Pipeline>>,
    Path(task_id): Path<String>,
    request: Option<Json<PackageRequest>>,
) -> ApiResult<Json<Value>> {
    let task_id = TaskId::parse(&task_id)?;
    let Json(request) = request.unwrap_or_default();
    let out = blocking(&pipeline, move |p| {
        p.package(&task_id, request.filename.as_deref())
    })
    .await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Package created",
        "filename": out.file_name,
        "folder_name": out.folder_name,
        "file_count": out.file_count,
    })))
}

async fn progress(
    State(pipeline): State<Arc<Pipeline>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskProgress>> {
    let task_id = TaskId::parse(&task_id)?;
    Ok(Json(pipeline.progress(&task_id)?))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    filename: Option<String>,
}

async fn download(
    State(pipeline): State<Arc<Pipeline>>,
    Path((task_id, filetype)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let task_id = TaskId::parse(&task_id)?;
    let kind: ArtifactKind = filetype.parse()?;
    let artifact = blocking(&pipeline, move |p| {
        p.download(&task_id, kind, query.filename.as_deref())
    })
    .await?;

    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| PipelineError::io("Failed to open artifact", &artifact.path, e))?;
    let disposition = format!("attachment; filename=\"{}\"", artifact.download_name);
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
