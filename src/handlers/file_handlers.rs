//! HTTP handlers for the attachment hooks, the presigned redirect endpoint,
//! the batch trigger and raw content reads. Each handler delegates to
//! `OffloadService`; object bodies are streamed, never buffered.

use crate::{
    errors::AppError,
    models::attachment::AttachmentRecord,
    services::{
        batch::BatchReport,
        offload_service::OffloadService,
        redirector::{KEY_NOT_FOUND, ReadTarget},
        rewriter::MigrationOutcome,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct GenerateFileQuery {
    pub key: Option<String>,
}

/// `GET /api/method/attachments.generate_file?key=...`
///
/// Redirects to a presigned URL for `key`, or answers `Key not found.` when
/// no key is given.
pub async fn generate_file(
    State(service): State<OffloadService>,
    Query(q): Query<GenerateFileQuery>,
) -> Result<Response, AppError> {
    match service.resolve_read(q.key.as_deref()).await? {
        ReadTarget::Redirect(presigned) => Ok(Redirect::to(&presigned.url).into_response()),
        ReadTarget::KeyMissing => Ok((StatusCode::OK, KEY_NOT_FOUND).into_response()),
    }
}

/// `POST /api/method/attachments.migrate_existing_files`
pub async fn migrate_existing_files(
    State(service): State<OffloadService>,
) -> Result<Json<bool>, AppError> {
    let report: BatchReport = service.migrate_existing_files().await?;
    info!(?report, "batch migration triggered over HTTP");
    Ok(Json(true))
}

/// `GET /files/{name}/content`: stream the object behind a record.
pub async fn file_content(
    State(service): State<OffloadService>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let (file_name, chunks) = service.read_bytes(&name).await?;

    let mut response = Response::new(Body::from_stream(chunks));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let disposition = format!("attachment; filename=\"{}\"", file_name.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `POST /hooks/file-created`: called by the host after an upload.
pub async fn file_created(
    State(service): State<OffloadService>,
    Json(record): Json<AttachmentRecord>,
) -> Result<Json<MigrationOutcome>, AppError> {
    let outcome = service.on_file_created(&record).await?;
    Ok(Json(outcome))
}

/// `POST /hooks/file-deleted`: called by the host after a record is removed.
pub async fn file_deleted(
    State(service): State<OffloadService>,
    Json(record): Json<AttachmentRecord>,
) -> Result<StatusCode, AppError> {
    service.on_file_deleted(&record).await?;
    Ok(StatusCode::NO_CONTENT)
}
