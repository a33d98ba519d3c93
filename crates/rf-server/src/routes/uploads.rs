//! Upload session route handlers.
//!
//! Every `POST /api/uploads` request opens a fresh session directory
//! `uploads/<upload_id>/` and streams each multipart file part into it.
//! Jobs later reference a source as `(upload_id, file_name)`.

use std::path::Path;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use rf_core::events::EventPayload;
use rf_core::{Error, UploadId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::parse_id;

/// Multipart field names accepted as files.
const FILE_FIELDS: &[&str] = &["files", "file"];

/// Response for a completed upload.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    #[schema(value_type = String)]
    pub upload_id: UploadId,
    /// Stored file names, in the order they were received.
    pub files: Vec<String>,
    pub message: String,
}

/// Response for clearing every upload session.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ClearUploadsResponse {
    pub message: String,
    /// Number of upload sessions removed.
    pub removed: usize,
}

/// POST /api/uploads
#[utoipa::path(
    post,
    path = "/api/uploads",
    request_body(content_type = "multipart/form-data", description = "One or more `files` parts"),
    responses(
        (status = 201, description = "Files stored", body = UploadResponse),
        (status = 400, description = "No files, a nameless part, or a duplicate name")
    )
)]
pub async fn upload_files(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload_id = UploadId::new();
    let dir = ctx.upload_dir(upload_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::resource("create upload directory", e))?;

    let files = match receive_files(&dir, &mut multipart).await {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => {
            discard_session(&dir).await;
            return Err(Error::invalid_input("no files were uploaded").into());
        }
        Err(e) => {
            discard_session(&dir).await;
            return Err(e.into());
        }
    };

    tracing::info!(upload_id = %upload_id, count = files.len(), "Upload stored");

    ctx.event_bus.broadcast(EventPayload::UploadReceived {
        upload_id,
        files: files.clone(),
    });

    let message = format!("Uploaded {} files", files.len());
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            upload_id,
            files,
            message,
        }),
    ))
}

/// DELETE /api/uploads/{upload_id}
#[utoipa::path(
    delete,
    path = "/api/uploads/{upload_id}",
    params(("upload_id" = String, Path, description = "Upload session ID")),
    responses(
        (status = 204, description = "Upload session removed"),
        (status = 404, description = "Upload session not found")
    )
)]
pub async fn delete_upload(
    State(ctx): State<AppContext>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<StatusCode, AppError> {
    let upload_id: UploadId = parse_id(&id, "upload")?;
    let dir = ctx.upload_dir(upload_id);

    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {
            tracing::info!(upload_id = %upload_id, "Upload removed");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::not_found("upload", upload_id).into())
        }
        Err(e) => Err(Error::resource("remove upload directory", e).into()),
    }
}

/// DELETE /api/uploads
#[utoipa::path(
    delete,
    path = "/api/uploads",
    responses(
        (status = 200, description = "All upload sessions removed", body = ClearUploadsResponse)
    )
)]
pub async fn clear_uploads(
    State(ctx): State<AppContext>,
) -> Result<Json<ClearUploadsResponse>, AppError> {
    let mut entries = match tokio::fs::read_dir(ctx.uploads_dir()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(ClearUploadsResponse {
                message: "Uploads cleared".into(),
                removed: 0,
            }));
        }
        Err(e) => return Err(Error::resource("list uploads directory", e).into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::resource("list uploads directory", e))?
    {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => removed += usize::from(is_dir),
            Err(e) => return Err(Error::resource("clear uploads directory", e).into()),
        }
    }

    tracing::info!(removed, "Uploads cleared");

    Ok(Json(ClearUploadsResponse {
        message: "Uploads cleared".into(),
        removed,
    }))
}

/// Stream every file part of the request into `dir`.
async fn receive_files(dir: &Path, multipart: &mut Multipart) -> rf_core::Result<Vec<String>> {
    let mut files: Vec<String> = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if !field.name().is_some_and(|n| FILE_FIELDS.contains(&n)) {
            continue;
        }

        let raw = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| Error::invalid_input("file part is missing a file name"))?;
        let name = sanitize_file_name(&raw)
            .ok_or_else(|| Error::invalid_input(format!("unusable file name '{raw}'")))?;
        if files.contains(&name) {
            return Err(Error::invalid_input(format!("duplicate file name '{name}'")));
        }

        let path = dir.join(&name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::resource("create uploaded file", e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::resource("write uploaded file", e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| Error::resource("write uploaded file", e))?;

        tracing::debug!(file = %name, bytes = written, "Stored uploaded file");
        files.push(name);
    }

    Ok(files)
}

async fn discard_session(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove rejected upload");
    }
}

fn multipart_error(e: MultipartError) -> Error {
    Error::invalid_input(format!("malformed upload: {}", e.body_text()))
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes
/// `_`, and leading dots are removed. Returns `None` if nothing is left.
pub(crate) fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
