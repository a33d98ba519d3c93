//! Job management route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use rf_core::{Error, JobId, UploadId};
use rf_pipeline::{presets, Job, JobFailure, JobStatus, TranscodeParams};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::parse_id;
use crate::routes::uploads::sanitize_file_name;

/// Query parameters for listing jobs.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsParams {
    /// Only return jobs in this state.
    pub status: Option<JobStatus>,
}

/// Request body for submitting a new job.
///
/// Exactly one of `preset` and `params` must be given.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SubmitJobRequest {
    pub upload_id: String,
    pub file_name: String,
    pub preset: Option<String>,
    #[schema(value_type = Option<TranscodeParams>)]
    pub params: Option<serde_json::Value>,
}

/// Job response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    /// File name of the source artifact.
    pub source: String,
    pub params: TranscodeParams,
    /// Where the result can be downloaded, once the job succeeded.
    pub result_url: Option<String>,
    /// Human-readable failure detail, once the job failed.
    pub error: Option<String>,
    pub failure: Option<JobFailure>,
    pub cancel_requested: bool,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobResponse {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status,
            source: file_name_of(&job.source),
            params: job.params.clone(),
            result_url: job
                .result
                .as_deref()
                .map(|p| format!("/outputs/{}", file_name_of(p))),
            error: job.error.as_ref().map(ToString::to_string),
            failure: job.error.clone(),
            cancel_requested: job.cancel_requested,
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// GET /api/jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    params(ListJobsParams),
    responses(
        (status = 200, description = "List jobs, newest first", body = Vec<JobResponse>)
    )
)]
pub async fn list_jobs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListJobsParams>,
) -> Json<Vec<JobResponse>> {
    let jobs = ctx
        .pipeline
        .list()
        .iter()
        .filter(|job| params.status.is_none_or(|s| job.status == s))
        .map(JobResponse::from_job)
        .collect();
    Json(jobs)
}

/// POST /api/jobs
#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 202, description = "Job queued", body = JobResponse),
        (status = 400, description = "Invalid source or parameters"),
        (status = 404, description = "Upload session not found")
    )
)]
pub async fn submit_job(
    State(ctx): State<AppContext>,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, AppError> {
    let upload_id: UploadId = parse_id(&payload.upload_id, "upload")?;
    let params = resolve_params(payload.preset.as_deref(), payload.params)?;

    if sanitize_file_name(&payload.file_name).as_deref() != Some(payload.file_name.as_str()) {
        return Err(Error::invalid_input(format!(
            "invalid file name '{}'",
            payload.file_name
        ))
        .into());
    }

    let dir = ctx.upload_dir(upload_id);
    if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        return Err(Error::not_found("upload", upload_id).into());
    }

    let job = ctx.pipeline.submit(&dir.join(&payload.file_name), params)?;

    Ok((StatusCode::ACCEPTED, Json(JobResponse::from_job(&job))))
}

fn resolve_params(
    preset: Option<&str>,
    params: Option<serde_json::Value>,
) -> rf_core::Result<TranscodeParams> {
    match (preset, params) {
        (Some(name), None) => presets::resolve(name),
        (None, Some(value)) => serde_json::from_value(value)
            .map_err(|e| Error::invalid_input(format!("invalid params: {e}"))),
        (Some(_), Some(_)) => Err(Error::invalid_input(
            "give either a preset or params, not both",
        )),
        (None, None) => Err(Error::invalid_input("a preset or params is required")),
    }
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id: JobId = parse_id(&id, "job")?;
    let job = ctx.pipeline.status(job_id)?;
    Ok(Json(JobResponse::from_job(&job)))
}

/// POST /api/jobs/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/cancel",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Cancellation accepted", body = JobResponse),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job already finished")
    )
)]
pub async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id: JobId = parse_id(&id, "job")?;
    let job = ctx.pipeline.cancel(job_id)?;
    Ok(Json(JobResponse::from_job(&job)))
}
