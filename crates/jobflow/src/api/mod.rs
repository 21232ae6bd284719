use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobStats, JobStatus};
use crate::jobs::JobService;

pub mod models;

use models::{
    CountQuery, CountResponse, CreateJobRequest, ErrorBody, ListJobsQuery, UpdateStatusRequest,
};

pub fn router(service: JobService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/stats", get(job_stats))
        .route("/api/jobs/count", get(job_count))
        .route("/api/jobs/:id", get(get_job).delete(delete_job))
        .route("/api/jobs/:id/status", patch(update_job_status))
        .route("/api/jobs/:id/requeue", post(requeue_job))
        .route("/api/jobs/:id/run", post(run_job))
        .with_state(service)
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let status = match &self {
            JobError::Validation(_) => StatusCode::BAD_REQUEST,
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::Conflict { .. } => StatusCode::CONFLICT,
            JobError::StoreUnavailable(_) | JobError::QueueUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            JobError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<JobStatus>, JobError> {
    raw.map(str::parse::<JobStatus>).transpose()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": true })))
}

pub async fn create_job(
    State(service): State<JobService>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), JobError> {
    if body.payload.trim().is_empty() {
        return Err(JobError::Validation("payload is required".into()));
    }

    let job = service.create_job(body.payload, body.max_retries).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_jobs(
    State(service): State<JobService>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, JobError> {
    let status = parse_status(q.status.as_deref())?;
    let jobs = service.list_jobs(status, q.limit, q.offset).await?;
    Ok(Json(jobs))
}

pub async fn job_stats(State(service): State<JobService>) -> Result<Json<JobStats>, JobError> {
    Ok(Json(service.job_stats().await?))
}

pub async fn job_count(
    State(service): State<JobService>,
    Query(q): Query<CountQuery>,
) -> Result<Json<CountResponse>, JobError> {
    let status = parse_status(q.status.as_deref())?;
    let count = service.job_count(status).await?;
    Ok(Json(CountResponse {
        status: status.map(|s| s.as_str().to_string()),
        count,
    }))
}

pub async fn get_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, JobError> {
    Ok(Json(service.get_job(id).await?))
}

pub async fn update_job_status(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Job>, JobError> {
    let status = body.status.parse::<JobStatus>()?;
    Ok(Json(service.update_job_status(id, status).await?))
}

pub async fn delete_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, JobError> {
    Ok(Json(service.delete_job(id).await?))
}

pub async fn requeue_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, JobError> {
    Ok(Json(service.requeue_job(id).await?))
}

pub async fn run_job(
    State(service): State<JobService>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, JobError> {
    Ok(Json(service.run_job_sync(id).await?))
}
