// HTTP route handlers for the CodeGrade API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use codegrade_common::language::SupportedLanguage;
use codegrade_common::redis;
use codegrade_common::types::{JobRequest, JobStatus, TestCase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub language: String,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub tag: &'static str,
    pub name: &'static str,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Reject requests the engine would only score as a caller error
pub fn validate(request: &SubmitRequest) -> Result<(), String> {
    if request.test_cases.is_empty() {
        return Err("At least one test case is required".to_string());
    }
    request
        .language
        .parse::<SupportedLanguage>()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// POST /submissions - Queue a submission for evaluation
pub async fn submit(State(state): State<Arc<AppState>>, Json(payload): Json<SubmitRequest>) -> Response {
    if let Err(message) = validate(&payload) {
        warn!(language = %payload.language, error = %message, "Rejected submission");
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    let job = JobRequest::new(payload.language, payload.source_code, payload.test_cases);

    let mut conn = state.redis.clone();
    match redis::push_job(&mut conn, &job, state.result_ttl_secs).await {
        Ok(()) => {
            info!(
                job_id = %job.id,
                language = %job.language,
                test_cases = job.test_cases.len(),
                source_size = job.source_code.len(),
                "Submission queued"
            );
            (
                StatusCode::CREATED,
                Json(SubmitResponse {
                    job_id: job.id.to_string(),
                    status: JobStatus::Pending,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Failed to queue submission");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to queue submission: {}", e))
        }
    }
}

/// GET /submissions/:id - Stored report, or 202 while it is still pending
pub async fn get_submission(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    let Ok(job_uuid) = Uuid::parse_str(&job_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid submission ID format");
    };

    let mut conn = state.redis.clone();
    match redis::get_result(&mut conn, &job_uuid).await {
        Ok(Some(result)) => {
            info!(job_id = %job_id, status = ?result.status, "Submission result retrieved");
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(None) => {
            let status = redis::get_status(&mut conn, &job_uuid)
                .await
                .ok()
                .flatten()
                .unwrap_or(JobStatus::Pending);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": status,
                    "message": "Submission is queued or still being evaluated"
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch submission result");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to query submission: {}", e))
        }
    }
}

/// GET /languages - Supported language tags
pub async fn list_languages() -> Json<Vec<LanguageInfo>> {
    Json(
        SupportedLanguage::ALL
            .iter()
            .map(|l| LanguageInfo {
                tag: l.as_str(),
                name: l.display_name(),
            })
            .collect(),
    )
}

/// GET /health - Liveness probe
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
