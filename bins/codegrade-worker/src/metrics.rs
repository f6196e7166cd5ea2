// Prometheus metrics for the evaluation worker

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use codegrade_common::types::{LogicStatus, SubmissionReport};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static! {
    static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codegrade_submissions_total",
        "Evaluated submissions by language and outcome",
        &["language", "outcome"]
    )
    .unwrap();
    static ref LOGIC_ASSESSMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codegrade_logic_assessments_total",
        "Logic assessments by how they were produced",
        &["status"]
    )
    .unwrap();
    static ref EVALUATION_SECONDS: Histogram = register_histogram!(
        "codegrade_evaluation_seconds",
        "Wall time spent evaluating one submission",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .unwrap();
}

/// Coarse outcome label: `mismatch`, `passed` (all tests), `partial`, or `failed`
pub fn outcome_label(report: &SubmissionReport) -> &'static str {
    if report.logic_assessment.status == LogicStatus::LanguageMismatch {
        "mismatch"
    } else if report.total > 0 && report.passed == report.total {
        "passed"
    } else if report.passed > 0 {
        "partial"
    } else {
        "failed"
    }
}

pub fn logic_status_label(status: LogicStatus) -> &'static str {
    match status {
        LogicStatus::AiSuccess => "ai_success",
        LogicStatus::AiUnavailable => "ai_unavailable",
        LogicStatus::AiErrorFallback => "ai_error_fallback",
        LogicStatus::LanguageMismatch => "language_mismatch",
    }
}

pub fn record(report: &SubmissionReport, elapsed: Duration) {
    SUBMISSIONS_TOTAL
        .with_label_values(&[report.language.as_str(), outcome_label(report)])
        .inc();
    LOGIC_ASSESSMENTS_TOTAL
        .with_label_values(&[logic_status_label(report.logic_assessment.status)])
        .inc();
    EVALUATION_SECONDS.observe(elapsed.as_secs_f64());
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (StatusCode::OK, [(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {}", e)).into_response(),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
}

/// Serve `/metrics` and `/health` until the process exits
pub async fn serve(addr: String) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Metrics server failed to bind; continuing without it");
            return;
        }
    };

    info!(addr = %addr, "Metrics server listening");
    if let Err(e) = axum::serve(listener, router()).await {
        error!(error = %e, "Metrics server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegrade_common::types::{FallbackReason, LogicAssessment};
    use std::collections::BTreeSet;

    fn report(passed: usize, total: usize, status: LogicStatus) -> SubmissionReport {
        SubmissionReport {
            language: "python".to_string(),
            combined_score: 0.0,
            test_case_score: 0.0,
            logic_score: None,
            hard_coded_detected: false,
            passed,
            total,
            logic_assessment: LogicAssessment {
                score: None,
                rationale: String::new(),
                concerns: BTreeSet::new(),
                status,
                fallback_reason: Some(FallbackReason::AiUnavailable),
            },
            per_test_results: Vec::new(),
        }
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&report(2, 2, LogicStatus::AiUnavailable)), "passed");
        assert_eq!(outcome_label(&report(1, 2, LogicStatus::AiSuccess)), "partial");
        assert_eq!(outcome_label(&report(0, 2, LogicStatus::AiSuccess)), "failed");
        assert_eq!(outcome_label(&report(0, 0, LogicStatus::AiSuccess)), "failed");
        assert_eq!(outcome_label(&report(0, 2, LogicStatus::LanguageMismatch)), "mismatch");
    }

    #[test]
    fn test_record_shows_up_in_gather() {
        record(&report(1, 1, LogicStatus::AiUnavailable), Duration::from_millis(120));
        let names: Vec<String> = prometheus::gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"codegrade_submissions_total".to_string()));
        assert!(names.contains(&"codegrade_evaluation_seconds".to_string()));
    }
}
