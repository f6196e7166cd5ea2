mod metrics;

use anyhow::Context;
use codegrade_common::config::Settings;
use codegrade_common::redis;
use codegrade_common::types::{JobRequest, JobResult, JobStatus, LogicStatus};
use codegrade_engine::{Evaluator, EvaluatorConfig};
use std::time::Instant;
use tokio::signal;
use tracing::{debug, error, info, instrument, warn};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("CodeGrade Worker booting...");

    let settings = Settings::from_env();
    let config = EvaluatorConfig::from_env().context("Failed to load evaluator configuration")?;

    let languages: Vec<&str> = config.languages.recipes().iter().map(|r| r.name.as_str()).collect();
    info!(
        languages = ?languages,
        run_timeout_ms = config.run_timeout.as_millis() as u64,
        compile_timeout_secs = config.compile_timeout.as_secs(),
        compile_once = config.compile_once,
        parallel_tests = config.parallel_tests,
        "Evaluator configured"
    );
    match &config.backend {
        Some(backend) => info!(kind = ?backend.kind, model = %backend.model, url = %backend.url, "Logic backend enabled"),
        None => warn!("No logic backend configured; using local heuristic scoring"),
    }

    let client = ::redis::Client::open(settings.redis_url.as_str())
        .with_context(|| format!("Invalid REDIS_URL '{}'", settings.redis_url))?;
    let mut redis_conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", settings.redis_url);

    tokio::spawn(metrics::serve(settings.metrics_addr.clone()));

    let evaluator = Evaluator::new(config);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping after the current submission...");
    };

    tokio::select! {
        _ = worker_loop(&mut redis_conn, &evaluator, settings.result_ttl_secs) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(redis_conn, evaluator))]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    evaluator: &Evaluator,
    result_ttl_secs: u64,
) {
    loop {
        // BLPOP with 5 second timeout for graceful shutdown
        match redis::pop_job(redis_conn, 5.0).await {
            Ok(Some(job)) => process_job(redis_conn, evaluator, job, result_ttl_secs).await,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Final lifecycle status for a finished report
fn final_status(status: LogicStatus) -> JobStatus {
    if status == LogicStatus::LanguageMismatch {
        JobStatus::Rejected
    } else {
        JobStatus::Completed
    }
}

async fn process_job(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    evaluator: &Evaluator,
    job: JobRequest,
    result_ttl_secs: u64,
) {
    let job_id = job.id;
    info!(
        job_id = %job_id,
        language = %job.language,
        test_cases = job.test_cases.len(),
        source_size = job.source_code.len(),
        queued_ms = (chrono::Utc::now() - job.submitted_at).num_milliseconds(),
        "Received job"
    );

    if let Err(e) = redis::store_status(redis_conn, &job_id, JobStatus::Running, result_ttl_secs).await {
        warn!(job_id = %job_id, error = %e, "Failed to mark job as running");
    }

    let start = Instant::now();
    let report = evaluator.evaluate(&job.source_code, &job.language, &job.test_cases).await;
    let elapsed = start.elapsed();

    metrics::record(&report, elapsed);

    info!(
        job_id = %job_id,
        combined_score = report.combined_score,
        passed = report.passed,
        total = report.total,
        logic_status = metrics::logic_status_label(report.logic_assessment.status),
        execution_ms = elapsed.as_millis() as u64,
        "Evaluation completed"
    );

    for (idx, entry) in report.per_test_results.iter().enumerate() {
        debug!(
            job_id = %job_id,
            test_num = idx + 1,
            matched = entry.matched,
            outcome = ?entry.execution.as_ref().map(|e| e.outcome),
            "Test result"
        );
    }

    let result = JobResult {
        job_id,
        status: final_status(report.logic_assessment.status),
        report,
        completed_at: chrono::Utc::now(),
        evaluation_ms: elapsed.as_millis() as u64,
    };

    // Non-fatal - worker continues
    match redis::store_result(redis_conn, &result, result_ttl_secs).await {
        Ok(()) => info!(job_id = %job_id, status = ?result.status, "Result persisted to Redis"),
        Err(e) => error!(job_id = %job_id, error = %e, "Failed to persist result"),
    }
}
