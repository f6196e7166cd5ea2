use crate::types::{JobRequest, JobResult, JobStatus};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics shared by the API and the worker.
/// Keys are deterministic so both sides never drift.

pub const QUEUE_KEY: &str = "codegrade:queue";
pub const RESULT_PREFIX: &str = "codegrade:result";
pub const STATUS_PREFIX: &str = "codegrade:status";

/// Generate result key for a job
pub fn result_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

/// Generate status key for a job
pub fn status_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, job_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// `Pending` is written before the job becomes visible to workers, in one
/// MULTI/EXEC, so a fast worker's `Running` can never be overwritten
fn enqueue_pipeline(job: &JobRequest, ttl_secs: u64) -> RedisResult<redis::Pipeline> {
    let payload = serde_json::to_string(job).map_err(serialization_error)?;
    let status_str = serde_json::to_string(&JobStatus::Pending).map_err(serialization_error)?;

    let mut pipe = redis::pipe();
    pipe.atomic()
        .set_ex(status_key(&job.id), status_str, ttl_secs)
        .ignore()
        .rpush(QUEUE_KEY, payload)
        .ignore();
    Ok(pipe)
}

/// Push a submission onto the queue (RPUSH, FIFO with BLPOP)
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    job: &JobRequest,
    ttl_secs: u64,
) -> RedisResult<()> {
    enqueue_pipeline(job, ttl_secs)?.query_async(conn).await
}

/// Pop a submission from the queue.
/// Uses BLPOP with timeout so the worker can notice shutdown.
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<JobRequest>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: JobRequest = serde_json::from_str(&payload).map_err(serialization_error)?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Record the lifecycle status of a job
pub async fn store_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
    status: JobStatus,
    ttl_secs: u64,
) -> RedisResult<()> {
    let status_str = serde_json::to_string(&status).map_err(serialization_error)?;
    conn.set_ex(status_key(job_id), status_str, ttl_secs).await
}

/// Store the evaluated report envelope together with its final status
pub async fn store_result(
    conn: &mut redis::aio::ConnectionManager,
    result: &JobResult,
    ttl_secs: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(result).map_err(serialization_error)?;
    let _: () = conn.set_ex(result_key(&result.job_id), payload, ttl_secs).await?;
    store_status(conn, &result.job_id, result.status, ttl_secs).await
}

/// Retrieve a stored result, if the job has finished
pub async fn get_result(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<JobResult>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;

    match payload {
        Some(data) => {
            let result: JobResult = serde_json::from_str(&data).map_err(serialization_error)?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

/// Retrieve the lifecycle status of a job, if known
pub async fn get_status(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<JobStatus>> {
    let payload: Option<String> = conn.get(status_key(job_id)).await?;

    match payload {
        Some(data) => {
            let status: JobStatus = serde_json::from_str(&data).map_err(serialization_error)?;
            Ok(Some(status))
        }
        None => Ok(None),
    }
}
