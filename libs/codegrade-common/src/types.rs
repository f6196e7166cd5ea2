use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// One input/expected-output pair supplied by the question bank.
/// The evaluator treats it as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(alias = "expected_output")]
    pub expected: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// How a single run of the submission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    CompileError,
    RuntimeError,
    Timeout,
    UnsupportedLanguage,
    InternalError,
}

/// Raw result of running the submission against one stdin.
/// `stdout` and `stderr` are trimmed of surrounding whitespace; for
/// non-success outcomes `stderr` carries the diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn success(stdout: &str, stderr: &str) -> Self {
        Self {
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            outcome: Outcome::Success,
        }
    }

    pub fn failure(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Error text for display; `None` when the run succeeded
    pub fn error_message(&self) -> Option<&str> {
        if self.is_success() {
            None
        } else {
            Some(self.stderr.as_str())
        }
    }
}

/// Tags raised against a submission's approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concern {
    HardCoded,
    Inefficient,
    SyntaxError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicStatus {
    AiSuccess,
    AiUnavailable,
    AiErrorFallback,
    LanguageMismatch,
}

/// Why the remote backend was not used for a given assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    AiUnavailable,
    ModelLoading,
    ClientError,
    ServerError,
    Timeout,
    NetworkError,
    UnexpectedError,
}

/// Submission-level judgement of the approach, 0-10
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicAssessment {
    pub score: Option<f64>,
    pub rationale: String,
    pub concerns: BTreeSet<Concern>,
    pub status: LogicStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

impl LogicAssessment {
    pub fn language_mismatch(message: impl Into<String>) -> Self {
        Self {
            score: None,
            rationale: message.into(),
            concerns: BTreeSet::new(),
            status: LogicStatus::LanguageMismatch,
            fallback_reason: None,
        }
    }

    pub fn hard_coded(&self) -> bool {
        self.concerns.contains(&Concern::HardCoded)
    }
}

/// Per-test entry of a report. `execution` is `None` when the test case
/// was never run (language mismatch, exhausted time budget).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_case: TestCase,
    pub execution: Option<ExecutionResult>,
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_feedback: Option<String>,
}

/// Everything the caller persists for one evaluated submission.
/// Carries no timestamps so identical inputs yield identical reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub language: String,
    pub combined_score: f64,
    pub test_case_score: f64,
    pub logic_score: Option<f64>,
    pub hard_coded_detected: bool,
    pub passed: usize,
    pub total: usize,
    pub logic_assessment: LogicAssessment,
    pub per_test_results: Vec<TestCaseResult>,
}

/// Submission job as queued by the API and consumed by the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub language: String,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    pub submitted_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn new(language: impl Into<String>, source_code: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            id: Uuid::new_v4(),
            language: language.into(),
            source_code: source_code.into(),
            test_cases,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Rejected,
}

/// Stored envelope around a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub report: SubmissionReport,
    pub completed_at: DateTime<Utc>,
    pub evaluation_ms: u64,
}
