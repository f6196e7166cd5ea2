//! Verdict Comparator and score arithmetic
//!
//! **Core Responsibility:**
//! Decide whether one run matched its expected output, and turn pass counts
//! and logic scores into the percentages stored in a report.
//!
//! **Critical Properties:**
//! - Knows nothing about processes, scratch files or language runtimes
//! - Knows nothing about the logic backend
//! - Pure functions: identical inputs always give identical scores
//!
//! **Normalization Rules (Applied to All Languages):**
//! - Trim leading and trailing whitespace: YES
//! - Internal whitespace normalization: NO
//! - Case sensitivity: YES (exact match required)
//! - Floating-point tolerance: NO

use codegrade_common::types::{ExecutionResult, TestCase, TestCaseResult};

/// Weight of the test-pass percentage in the combined score
pub const TEST_WEIGHT: f64 = 0.5;
/// Weight of the logic score (scaled to 0-100) in the combined score
pub const LOGIC_WEIGHT: f64 = 0.5;
pub const MAX_LOGIC_SCORE: f64 = 10.0;

/// Strip surrounding whitespace only. Preserves internal whitespace,
/// case, and blank lines inside the content.
pub fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// True iff both strings are equal after stripping surrounding whitespace
pub fn matches(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// A run that did not succeed never matches, whatever it printed
pub fn run_matches(execution: &ExecutionResult, expected: &str) -> bool {
    execution.is_success() && matches(&execution.stdout, expected)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `round(100 * passed / total, 2)`; zero tests score zero
pub fn test_case_score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(100.0 * passed as f64 / total as f64, 2)
}

/// Clamp a raw logic score into [0, 10] and round to one decimal
pub fn clamp_logic_score(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    round_to(raw.clamp(0.0, MAX_LOGIC_SCORE), 1)
}

/// Blend the test percentage with the logic score.
/// Without a logic score the test percentage stands alone.
pub fn combined_score(test_case_score: f64, logic_score: Option<f64>) -> f64 {
    match logic_score {
        Some(logic) => round_to(TEST_WEIGHT * test_case_score + LOGIC_WEIGHT * (logic * 10.0), 2),
        None => test_case_score,
    }
}

/// Judge a single executed test case
pub fn evaluate_test(test_case: &TestCase, execution: ExecutionResult) -> TestCaseResult {
    let matched = run_matches(&execution, &test_case.expected);
    let error = execution.error_message().map(str::to_string);

    TestCaseResult {
        test_case: test_case.clone(),
        execution: Some(execution),
        matched,
        error,
        logic_feedback: None,
    }
}

/// Entry for a test case that was never run
pub fn not_executed(test_case: &TestCase, reason: &str) -> TestCaseResult {
    TestCaseResult {
        test_case: test_case.clone(),
        execution: None,
        matched: false,
        error: Some(reason.to_string()),
        logic_feedback: None,
    }
}
