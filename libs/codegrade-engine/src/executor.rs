//! Scoring Aggregator - end-to-end evaluation of one submission
//!
//! **Responsibility:**
//! Gate on language consistency, obtain the logic assessment once, run every
//! test case, and fold everything into a `SubmissionReport`.
//!
//! **State machine:**
//! `LANGUAGE_CHECK -> (MISMATCH -> END) | LOGIC_ASSESS -> EXECUTE_EACH_TEST -> AGGREGATE`
//!
//! This module is the glue layer - it knows nothing about:
//! - How code executes (runner's job)
//! - How outputs are compared or scores computed (evaluator's job)
//! - How the approach is judged (logic analyzer's job)

use crate::config::EvaluatorConfig;
use crate::consistency::{self, MismatchError};
use crate::evaluator;
use crate::heuristics::{Heuristics, LexicalHeuristics};
use crate::logic::backend::LogicBackend;
use crate::logic::LogicAnalyzer;
use crate::runner::{self, PreparedProgram, Runner};
use codegrade_common::language::SupportedLanguage;
use codegrade_common::types::{ExecutionResult, LogicAssessment, SubmissionReport, TestCase, TestCaseResult};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const BUDGET_EXHAUSTED: &str = "Not executed: the submission's evaluation time budget was exhausted.";

/// How each test case gets its `ExecutionResult`
enum Mode<'a> {
    /// Reference behavior: fresh scratch dir and compile per test case
    PerTest { code: &'a str, language: SupportedLanguage },
    /// Compile once, run every test case against the same artifact
    Prepared(&'a PreparedProgram),
}

#[derive(Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    runner: Runner,
    analyzer: LogicAnalyzer,
    heuristics: Arc<dyn Heuristics>,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let heuristics: Arc<dyn Heuristics> = Arc::new(LexicalHeuristics);
        Self {
            runner: Runner::from_config(&config),
            analyzer: LogicAnalyzer::from_config(&config, heuristics.clone()),
            heuristics,
            config,
        }
    }

    /// Replace whatever backend the configuration described
    pub fn with_backend(mut self, backend: Arc<dyn LogicBackend>) -> Self {
        self.analyzer = self.analyzer.with_backend(backend);
        self
    }

    /// Swap the lexical strategy used for inference and local scoring
    pub fn with_heuristics(mut self, heuristics: Arc<dyn Heuristics>) -> Self {
        self.analyzer = self.analyzer.with_heuristics(heuristics.clone());
        self.heuristics = heuristics;
        self
    }

    /// Evaluate one submission. Always returns a well-formed report.
    #[instrument(skip(self, code, test_cases), fields(language = %language, code_bytes = code.len(), test_count = test_cases.len()))]
    pub async fn evaluate(&self, code: &str, language: &str, test_cases: &[TestCase]) -> SubmissionReport {
        let started = Instant::now();
        let deadline = started + self.config.budget_for(test_cases.len());
        let declared = SupportedLanguage::from_tag(language);
        let language_label = declared.map(|l| l.as_str().to_string()).unwrap_or_else(|| language.to_string());

        // Unknown tags skip the gate; the runner reports them per test case
        if let Some(declared) = declared {
            if let Err(mismatch) = consistency::check(code, declared, self.heuristics.as_ref()) {
                warn!(inferred = mismatch.inferred, "Language mismatch; skipping execution");
                return mismatch_report(language_label, test_cases, &mismatch);
            }
        }

        let assessment = self.analyzer.assess(code, language, test_cases).await;

        let results = match declared {
            Some(language) => self.run_tests(code, language, test_cases, deadline).await,
            None => test_cases
                .iter()
                .map(|tc| evaluator::evaluate_test(tc, runner::unsupported_language(language)))
                .collect(),
        };

        let report = build_report(language_label, assessment, results);

        info!(
            passed = report.passed,
            total = report.total,
            test_case_score = report.test_case_score,
            logic_score = ?report.logic_score,
            combined_score = report.combined_score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission evaluated"
        );

        report
    }

    async fn run_tests(
        &self,
        code: &str,
        language: SupportedLanguage,
        test_cases: &[TestCase],
        deadline: Instant,
    ) -> Vec<TestCaseResult> {
        if !self.config.compile_once {
            return self.run_all(&Mode::PerTest { code, language }, test_cases, deadline).await;
        }

        match tokio::time::timeout_at(deadline, self.runner.prepare(code, language)).await {
            Ok(Ok(program)) => self.run_all(&Mode::Prepared(&program), test_cases, deadline).await,
            Ok(Err(failure)) => {
                warn!(outcome = ?failure.outcome, "Build failed; all tests marked as failed");
                test_cases
                    .iter()
                    .map(|tc| evaluator::evaluate_test(tc, failure.clone()))
                    .collect()
            }
            Err(_) => test_cases
                .iter()
                .map(|tc| evaluator::not_executed(tc, BUDGET_EXHAUSTED))
                .collect(),
        }
    }

    /// Results come back in input order in both sequential and parallel mode
    async fn run_all(&self, mode: &Mode<'_>, test_cases: &[TestCase], deadline: Instant) -> Vec<TestCaseResult> {
        if self.config.parallel_tests {
            let runs = test_cases
                .iter()
                .enumerate()
                .map(|(index, tc)| self.run_one(mode, index, tc, deadline));
            return join_all(runs).await;
        }

        let mut results = Vec::with_capacity(test_cases.len());
        for (index, tc) in test_cases.iter().enumerate() {
            results.push(self.run_one(mode, index, tc, deadline).await);
        }
        results
    }

    async fn run_one(&self, mode: &Mode<'_>, index: usize, test_case: &TestCase, deadline: Instant) -> TestCaseResult {
        if Instant::now() >= deadline {
            return evaluator::not_executed(test_case, BUDGET_EXHAUSTED);
        }

        let execution = match tokio::time::timeout_at(deadline, self.execute(mode, &test_case.input)).await {
            Ok(execution) => execution,
            Err(_) => {
                warn!(test_index = index, "Submission budget exhausted mid-run");
                return evaluator::not_executed(test_case, BUDGET_EXHAUSTED);
            }
        };

        let result = evaluator::evaluate_test(test_case, execution);
        debug!(
            test_index = index,
            outcome = ?result.execution.as_ref().map(|e| e.outcome),
            matched = result.matched,
            "Test case finished"
        );
        result
    }

    async fn execute(&self, mode: &Mode<'_>, stdin: &str) -> ExecutionResult {
        match mode {
            Mode::PerTest { code, language } => self.runner.execute_language(code, *language, stdin).await,
            Mode::Prepared(program) => self.runner.run(program, stdin).await,
        }
    }
}

/// Zero score, nothing executed, the mismatch message on every entry
fn mismatch_report(language: String, test_cases: &[TestCase], mismatch: &MismatchError) -> SubmissionReport {
    let message = mismatch.to_string();
    SubmissionReport {
        language,
        combined_score: 0.0,
        test_case_score: 0.0,
        logic_score: None,
        hard_coded_detected: false,
        passed: 0,
        total: test_cases.len(),
        logic_assessment: LogicAssessment::language_mismatch(message.clone()),
        per_test_results: test_cases
            .iter()
            .map(|tc| evaluator::not_executed(tc, &message))
            .collect(),
    }
}

fn build_report(language: String, assessment: LogicAssessment, mut results: Vec<TestCaseResult>) -> SubmissionReport {
    let total = results.len();
    let passed = results.iter().filter(|r| r.matched).count();
    let test_case_score = evaluator::test_case_score(passed, total);
    let logic_score = assessment.score;

    // The one submission-level rationale is displayed on the first entry
    if let Some(first) = results.first_mut() {
        first.logic_feedback = Some(assessment.rationale.clone());
    }

    SubmissionReport {
        language,
        combined_score: evaluator::combined_score(test_case_score, logic_score),
        test_case_score,
        logic_score,
        hard_coded_detected: assessment.hard_coded(),
        passed,
        total,
        logic_assessment: assessment,
        per_test_results: results,
    }
}

/// One-shot entry point: build an `Evaluator` from `config` and run it
pub async fn evaluate_submission(
    config: &EvaluatorConfig,
    code: &str,
    language: &str,
    test_cases: &[TestCase],
) -> SubmissionReport {
    Evaluator::new(config.clone()).evaluate(code, language, test_cases).await
}
