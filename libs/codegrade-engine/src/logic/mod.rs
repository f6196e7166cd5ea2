//! Logic Analyzer - one 0-10 judgement of the submission's approach
//!
//! **Core Responsibility:**
//! Ask the configured backend for a rubric-based score and fall back to the
//! local heuristic score whenever that is not possible.
//!
//! **Failure Policy:**
//! - No backend configured: `ai_unavailable`, heuristic score
//! - Backend error, timeout or unparseable reply: `ai_error_fallback`
//!   with the classified reason, heuristic score
//! - `assess` itself never fails

pub mod backend;
pub mod prompt;

use crate::config::EvaluatorConfig;
use crate::evaluator::clamp_logic_score;
use crate::heuristics::{looks_hard_coded, Heuristics};
use backend::{HttpBackend, LogicBackend};
use codegrade_common::language::SupportedLanguage;
use codegrade_common::types::{Concern, FallbackReason, LogicAssessment, LogicStatus, TestCase};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct LogicAnalyzer {
    backend: Option<Arc<dyn LogicBackend>>,
    heuristics: Arc<dyn Heuristics>,
    timeout: Duration,
}

impl LogicAnalyzer {
    pub fn new(backend: Option<Arc<dyn LogicBackend>>, heuristics: Arc<dyn Heuristics>, timeout: Duration) -> Self {
        Self {
            backend,
            heuristics,
            timeout,
        }
    }

    /// Build the HTTP backend described by `config`, if any.
    /// A backend that cannot be constructed is treated as absent.
    pub fn from_config(config: &EvaluatorConfig, heuristics: Arc<dyn Heuristics>) -> Self {
        let backend = config.backend.clone().and_then(|cfg| match HttpBackend::new(cfg) {
            Ok(backend) => Some(Arc::new(backend) as Arc<dyn LogicBackend>),
            Err(e) => {
                warn!(error = %e, "Logic backend disabled");
                None
            }
        });
        Self::new(backend, heuristics, config.logic_timeout())
    }

    pub fn with_backend(mut self, backend: Arc<dyn LogicBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_heuristics(mut self, heuristics: Arc<dyn Heuristics>) -> Self {
        self.heuristics = heuristics;
        self
    }

    #[instrument(skip_all, fields(language = %language, code_bytes = code.len()))]
    pub async fn assess(&self, code: &str, language: &str, test_cases: &[TestCase]) -> LogicAssessment {
        let Some(backend) = &self.backend else {
            return self.fallback(code, language, test_cases, LogicStatus::AiUnavailable, FallbackReason::AiUnavailable);
        };

        let request = prompt::build_prompt(code, language, test_cases);
        let reply = tokio::time::timeout(self.timeout, backend.generate(&request)).await;

        let reason = match reply {
            Ok(Ok(text)) => match prompt::parse_reply(&text) {
                Some(parsed) => {
                    let mut concerns = parsed.concerns;
                    if looks_hard_coded(code, test_cases) {
                        concerns.insert(Concern::HardCoded);
                    }
                    info!(backend = backend.name(), score = parsed.score, "Logic assessment from backend");
                    return LogicAssessment {
                        score: Some(parsed.score),
                        rationale: parsed.rationale,
                        concerns,
                        status: LogicStatus::AiSuccess,
                        fallback_reason: None,
                    };
                }
                None => {
                    warn!(backend = backend.name(), reply_bytes = text.len(), "Backend reply had no score");
                    FallbackReason::UnexpectedError
                }
            },
            Ok(Err(e)) => {
                warn!(backend = backend.name(), error = %e, "Logic backend failed");
                e.kind()
            }
            Err(_) => {
                warn!(backend = backend.name(), timeout_ms = self.timeout.as_millis() as u64, "Logic backend timed out");
                FallbackReason::Timeout
            }
        };

        self.fallback(code, language, test_cases, LogicStatus::AiErrorFallback, reason)
    }

    fn fallback(
        &self,
        code: &str,
        language: &str,
        test_cases: &[TestCase],
        status: LogicStatus,
        reason: FallbackReason,
    ) -> LogicAssessment {
        let local = self
            .heuristics
            .local_score(code, SupportedLanguage::from_tag(language), test_cases);

        LogicAssessment {
            score: Some(clamp_logic_score(local.score)),
            rationale: local.rationale,
            concerns: local.concerns,
            status,
            fallback_reason: Some(reason),
        }
    }
}
