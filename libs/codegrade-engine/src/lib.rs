//! Submission evaluation engine: run untrusted code against test cases and
//! blend the exact-match verdicts with a logic assessment into one grade.

pub mod config;
pub mod consistency;
pub mod evaluator;
pub mod executor;
pub mod heuristics;
pub mod logic;
pub mod runner;

mod engine_tests;

pub use config::{BackendConfig, BackendKind, EvaluatorConfig, LanguageConfigManager, LanguageRecipe};
pub use executor::{evaluate_submission, Evaluator};
pub use runner::Runner;
