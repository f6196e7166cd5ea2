// CLI commands for evaluating submissions without the queue
use anyhow::{bail, Context, Result};
use codegrade_common::types::{SubmissionReport, TestCase};
use codegrade_engine::heuristics::{Heuristics, LexicalHeuristics};
use codegrade_engine::{Evaluator, EvaluatorConfig, LanguageRecipe};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

/// Accepted test suite layouts
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestSuite {
    Bare(Vec<TestCase>),
    Wrapped { test_cases: Vec<TestCase> },
}

/// Parse a JSON test suite; an empty suite is an error
pub fn parse_test_suite(content: &str) -> Result<Vec<TestCase>> {
    let suite: TestSuite = serde_json::from_str(content).context("Failed to parse test suite JSON")?;
    let tests = match suite {
        TestSuite::Bare(tests) => tests,
        TestSuite::Wrapped { test_cases } => test_cases,
    };
    if tests.is_empty() {
        bail!("Test suite is empty; at least one test case is required");
    }
    Ok(tests)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Evaluate a file locally and print the report
pub async fn evaluate(
    file: &Path,
    language: &str,
    tests_path: &Path,
    compile_once: bool,
    parallel: bool,
    json: bool,
) -> Result<()> {
    let code = read_file(file)?;
    let tests = parse_test_suite(&read_file(tests_path)?)?;

    let mut config = EvaluatorConfig::from_env().context("Failed to load evaluator configuration")?;
    config.compile_once |= compile_once;
    config.parallel_tests |= parallel;

    let report = Evaluator::new(config).evaluate(&code, language, &tests).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

/// Human-readable summary of a report
pub fn render_report(report: &SubmissionReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("📝 Language: {}\n", report.language));

    for (idx, entry) in report.per_test_results.iter().enumerate() {
        let mark = if entry.matched { "✅" } else { "❌" };
        out.push_str(&format!("{} Test {}", mark, idx + 1));
        if let Some(execution) = &entry.execution {
            out.push_str(&format!(" [{:?}]", execution.outcome));
            if !entry.matched && execution.is_success() {
                out.push_str(&format!(" expected {:?}, got {:?}", entry.test_case.expected.trim(), execution.stdout));
            }
        }
        out.push('\n');
        if let Some(error) = &entry.error {
            for line in error.lines().take(10) {
                out.push_str(&format!("     {}\n", line));
            }
        }
    }

    out.push_str(&format!(
        "\n🧪 Tests passed: {}/{} ({:.2}%)\n",
        report.passed, report.total, report.test_case_score
    ));
    match report.logic_score {
        Some(score) => out.push_str(&format!(
            "🧠 Logic score: {:.1}/10 ({:?})\n",
            score, report.logic_assessment.status
        )),
        None => out.push_str(&format!("🧠 Logic score: n/a ({:?})\n", report.logic_assessment.status)),
    }
    if report.hard_coded_detected {
        out.push_str("⚠️  Hard-coded outputs detected\n");
    }
    out.push_str(&format!("🏁 Combined score: {:.2}\n", report.combined_score));
    if !report.logic_assessment.rationale.is_empty() {
        out.push_str(&format!("\n{}\n", report.logic_assessment.rationale));
    }
    out
}

/// Print the language the heuristics infer for a file
pub fn detect(file: &Path) -> Result<()> {
    let code = read_file(file)?;
    match LexicalHeuristics.infer_language(&code) {
        Some(language) => println!("🔍 {} ({})", language.display_name(), language.as_str()),
        None => println!("🔍 Unknown (no unambiguous language signals)"),
    }
    Ok(())
}

fn describe(argv: Option<&Vec<String>>) -> String {
    argv.map(|a| a.join(" ")).unwrap_or_else(|| "-".to_string())
}

pub fn list_languages() -> Result<()> {
    let config = EvaluatorConfig::from_env().context("Failed to load evaluator configuration")?;
    println!("📦 Configured languages:\n");
    for recipe in config.languages.recipes() {
        println!("  {} (.{})", recipe.name.display_name(), recipe.extension);
        println!("    compile: {}", describe(recipe.compile.as_ref()));
        println!("    run:     {}", describe(Some(&recipe.run)));
    }
    Ok(())
}

/// Probe arguments for a toolchain; the JDK tools take `-version`
fn version_args(program: &str) -> &'static [&'static str] {
    match program {
        "java" | "javac" => &["-version"],
        _ => &["--version"],
    }
}

fn probe(recipe: &LanguageRecipe) -> Result<String, String> {
    let program = recipe.toolchain();
    let output = Command::new(program)
        .args(version_args(program))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("{} not runnable: {}", program, e))?;

    // javac prints its version on stderr
    let text = if output.stdout.is_empty() { output.stderr } else { output.stdout };
    let first_line = String::from_utf8_lossy(&text).lines().next().unwrap_or("").trim().to_string();
    Ok(format!("{} ({})", program, first_line))
}

/// Check every configured toolchain and fail if any is missing
pub fn doctor() -> Result<()> {
    let config = EvaluatorConfig::from_env().context("Failed to load evaluator configuration")?;
    println!("🩺 Checking toolchains...\n");

    let mut missing = 0;
    for recipe in config.languages.recipes() {
        match probe(recipe) {
            Ok(version) => println!("  ✅ {:<7} {}", recipe.name.display_name(), version),
            Err(e) => {
                missing += 1;
                println!("  ❌ {:<7} {}", recipe.name.display_name(), e);
            }
        }
    }

    match &config.backend {
        Some(backend) => println!("\n🧠 Logic backend: {:?} {} ({})", backend.kind, backend.model, backend.url),
        None => println!("\n🧠 Logic backend: disabled (local heuristic scoring)"),
    }

    if missing > 0 {
        bail!("{} toolchain(s) missing", missing);
    }
    Ok(())
}
