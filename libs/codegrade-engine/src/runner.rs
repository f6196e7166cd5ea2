//! Language Runner - compile and execute untrusted source as local subprocesses
//!
//! **Core Responsibility:**
//! Materialize source into a scratch directory, compile it if the language
//! needs it, run it with piped stdin under a hard wall-clock timeout, and
//! report raw stdout/stderr plus an `Outcome`.
//!
//! **Critical Architectural Boundary:**
//! - Runner knows HOW to execute (recipes, processes, scratch files)
//! - Runner does NOT compare outputs or assign scores
//! - Runner never fails: every problem becomes an `ExecutionResult`
//!
//! **Resource Guarantees:**
//! - One fresh scratch directory per `prepare`, removed when the
//!   `PreparedProgram` is dropped, on every exit path
//! - Child processes are spawned with `kill_on_drop`, so an expired timeout
//!   kills the process instead of leaking it
//! - The run timeout applies to the run step only; compilation has its own,
//!   larger bound

use crate::config::{EvaluatorConfig, LanguageConfigManager};
use codegrade_common::language::SupportedLanguage;
use codegrade_common::types::{ExecutionResult, Outcome};
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Safety limits to keep pathological submissions away from the toolchains
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB
const MAX_DIAGNOSTIC_CHARS: usize = 4000;
const BINARY_NAME: &str = "program";
const DEFAULT_CLASS_NAME: &str = "Main";

lazy_static! {
    static ref PUBLIC_CLASS: Regex =
        Regex::new(r"\bpublic\s+(?:(?:final|abstract)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap();
    static ref ANY_CLASS: Regex = Regex::new(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap();
    static ref MAIN_METHOD: Regex =
        Regex::new(r"\bpublic\s+static\s+(?:final\s+)?void\s+main\s*\(").unwrap();
}

/// Class declared last before the first `main` method, i.e. its enclosing class
fn main_class(code: &str) -> Option<&str> {
    let main_at = MAIN_METHOD.find(code)?.start();
    ANY_CLASS
        .captures_iter(&code[..main_at])
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Class name a JVM source file must be saved under.
/// The first `public class` (javac insists), then the class holding `main`,
/// then any class, then `Main`.
pub fn java_class_name(code: &str) -> String {
    PUBLIC_CLASS
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| main_class(code))
        .or_else(|| ANY_CLASS.captures(code).and_then(|c| c.get(1)).map(|m| m.as_str()))
        .unwrap_or(DEFAULT_CLASS_NAME)
        .to_string()
}

/// Class the JVM is launched with: the one holding `main`, else the file's class
pub fn java_main_class(code: &str) -> String {
    main_class(code)
        .map(str::to_string)
        .unwrap_or_else(|| java_class_name(code))
}

/// Cap diagnostic text, keeping the head so the first error survives
pub fn truncate_diagnostic(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

fn toolchain_missing(program: &str) -> String {
    format!(
        "Toolchain '{}' is not installed on the evaluation host. Please contact the administrator.",
        program
    )
}

/// Values substituted into recipe argument templates
struct Placeholders {
    source: String,
    binary: String,
    dir: String,
    class: String,
    main_class: String,
}

impl Placeholders {
    fn expand(&self, template: &[String]) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                arg.replace("{source}", &self.source)
                    .replace("{binary}", &self.binary)
                    .replace("{dir}", &self.dir)
                    .replace("{class}", &self.class)
                    .replace("{main_class}", &self.main_class)
            })
            .collect()
    }
}

enum ProcessOutcome {
    Finished(Output),
    TimedOut,
    NotFound,
    Failed(io::Error),
}

/// Spawn `argv` in `cwd`, feed `stdin`, and wait at most `limit`.
/// Dropping the wait future on timeout drops the child, which kills it.
async fn run_process(argv: &[String], stdin: Option<&str>, cwd: &Path, limit: Duration) -> ProcessOutcome {
    let Some((program, args)) = argv.split_first() else {
        return ProcessOutcome::Failed(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ProcessOutcome::NotFound,
        Err(e) => return ProcessOutcome::Failed(e),
    };

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.as_bytes().to_vec();
        tokio::spawn(async move {
            // The program may exit without reading all of its input
            let _ = pipe.write_all(&input).await;
            let _ = pipe.shutdown().await;
        });
    }

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => ProcessOutcome::Finished(output),
        Ok(Err(e)) => ProcessOutcome::Failed(e),
        Err(_) => ProcessOutcome::TimedOut,
    }
}

#[cfg(unix)]
fn signal_hint(status: &std::process::ExitStatus) -> Option<&'static str> {
    use std::os::unix::process::ExitStatusExt;
    match status.signal()? {
        6 => Some("Aborted"),
        8 => Some("Floating point exception"),
        9 => Some("Killed (likely exceeded memory limit)"),
        11 => Some("Segmentation fault"),
        _ => Some("Terminated by signal"),
    }
}

#[cfg(not(unix))]
fn signal_hint(_status: &std::process::ExitStatus) -> Option<&'static str> {
    None
}

fn runtime_error_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let status_line = match (output.status.code(), signal_hint(&output.status)) {
        (_, Some(hint)) => format!("[{}]", hint),
        (Some(code), None) => format!("[Process exited with status {}]", code),
        (None, None) => "[Process terminated abnormally]".to_string(),
    };
    if stderr.is_empty() {
        status_line
    } else {
        format!("{}\n{}", stderr, status_line)
    }
}

/// Source written to a scratch directory and, where needed, compiled.
/// The scratch directory lives exactly as long as this value.
pub struct PreparedProgram {
    language: SupportedLanguage,
    run_argv: Vec<String>,
    workdir: TempDir,
}

impl PreparedProgram {
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

/// Subprocess-based execution engine
#[derive(Debug, Clone)]
pub struct Runner {
    languages: LanguageConfigManager,
    run_timeout: Duration,
    compile_timeout: Duration,
}

impl Runner {
    pub fn new(languages: LanguageConfigManager, run_timeout: Duration, compile_timeout: Duration) -> Self {
        Self {
            languages,
            run_timeout,
            compile_timeout,
        }
    }

    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self::new(config.languages.clone(), config.run_timeout, config.compile_timeout)
    }

    /// Run `code` written in `language_tag` against `stdin`.
    /// Unrecognized tags yield `UnsupportedLanguage` without touching disk.
    pub async fn execute(&self, code: &str, language_tag: &str, stdin: &str) -> ExecutionResult {
        match SupportedLanguage::from_tag(language_tag) {
            Some(language) => self.execute_language(code, language, stdin).await,
            None => unsupported_language(language_tag),
        }
    }

    /// Prepare and run in one scratch directory (compile per call)
    pub async fn execute_language(&self, code: &str, language: SupportedLanguage, stdin: &str) -> ExecutionResult {
        match self.prepare(code, language).await {
            Ok(program) => self.run(&program, stdin).await,
            Err(failure) => failure,
        }
    }

    /// Write the source and compile it if the recipe has a compile step.
    /// On failure the returned `ExecutionResult` is what every run of this
    /// source would report.
    #[instrument(skip(self, code), fields(language = %language, source_size = code.len()))]
    pub async fn prepare(&self, code: &str, language: SupportedLanguage) -> Result<PreparedProgram, ExecutionResult> {
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(ExecutionResult::failure(
                Outcome::InternalError,
                format!("Source code exceeds the maximum size of {} bytes", MAX_SOURCE_CODE_BYTES),
            ));
        }

        let recipe = self.languages.get(language);

        let workdir = tempfile::Builder::new()
            .prefix("codegrade-")
            .tempdir()
            .map_err(|e| {
                warn!(error = %e, "Failed to create scratch directory");
                ExecutionResult::failure(
                    Outcome::InternalError,
                    "Could not create a scratch directory for execution. Please contact the administrator.",
                )
            })?;

        let class = java_class_name(code);
        let source_path = workdir.path().join(recipe.source_file_name(&class));
        let binary_path = workdir.path().join(BINARY_NAME);

        if let Err(e) = tokio::fs::write(&source_path, code).await {
            warn!(error = %e, "Failed to write source file");
            return Err(ExecutionResult::failure(
                Outcome::InternalError,
                "Could not write the submission to disk. Please contact the administrator.",
            ));
        }

        let vars = Placeholders {
            source: source_path.to_string_lossy().into_owned(),
            binary: binary_path.to_string_lossy().into_owned(),
            dir: workdir.path().to_string_lossy().into_owned(),
            class,
            main_class: java_main_class(code),
        };

        if let Some(compile) = &recipe.compile {
            let argv = vars.expand(compile);
            let start = Instant::now();
            let outcome = run_process(&argv, None, workdir.path(), self.compile_timeout).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match outcome {
                ProcessOutcome::Finished(output) if output.status.success() => {
                    debug!(elapsed_ms, "Compilation succeeded");
                }
                ProcessOutcome::Finished(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let diagnostic = if stderr.trim().is_empty() {
                        String::from_utf8_lossy(&output.stdout).trim().to_string()
                    } else {
                        stderr.trim().to_string()
                    };
                    debug!(
                        elapsed_ms,
                        error_preview = diagnostic.lines().next().unwrap_or(""),
                        "Compilation failed"
                    );
                    return Err(ExecutionResult::failure(
                        Outcome::CompileError,
                        truncate_diagnostic(&diagnostic, MAX_DIAGNOSTIC_CHARS),
                    ));
                }
                ProcessOutcome::TimedOut => {
                    warn!(elapsed_ms, "Compilation timed out");
                    return Err(ExecutionResult::failure(
                        Outcome::CompileError,
                        format!("Compilation exceeded the {}s limit", self.compile_timeout.as_secs()),
                    ));
                }
                ProcessOutcome::NotFound => {
                    warn!(toolchain = %argv[0], "Compiler not found on host");
                    return Err(ExecutionResult::failure(Outcome::InternalError, toolchain_missing(&argv[0])));
                }
                ProcessOutcome::Failed(e) => {
                    warn!(error = %e, "Compiler could not be started");
                    return Err(ExecutionResult::failure(
                        Outcome::InternalError,
                        format!(
                            "Compiler '{}' could not be started. Please contact the administrator.",
                            argv[0]
                        ),
                    ));
                }
            }
        }

        Ok(PreparedProgram {
            language,
            run_argv: vars.expand(&recipe.run),
            workdir,
        })
    }

    /// Run a prepared program once with `stdin` under the run timeout.
    /// Safe to call concurrently on the same program.
    #[instrument(skip(self, program, stdin), fields(language = %program.language, input_size = stdin.len()))]
    pub async fn run(&self, program: &PreparedProgram, stdin: &str) -> ExecutionResult {
        if stdin.len() > MAX_TEST_INPUT_BYTES {
            return ExecutionResult::failure(
                Outcome::InternalError,
                format!("Test input exceeds the maximum size of {} bytes", MAX_TEST_INPUT_BYTES),
            );
        }

        let start = Instant::now();
        let outcome = run_process(&program.run_argv, Some(stdin), program.workdir(), self.run_timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            ProcessOutcome::Finished(output) if output.status.success() => {
                debug!(elapsed_ms, "Run completed");
                ExecutionResult::success(
                    &String::from_utf8_lossy(&output.stdout),
                    &String::from_utf8_lossy(&output.stderr),
                )
            }
            // A plain non-zero exit with a clean stderr (e.g. C `void main`) still
            // produced its output; the status is kept as a note only
            ProcessOutcome::Finished(output)
                if output.stderr.iter().all(u8::is_ascii_whitespace)
                    && output.status.code().is_some()
                    && signal_hint(&output.status).is_none() =>
            {
                debug!(elapsed_ms, exit_code = ?output.status.code(), "Run completed with non-zero status");
                ExecutionResult::success(&String::from_utf8_lossy(&output.stdout), &runtime_error_message(&output))
            }
            ProcessOutcome::Finished(output) => {
                debug!(elapsed_ms, exit_code = ?output.status.code(), "Run failed");
                ExecutionResult {
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: runtime_error_message(&output),
                    outcome: Outcome::RuntimeError,
                }
            }
            ProcessOutcome::TimedOut => {
                warn!(elapsed_ms, timeout_ms = self.run_timeout.as_millis() as u64, "Run timed out");
                ExecutionResult::failure(
                    Outcome::Timeout,
                    format!("Time limit exceeded ({} ms)", self.run_timeout.as_millis()),
                )
            }
            ProcessOutcome::NotFound => {
                let program_name = program.run_argv.first().map(String::as_str).unwrap_or("");
                warn!(toolchain = %program_name, "Interpreter not found on host");
                ExecutionResult::failure(Outcome::InternalError, toolchain_missing(program_name))
            }
            ProcessOutcome::Failed(e) => {
                debug!(error = %e, "Run could not complete");
                ExecutionResult::failure(Outcome::RuntimeError, e.to_string())
            }
        }
    }
}

pub fn unsupported_language(tag: &str) -> ExecutionResult {
    ExecutionResult::failure(
        Outcome::UnsupportedLanguage,
        format!(
            "Unsupported language '{}'. Supported languages: {}",
            tag,
            SupportedLanguage::supported_list()
        ),
    )
}
