/// Executor - Run One Program, Report a CompilationResult
///
/// **Responsibility:**
/// Dispatch by language to a sandbox backend and turn raw process output
/// into a `CompilationResult` with a human-readable error.
///
/// **Guarantees:**
/// - A language without configuration fails closed with `Unsupported language: <tag>`
/// - Every call runs in a fresh runtime (the sandbox never reuses one)
/// - The sandbox runs in its own spawned task: the caller only awaits a handle,
///   so dropping the caller's future detaches the execution instead of killing it
/// - Program failures are data; `Err` is reserved for sandbox infrastructure failures

use crate::engine::{RawExecution, Sandbox, SandboxRequest};
use anyhow::{bail, Context, Result};
use kata_common::config::{ExecutionLimits, LanguageConfigManager};
use kata_common::types::{CompilationResult, Language};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Marker used by embedded interpreters to wrap a nested Python exception
const PYTHON_ERROR_MARKER: &str = "PythonError:";

#[derive(Clone)]
pub struct Executor {
    sandbox: Arc<dyn Sandbox>,
    languages: Arc<LanguageConfigManager>,
    limits: ExecutionLimits,
}

impl Executor {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        languages: LanguageConfigManager,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            sandbox,
            languages: Arc::new(languages),
            limits,
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Execute code given a free-form language tag, failing closed on unknown tags
    pub async fn execute_tagged(&self, code: &str, language: &str) -> Result<CompilationResult> {
        match Language::from_str(language) {
            Some(language) => self.execute(code, language).await,
            None => {
                warn!(language = %language, "Rejected unsupported language");
                Ok(CompilationResult::unsupported(language))
            }
        }
    }

    #[instrument(skip(self, code), fields(language = %language, sandbox = self.sandbox.name(), source_size = code.len()))]
    pub async fn execute(&self, code: &str, language: Language) -> Result<CompilationResult> {
        let Ok(config) = self.languages.get_config(&language) else {
            warn!("Language has no configured runtime");
            return Ok(CompilationResult::unsupported(language.as_str()));
        };

        if code.len() > self.limits.max_source_bytes {
            return Ok(CompilationResult::failure(format!(
                "Source code exceeds maximum size of {} bytes",
                self.limits.max_source_bytes
            )));
        }

        let request = SandboxRequest {
            language,
            config: config.clone(),
            source: code.to_string(),
            wall_cap: self.limits.wall_cap,
            max_output_bytes: self.limits.max_output_bytes,
        };

        let sandbox = Arc::clone(&self.sandbox);
        let handle = tokio::spawn(async move { sandbox.run(request).await });
        let raw = handle.await.context("Sandbox task failed")??;

        debug!(
            exit_code = ?raw.exit_code,
            execution_ms = raw.execution_time_ms,
            "Execution finished"
        );

        interpret(language, &raw, &self.limits)
    }
}

/// Classify raw process output into success or a readable error.
///
/// A runtime that refused to start never ran the candidate code, so it is
/// reported as `Err` instead of a program failure.
fn interpret(language: Language, raw: &RawExecution, limits: &ExecutionLimits) -> Result<CompilationResult> {
    if let Some(diagnostic) = runtime_startup_failure(language, raw) {
        bail!("{} runtime failed to start: {}", language, diagnostic);
    }

    let output = raw.stdout.trim().to_string();

    if raw.wall_cap_exceeded {
        return Ok(CompilationResult::failure_with_output(
            output,
            format!(
                "Execution exceeded hard wall-clock limit of {}ms",
                limits.wall_cap.as_millis()
            ),
        ));
    }

    if !raw.exited_cleanly() {
        let error = error_message(language, &raw.stderr)
            .unwrap_or_else(|| exit_description(raw.exit_code));
        return Ok(CompilationResult::failure_with_output(output, error));
    }

    if raw.output_truncated {
        return Ok(CompilationResult::failure_with_output(
            output,
            format!("Output limit exceeded ({} bytes)", limits.max_output_bytes),
        ));
    }

    Ok(CompilationResult::success(output))
}

/// Diagnostic printed by the runtime itself before any user code ran,
/// e.g. `node: bad option: --experimental-strip-types` (exit code 9)
fn runtime_startup_failure(language: Language, raw: &RawExecution) -> Option<String> {
    if raw.exit_code == Some(0) || raw.wall_cap_exceeded {
        return None;
    }

    match language {
        Language::JavaScript | Language::TypeScript => raw
            .stderr
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("node: "))
            .map(str::to_string),
        Language::Python => None,
    }
}

fn exit_description(exit_code: Option<i64>) -> String {
    match exit_code {
        Some(code) => format!("Process exited with code {}", code),
        None => "Process terminated by signal".to_string(),
    }
}

pub(crate) fn error_message(language: Language, stderr: &str) -> Option<String> {
    match language {
        Language::Python => python_error_line(stderr),
        Language::JavaScript | Language::TypeScript => node_error_line(stderr),
    }
}

/// Keep only the final error line of a Python traceback.
///
/// A line carrying the nested interpreter marker wins over the plain last
/// line, with the marker itself stripped.
pub(crate) fn python_error_line(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if let Some(line) = lines
        .iter()
        .rev()
        .find(|line| line.contains(PYTHON_ERROR_MARKER) && !line.contains("Traceback"))
    {
        return Some(line.replace(PYTHON_ERROR_MARKER, "").trim().to_string());
    }

    lines.last().map(|line| line.to_string())
}

/// Pick the `<Name>Error: message` line out of node's uncaught exception report
pub(crate) fn node_error_line(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();

    let is_error_line = |line: &&str| {
        if line.starts_with(char::is_whitespace) {
            return false;
        }
        if line.starts_with("Uncaught ") {
            return true;
        }
        match line.split_once(':') {
            Some((head, _)) => {
                !head.is_empty()
                    && head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && (head.ends_with("Error") || head.ends_with("Exception"))
            }
            None => false,
        }
    };

    if let Some(line) = lines.iter().copied().find(is_error_line) {
        return Some(line.to_string());
    }

    // Source location, caret and stack frames carry no message
    let meaningful = |line: &&str| {
        let line = line.trim();
        !line.starts_with('/')
            && !line.starts_with("file://")
            && !line.starts_with("node:internal")
            && !line.starts_with("at ")
            && !line.starts_with("Node.js v")
            && !line.starts_with("(Use `node")
            && line.chars().any(|c| c.is_alphanumeric())
    };

    // A thrown non-Error value is printed right after the caret line
    let after_caret = lines
        .iter()
        .rposition(|line| {
            let line = line.trim();
            !line.is_empty() && line.chars().all(|c| c == '^')
        })
        .map(|pos| &lines[pos + 1..])
        .unwrap_or(&[]);

    after_caret
        .iter()
        .copied()
        .find(meaningful)
        .or_else(|| lines.iter().copied().find(meaningful))
        .map(|line| line.trim().to_string())
}
