/// Challenge Session - Editor State for One Challenge View
///
/// **Responsibility:**
/// Hold the code, language, test cases and run/submit status of the
/// challenge currently on screen, and mediate between UI actions and the
/// executor / test runner.
///
/// **Ownership:**
/// One session per hosting view, single writer. Persistence is explicit:
/// the host calls `snapshot`/`save_to` on unload and `restore`/`load_from`
/// on load. Mutations never write to disk on their own.
///
/// **Failure semantics:**
/// Program failures are shown as data. Only sandbox infrastructure failures
/// reach the top-level handlers in `run` and `submit`, which turn them into
/// displayed messages.

use crate::evaluator::{evaluate_display, prepare_code_with_input};
use crate::executor::Executor;
use crate::runner::{execute_with_deadline, Deadline, TestRunner, TIME_LIMIT_EXCEEDED};
use crate::submission::submit_code;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use kata_common::types::{
    ChallengeData, CodeSubmission, CompilationResult, Language, Submission, Test, TestCase, TestResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const NO_TEST_CASES_MESSAGE: &str = "Error: No test cases found for this language";

/// Invoked once per accepted submission
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalTab {
    Output,
    Tests,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageOption {
    pub value: Language,
    pub label: String,
}

impl LanguageOption {
    fn for_language(language: Language) -> Self {
        Self {
            value: language,
            label: language.label(),
        }
    }
}

/// Durable part of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub challenge_id: Option<String>,
    pub code: String,
    pub current_language: Language,
    pub test_cases: Vec<TestCase>,
    pub is_completed: bool,
}

pub struct ChallengeSession {
    executor: Executor,
    challenge_id: Option<String>,
    code: String,
    current_language: Language,
    available_languages: Vec<LanguageOption>,
    test_cases: Vec<TestCase>,
    test_results: Vec<TestResult>,
    execution_output: String,
    is_loading_run: bool,
    is_loading_submit: bool,
    is_completed: bool,
    is_terminal_open: bool,
    active_terminal_tab: TerminalTab,
    last_submission: Option<Submission>,
    on_completion: Option<CompletionCallback>,
}

impl fmt::Debug for ChallengeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeSession")
            .field("challenge_id", &self.challenge_id)
            .field("current_language", &self.current_language)
            .field("test_cases", &self.test_cases.len())
            .field("is_loading_run", &self.is_loading_run)
            .field("is_loading_submit", &self.is_loading_submit)
            .field("is_completed", &self.is_completed)
            .finish_non_exhaustive()
    }
}

impl ChallengeSession {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            challenge_id: None,
            code: String::new(),
            current_language: Language::JavaScript,
            available_languages: Vec::new(),
            test_cases: Vec::new(),
            test_results: Vec::new(),
            execution_output: String::new(),
            is_loading_run: false,
            is_loading_submit: false,
            is_completed: false,
            is_terminal_open: true,
            active_terminal_tab: TerminalTab::Output,
            last_submission: None,
            on_completion: None,
        }
    }

    /// Rebuild a session from its durable fields; everything transient starts fresh
    pub fn restore(executor: Executor, snapshot: SessionSnapshot) -> Self {
        let mut session = Self::new(executor);
        session.available_languages = match snapshot.challenge_id {
            Some(_) => vec![LanguageOption::for_language(snapshot.current_language)],
            None => Vec::new(),
        };
        session.challenge_id = snapshot.challenge_id;
        session.code = snapshot.code;
        session.current_language = snapshot.current_language;
        session.test_cases = snapshot.test_cases;
        session.is_completed = snapshot.is_completed;
        session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            challenge_id: self.challenge_id.clone(),
            code: self.code.clone(),
            current_language: self.current_language,
            test_cases: self.test_cases.clone(),
            is_completed: self.is_completed,
        }
    }

    pub fn load_from(executor: Executor, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session state: {}", path.display()))?;
        let snapshot: SessionSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session state: {}", path.display()))?;
        debug!(path = %path.display(), challenge_id = ?snapshot.challenge_id, "Session restored");
        Ok(Self::restore(executor, snapshot))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(&self.snapshot())
            .context("Failed to serialize session state")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session state: {}", path.display()))?;
        debug!(path = %path.display(), "Session saved");
        Ok(())
    }

    /// Load a challenge. Only takes effect when its id differs from the loaded one.
    ///
    /// Returns whether the session was re-initialized. On the same id only a
    /// provided completion callback is refreshed, so code restored from a
    /// snapshot survives.
    pub fn initialize(&mut self, challenge: ChallengeData, on_completion: Option<CompletionCallback>) -> bool {
        if self.challenge_id.as_deref() == Some(challenge.id.as_str()) {
            if on_completion.is_some() {
                self.on_completion = on_completion;
            }
            debug!(challenge_id = %challenge.id, "Challenge already loaded");
            return false;
        }

        info!(
            challenge_id = %challenge.id,
            language = %challenge.language,
            test_cases = challenge.test_cases.len(),
            "Initializing challenge session"
        );

        self.available_languages = vec![LanguageOption::for_language(challenge.language)];
        self.challenge_id = Some(challenge.id);
        self.code = challenge.initial_code;
        self.current_language = challenge.language;
        self.test_cases = challenge.test_cases;
        self.is_completed = challenge.is_completed;
        self.test_results.clear();
        self.execution_output.clear();
        self.is_loading_run = false;
        self.is_loading_submit = false;
        self.last_submission = None;
        self.on_completion = on_completion;
        true
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    pub fn toggle_terminal(&mut self) {
        self.is_terminal_open = !self.is_terminal_open;
    }

    pub fn set_active_terminal_tab(&mut self, tab: TerminalTab) {
        self.active_terminal_tab = tab;
    }

    fn show_terminal(&mut self, tab: TerminalTab) {
        self.active_terminal_tab = tab;
        self.is_terminal_open = true;
    }

    /// Execute the current code once, without test cases
    #[instrument(skip(self), fields(challenge_id = ?self.challenge_id, language = %self.current_language))]
    pub async fn run(&mut self) {
        self.is_loading_run = true;
        self.execution_output = format!("Running {} code...", self.current_language);
        self.show_terminal(TerminalTab::Output);

        let time_limit = self.executor.limits().time_limit;
        let outcome =
            execute_with_deadline(&self.executor, &self.code, self.current_language, time_limit).await;

        self.execution_output = match outcome {
            Deadline::Completed(Ok(result)) if result.success => result.output,
            Deadline::Completed(Ok(result)) => {
                format!("Error:\n{}", result.error.unwrap_or_default())
            }
            Deadline::Completed(Err(e)) => {
                error!(error = %e, "Run failed");
                format!("Compilation failed:\n{:#}", e)
            }
            Deadline::TimedOut => format!("Error:\n{}", TIME_LIMIT_EXCEEDED),
        };

        self.is_loading_run = false;
    }

    /// Judge the current code against every test case
    #[instrument(skip(self), fields(challenge_id = ?self.challenge_id, language = %self.current_language))]
    pub async fn submit(&mut self) {
        self.is_loading_submit = true;
        self.last_submission = None;
        self.show_terminal(TerminalTab::Tests);

        if self.test_cases.is_empty() {
            warn!("Submit without test cases");
            self.test_results = vec![TestResult::synthetic_failure(NO_TEST_CASES_MESSAGE)];
            self.is_loading_submit = false;
            return;
        }

        let outcome = self.evaluate_submission().await;
        match outcome {
            Ok((submission, results)) => {
                self.test_results = results;
                if submission.is_accepted() {
                    info!(tests_total = submission.tests_total, "Challenge solved");
                    self.is_completed = true;
                    if let Some(on_completion) = &self.on_completion {
                        on_completion();
                    }
                }
                self.last_submission = Some(submission);
            }
            Err(e) => {
                error!(error = %e, "Submission pipeline failed");
                self.test_results = vec![TestResult::synthetic_failure(format!("Submission failed: {:#}", e))];
                self.is_completed = false;
            }
        }

        self.is_loading_submit = false;
    }

    /// Authoritative fail-fast verdict alongside an exhaustive per-test display pass
    async fn evaluate_submission(&self) -> Result<(Submission, Vec<TestResult>)> {
        let code = CodeSubmission::new(self.code.clone(), self.current_language);
        let tests: Vec<Test> = self
            .test_cases
            .iter()
            .map(|tc| tc.to_test(self.current_language))
            .collect();
        let runner = TestRunner::new(&self.executor);

        let (submission, display) = tokio::join!(submit_code(&runner, &code, &tests), self.display_results());

        Ok((submission, display?))
    }

    async fn display_results(&self) -> Result<Vec<TestResult>> {
        let time_limit = self.executor.limits().time_limit;

        let rows = join_all(self.test_cases.iter().map(move |tc| async move {
            let source = prepare_code_with_input(&self.code, &tc.input);
            let result =
                match execute_with_deadline(&self.executor, &source, self.current_language, time_limit).await {
                    Deadline::Completed(result) => result?,
                    Deadline::TimedOut => CompilationResult::failure(TIME_LIMIT_EXCEEDED),
                };
            Ok::<_, anyhow::Error>(evaluate_display(tc, &result))
        }))
        .await;

        rows.into_iter().collect()
    }

    pub fn challenge_id(&self) -> Option<&str> {
        self.challenge_id.as_deref()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn current_language(&self) -> Language {
        self.current_language
    }

    pub fn available_languages(&self) -> &[LanguageOption] {
        &self.available_languages
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    pub fn execution_output(&self) -> &str {
        &self.execution_output
    }

    pub fn is_loading_run(&self) -> bool {
        self.is_loading_run
    }

    pub fn is_loading_submit(&self) -> bool {
        self.is_loading_submit
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn is_terminal_open(&self) -> bool {
        self.is_terminal_open
    }

    pub fn active_terminal_tab(&self) -> TerminalTab {
        self.active_terminal_tab
    }

    pub fn last_submission(&self) -> Option<&Submission> {
        self.last_submission.as_ref()
    }
}
