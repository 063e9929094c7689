// Test runner: fail-fast evaluation of a test suite under a per-test deadline

use crate::evaluator::{compare_outputs, prepare_code_with_input};
use crate::executor::Executor;
use anyhow::Result;
use kata_common::types::{CodeSubmission, CompilationResult, Language, Test, TestOutcome};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const TIME_LIMIT_EXCEEDED: &str = "Time Limit Exceeded";

/// Result of racing one execution against the deadline
#[derive(Debug)]
pub enum Deadline<T> {
    Completed(T),
    TimedOut,
}

/// Race an execution against `time_limit`.
///
/// When the timer wins, the execution is abandoned rather than killed: the
/// sandbox task keeps running in the background until it finishes or hits
/// its own wall cap.
pub async fn execute_with_deadline(
    executor: &Executor,
    code: &str,
    language: Language,
    time_limit: Duration,
) -> Deadline<Result<CompilationResult>> {
    match tokio::time::timeout(time_limit, executor.execute(code, language)).await {
        Ok(result) => Deadline::Completed(result),
        Err(_) => {
            warn!(
                language = %language,
                time_limit_ms = time_limit.as_millis() as u64,
                "Execution lost the deadline race; detaching"
            );
            Deadline::TimedOut
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Tests passed before the first failure
    pub passed: usize,
    pub failed_test: Option<TestOutcome>,
}

pub struct TestRunner<'a> {
    executor: &'a Executor,
    time_limit: Duration,
}

impl<'a> TestRunner<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self {
            executor,
            time_limit: executor.limits().time_limit,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Run tests in order, stopping at the first failure
    #[instrument(skip(self, code, tests), fields(language = %code.language, tests = tests.len()))]
    pub async fn run_all(&self, code: &CodeSubmission, tests: &[Test]) -> RunSummary {
        let mut passed = 0;

        for (index, test) in tests.iter().enumerate() {
            let source = prepare_code_with_input(&code.content, &test.input.content);
            let outcome = self.run_one(&source, code.language, test).await;

            match outcome {
                None => {
                    passed += 1;
                    debug!(test_index = index, "Test passed");
                }
                Some(failure) => {
                    info!(
                        test_index = index,
                        passed,
                        outcome = ?failure,
                        "Stopping at first failing test"
                    );
                    return RunSummary {
                        passed,
                        failed_test: Some(failure),
                    };
                }
            }
        }

        info!(passed, "All tests passed");
        RunSummary {
            passed,
            failed_test: None,
        }
    }

    async fn run_one(&self, source: &str, language: Language, test: &Test) -> Option<TestOutcome> {
        let input = test.input.content.clone();
        let expected_output = test.expected_output.content.clone();

        match execute_with_deadline(self.executor, source, language, self.time_limit).await {
            Deadline::TimedOut => Some(TestOutcome::TimeLimitExceeded {
                input,
                expected_output,
            }),
            Deadline::Completed(Err(e)) => Some(TestOutcome::RuntimeError {
                input,
                expected_output,
                error: format!("{:#}", e),
            }),
            Deadline::Completed(Ok(result)) if !result.success => Some(TestOutcome::RuntimeError {
                input,
                expected_output,
                error: result.error.unwrap_or_else(|| "Runtime Error".to_string()),
            }),
            Deadline::Completed(Ok(result)) if !compare_outputs(&result.output, &expected_output) => {
                Some(TestOutcome::WrongAnswer {
                    input,
                    expected_output,
                    actual_output: result.output.trim().to_string(),
                })
            }
            Deadline::Completed(Ok(_)) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSandbox;
    use kata_common::config::{ExecutionLimits, LanguageConfigManager};
    use kata_common::types::TestCase;
    use std::sync::Arc;
    use std::time::Instant;

    const ADD: &str = "def add(a,b):\n    return a+b";

    fn executor(sandbox: Arc<ScriptedSandbox>) -> Executor {
        Executor::new(sandbox, LanguageConfigManager::builtin(), ExecutionLimits::default())
    }

    fn tests(cases: &[(&str, &str)]) -> Vec<Test> {
        cases
            .iter()
            .map(|(input, expected)| TestCase::new(*input, *expected).to_test(Language::Python))
            .collect()
    }

    fn code(content: &str) -> CodeSubmission {
        CodeSubmission::new(content, Language::Python)
    }

    #[tokio::test]
    async fn test_all_pass() {
        let sandbox = Arc::new(ScriptedSandbox::new().respond("add(2,3)", "5").respond("add(1,1)", "2"));
        let executor = executor(sandbox.clone());

        let summary = TestRunner::new(&executor)
            .run_all(&code(ADD), &tests(&[("print(add(2,3))", "5"), ("print(add(1,1))", "2")]))
            .await;

        assert_eq!(summary, RunSummary { passed: 2, failed_test: None });
        assert_eq!(sandbox.executions(), 2);
    }

    #[tokio::test]
    async fn test_combined_source_appends_input() {
        let sandbox = Arc::new(ScriptedSandbox::new().respond("add(2,3)", "5"));
        let executor = executor(sandbox.clone());

        TestRunner::new(&executor)
            .run_all(&code(ADD), &tests(&[("print(add(2,3))", "5")]))
            .await;

        assert_eq!(sandbox.sources(), vec![format!("{}\nprint(add(2,3))", ADD)]);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let sandbox = Arc::new(
            ScriptedSandbox::new()
                .respond("add(2,3)", "5")
                .respond("add(1,1)", "2")
                .respond("add(4,4)", "8"),
        );
        let executor = executor(sandbox.clone());

        let summary = TestRunner::new(&executor)
            .run_all(
                &code(ADD),
                &tests(&[("print(add(2,3))", "5"), ("print(add(1,1))", "3"), ("print(add(4,4))", "8")]),
            )
            .await;

        assert_eq!(summary.passed, 1);
        assert_eq!(
            summary.failed_test,
            Some(TestOutcome::WrongAnswer {
                input: "print(add(1,1))".to_string(),
                expected_output: "3".to_string(),
                actual_output: "2".to_string(),
            })
        );
        // The third test is never executed
        assert_eq!(sandbox.executions(), 2);
    }

    #[tokio::test]
    async fn test_runtime_error_outcome() {
        let executor = executor(Arc::new(ScriptedSandbox::new()));

        let summary = TestRunner::new(&executor)
            .run_all(&code("raise ValueError(\"bad\")"), &tests(&[("print(1)", "1")]))
            .await;

        assert_eq!(summary.passed, 0);
        assert_eq!(
            summary.failed_test,
            Some(TestOutcome::RuntimeError {
                input: "print(1)".to_string(),
                expected_output: "1".to_string(),
                error: "ValueError: bad".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_infra_failure_becomes_runtime_error() {
        let executor = executor(Arc::new(ScriptedSandbox::new()));

        let summary = TestRunner::new(&executor)
            .run_all(&code("infra_failure()"), &tests(&[("print(1)", "1")]))
            .await;

        match summary.failed_test {
            Some(TestOutcome::RuntimeError { error, .. }) => {
                assert!(error.contains("scripted sandbox failure"))
            }
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_infinite_loop_is_time_limit_exceeded() {
        let sandbox = Arc::new(ScriptedSandbox::new());
        let executor = executor(sandbox.clone());
        let runner = TestRunner::new(&executor).with_time_limit(Duration::from_millis(50));

        let start = Instant::now();
        let summary = runner
            .run_all(&code("while True:\n    pass"), &tests(&[("print(1)", "1"), ("print(2)", "2")]))
            .await;

        assert_eq!(summary.passed, 0);
        assert_eq!(
            summary.failed_test,
            Some(TestOutcome::TimeLimitExceeded {
                input: "print(1)".to_string(),
                expected_output: "1".to_string(),
            })
        );
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(sandbox.executions(), 1);
    }

    #[tokio::test]
    async fn test_wrong_answer_output_is_trimmed() {
        let executor = executor(Arc::new(ScriptedSandbox::new().respond("add(2,3)", "  5  ")));

        let summary = TestRunner::new(&executor)
            .run_all(&code(ADD), &tests(&[("print(add(2,3))", "6")]))
            .await;

        match summary.failed_test {
            Some(TestOutcome::WrongAnswer { actual_output, .. }) => assert_eq!(actual_output, "5"),
            other => panic!("expected wrong answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_time_limit_from_executor() {
        let executor = executor(Arc::new(ScriptedSandbox::new()));
        assert_eq!(TestRunner::new(&executor).time_limit(), Duration::from_millis(5000));
    }
}
