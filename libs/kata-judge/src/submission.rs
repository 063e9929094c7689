// Submission classifier: turns a fail-fast run into one of four verdicts

use crate::runner::{RunSummary, TestRunner};
use kata_common::types::{CodeSubmission, ExpectedOutput, Submission, Test, TestOutcome, Verdict};
use tracing::info;

/// Evaluate `code` against `tests` and classify the outcome.
///
/// `Accepted` iff the runner found no failing test, in which case
/// `tests_passed == tests_total == tests.len()`.
pub async fn submit_code(runner: &TestRunner<'_>, code: &CodeSubmission, tests: &[Test]) -> Submission {
    let summary = runner.run_all(code, tests).await;
    let submission = classify(code, tests.len(), summary);

    info!(
        verdict = submission.verdict.kind(),
        tests_passed = submission.tests_passed,
        tests_total = submission.tests_total,
        "Submission classified"
    );

    submission
}

pub fn classify(code: &CodeSubmission, tests_total: usize, summary: RunSummary) -> Submission {
    let verdict = match summary.failed_test {
        None => Verdict::Accepted,
        Some(TestOutcome::RuntimeError {
            expected_output,
            error,
            ..
        }) => Verdict::RuntimeError {
            error,
            last_expected_output: vec![ExpectedOutput {
                output: expected_output,
            }],
        },
        Some(TestOutcome::WrongAnswer {
            input,
            expected_output,
            actual_output,
        }) => Verdict::WrongAnswer {
            input,
            output: actual_output,
            expected_output,
        },
        Some(TestOutcome::TimeLimitExceeded {
            expected_output, ..
        }) => Verdict::TimeLimitExceeded {
            last_expected_output: vec![ExpectedOutput {
                output: expected_output,
            }],
        },
    };

    Submission {
        tests_passed: summary.passed.min(tests_total),
        tests_total,
        code: code.clone(),
        verdict,
    }
}
