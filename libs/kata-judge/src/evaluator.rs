/// Output Evaluator - Language-Agnostic Comparison Logic
///
/// **Core Responsibility:**
/// Compare actual program output against expected output, and build the
/// per-test rows shown in the results panel.
///
/// **Critical Properties:**
/// - Knows nothing about sandboxes or language runtimes
/// - Pure functions: (outputs, expectations) → verdicts
///
/// **Normalization Rules (Applied to All Languages):**
/// - Trim leading and trailing whitespace: YES
/// - Internal whitespace: preserved
/// - Case sensitivity: YES (exact match required)
/// - Numeric tolerance: NO

use kata_common::types::{CompilationResult, TestCase, TestResult};

fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// True when both outputs are equal after trimming
pub fn compare_outputs(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Combined program for one test: candidate code, newline, test input
pub fn prepare_code_with_input(code: &str, input: &str) -> String {
    format!("{}\n{}", code, input)
}

/// Text shown as a test's actual output.
///
/// The program output on success, the error otherwise (or "No output"),
/// with a leading echo of the test input removed.
pub fn display_output(result: &CompilationResult, input: &str) -> String {
    let raw = if result.success {
        result.output.as_str()
    } else {
        result.error.as_deref().unwrap_or("No output")
    };

    let cleaned = if input.is_empty() {
        raw
    } else {
        raw.strip_prefix(input)
            .map(|rest| rest.trim_start_matches(['\n', '\r']))
            .unwrap_or(raw)
    };

    cleaned.trim().to_string()
}

/// Build the results-panel row for one test case
pub fn evaluate_display(test_case: &TestCase, result: &CompilationResult) -> TestResult {
    let actual_output = display_output(result, &test_case.input);
    let success = compare_outputs(&actual_output, &test_case.expected_output);

    TestResult {
        success,
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("  hello  "), "hello");
        assert_eq!(normalize_output("hello\n"), "hello");
        assert_eq!(normalize_output("\nhello\n"), "hello");
        assert_eq!(normalize_output("  hello world  \n"), "hello world");
        assert_eq!(normalize_output(""), "");
        assert_eq!(normalize_output("   "), "");
    }

    #[test]
    fn test_compare_matches_trimmed_equality() {
        let samples = ["", " ", "5", " 5\n", "5 ", "a  b", "a b", "Hello", "hello", "\r\n1\r\n"];
        for a in samples {
            for b in samples {
                assert_eq!(compare_outputs(a, b), a.trim() == b.trim(), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_compare_empty_outputs() {
        assert!(compare_outputs("", ""));
        assert!(compare_outputs("  \n", "\t"));
    }

    #[test]
    fn test_compare_case_sensitive() {
        assert!(!compare_outputs("Hello", "hello"));
    }

    #[test]
    fn test_compare_internal_whitespace_preserved() {
        assert!(!compare_outputs("1  2", "1 2"));
        assert!(compare_outputs("line1\nline2\n", "line1\nline2"));
    }

    #[test]
    fn test_prepare_code_with_input() {
        assert_eq!(
            prepare_code_with_input("def add(a,b):\n    return a+b", "print(add(2,3))"),
            "def add(a,b):\n    return a+b\nprint(add(2,3))"
        );
    }

    #[test]
    fn test_display_output_prefers_error() {
        let result = CompilationResult::failure("ValueError: bad");
        assert_eq!(display_output(&result, "print(1)"), "ValueError: bad");

        let silent = CompilationResult {
            success: false,
            output: String::new(),
            error: None,
        };
        assert_eq!(display_output(&silent, "print(1)"), "No output");
    }

    #[test]
    fn test_display_output_strips_input_echo() {
        let result = CompilationResult::success("print(1)\r\n1");
        assert_eq!(display_output(&result, "print(1)"), "1");

        let untouched = CompilationResult::success("1");
        assert_eq!(display_output(&untouched, "print(1)"), "1");
    }

    #[test]
    fn test_evaluate_display_pass_and_fail() {
        let case = TestCase::new("print(add(2,3))", "5");

        let pass = evaluate_display(&case, &CompilationResult::success("5"));
        assert!(pass.success);
        assert_eq!(pass.actual_output, "5");

        let fail = evaluate_display(&case, &CompilationResult::success("6"));
        assert!(!fail.success);
        assert_eq!(fail.expected_output, "5");
        assert_eq!(fail.input, "print(add(2,3))");
    }
}
