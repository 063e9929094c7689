use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages a challenge can be written in.
///
/// The set is closed: adding a language means adding a variant here and
/// handling it in every exhaustive match (executor error surfacing, builtin
/// configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::TypeScript];

    /// Parse a language tag, case-insensitively. Unknown tags yield `None`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" => Some(Language::Python),
            "javascript" => Some(Language::JavaScript),
            "typescript" => Some(Language::TypeScript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Display label: the tag with its first letter upper-cased.
    pub fn label(&self) -> String {
        let tag = self.as_str();
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of source code tagged with its language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSubmission {
    pub content: String,
    pub language: Language,
}

impl CodeSubmission {
    pub fn new(content: impl Into<String>, language: Language) -> Self {
        Self {
            content: content.into(),
            language,
        }
    }
}

/// One test: `input` is appended to the candidate code, `expected_output`
/// is the literal text expected on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub input: CodeSubmission,
    pub expected_output: CodeSubmission,
}

/// Test case as authored in a challenge document (language implied by the challenge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }

    pub fn to_test(&self, language: Language) -> Test {
        Test {
            input: CodeSubmission::new(self.input.clone(), language),
            expected_output: CodeSubmission::new(self.expected_output.clone(), language),
        }
    }
}

/// Result of a single execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompilationResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Failure that keeps whatever the program printed before it died.
    pub fn failure_with_output(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }

    pub fn unsupported(language: &str) -> Self {
        Self::failure(format!("Unsupported language: {}", language))
    }
}

/// Details of the first failing test found by the test runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TestOutcome {
    RuntimeError {
        input: String,
        expected_output: String,
        error: String,
    },
    WrongAnswer {
        input: String,
        expected_output: String,
        actual_output: String,
    },
    TimeLimitExceeded {
        input: String,
        expected_output: String,
    },
}

impl TestOutcome {
    pub fn expected_output(&self) -> &str {
        match self {
            TestOutcome::RuntimeError { expected_output, .. }
            | TestOutcome::WrongAnswer { expected_output, .. }
            | TestOutcome::TimeLimitExceeded { expected_output, .. } => expected_output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    pub output: String,
}

/// Verdict carried by a [`Submission`]. Exactly one per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Verdict {
    Accepted,
    RuntimeError {
        error: String,
        last_expected_output: Vec<ExpectedOutput>,
    },
    WrongAnswer {
        input: String,
        output: String,
        expected_output: String,
    },
    TimeLimitExceeded {
        last_expected_output: Vec<ExpectedOutput>,
    },
}

impl Verdict {
    pub fn kind(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::RuntimeError { .. } => "runtimeError",
            Verdict::WrongAnswer { .. } => "wrongAnswer",
            Verdict::TimeLimitExceeded { .. } => "timeLimitExceeded",
        }
    }
}

/// Outcome of submitting code against a full test suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub tests_passed: usize,
    pub tests_total: usize,
    pub code: CodeSubmission,
    #[serde(flatten)]
    pub verdict: Verdict,
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self.verdict, Verdict::Accepted)
    }
}

/// Per-test row shown in the test results panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
}

impl TestResult {
    /// A failing row that does not correspond to any test case.
    pub fn synthetic_failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            input: String::new(),
            expected_output: String::new(),
            actual_output: message.into(),
        }
    }
}

/// A challenge document as produced by the hosting application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeData {
    pub id: String,
    pub language: Language,
    pub initial_code: String,
    #[serde(alias = "tests", default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
}
