pub mod docker;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod runner;
pub mod session;
pub mod submission;

#[cfg(test)]
mod testing;

pub use engine::{ProcessSandbox, Sandbox, SandboxKind};
pub use executor::Executor;
pub use runner::{execute_with_deadline, Deadline, RunSummary, TestRunner};
pub use session::{ChallengeSession, CompletionCallback, SessionSnapshot, TerminalTab};
pub use submission::submit_code;
