// Scripted sandbox for unit tests: no interpreter, deterministic output.
//
// Each source line is interpreted on its own:
// - `print(<expr>)`      prints the registered response for <expr>, or <expr> with quotes removed
// - `raise Name("msg")`  exits 1 with a Python-style traceback ending in `Name: msg`
// - `while True:`        never finishes on its own
// - `#sleep <ms>`        delays the result
// - `infra_failure()`    makes the sandbox itself fail

use crate::engine::{RawExecution, Sandbox, SandboxRequest};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedSandbox {
    responses: HashMap<String, String>,
    executions: AtomicUsize,
    sources: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, expr: &str, output: &str) -> Self {
        self.responses.insert(expr.to_string(), output.to_string());
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: SandboxRequest) -> Result<RawExecution> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut sources) = self.sources.lock() {
            sources.push(request.source.clone());
        }

        let mut stdout = String::new();

        for line in request.source.lines().map(str::trim) {
            if line == "infra_failure()" {
                bail!("scripted sandbox failure");
            }
            if let Some(ms) = line.strip_prefix("#sleep ") {
                let ms: u64 = ms.trim().parse().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if line.starts_with("while True") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if let Some(rest) = line.strip_prefix("raise ") {
                let (name, message) = match rest.split_once('(') {
                    Some((name, arg)) => (name, arg.trim_end_matches(')').trim_matches('"')),
                    None => (rest, ""),
                };
                return Ok(RawExecution {
                    stdout,
                    stderr: format!(
                        "Traceback (most recent call last):\n  File \"main.py\", line 1, in <module>\n{}: {}\n",
                        name, message
                    ),
                    exit_code: Some(1),
                    ..RawExecution::default()
                });
            }
            if let Some(expr) = line.strip_prefix("print(").and_then(|l| l.strip_suffix(')')) {
                let value = self
                    .responses
                    .get(expr)
                    .cloned()
                    .unwrap_or_else(|| expr.trim_matches(|c| c == '"' || c == '\'').to_string());
                stdout.push_str(&value);
                stdout.push('\n');
            }
        }

        Ok(RawExecution {
            stdout,
            exit_code: Some(0),
            ..RawExecution::default()
        })
    }
}
