/// Sandbox Engine - Isolated Execution of One Program
///
/// **Core Responsibility:**
/// Run one source file in a fresh, isolated runtime and capture raw output.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local process, Docker container)
/// - Engine does NOT know about tests or expected outputs
/// - Engine does NOT interpret errors; it returns raw stdout/stderr/exit code
///
/// Every call gets a brand new runtime: a new workspace directory and child
/// process, or a new container. Nothing survives between two calls.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use kata_common::config::LanguageConfig;
use kata_common::types::Language;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Everything a backend needs to run one program. Owned so it can move into a spawned task.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub language: Language,
    pub config: LanguageConfig,
    pub source: String,
    pub wall_cap: Duration,
    pub max_output_bytes: usize,
}

/// Raw result of one execution, before any interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExecution {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the program was killed by a signal or never reported an exit code
    pub exit_code: Option<i64>,
    pub wall_cap_exceeded: bool,
    pub output_truncated: bool,
    pub execution_time_ms: u64,
}

impl RawExecution {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0) && !self.wall_cap_exceeded
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    /// Run one program to completion (or to the wall cap).
    ///
    /// `Err` means the sandbox itself failed (interpreter missing, daemon
    /// unreachable). Failures of the program are reported in `RawExecution`.
    async fn run(&self, request: SandboxRequest) -> Result<RawExecution>;
}

/// Which backend to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxKind {
    Process,
    Docker,
}

impl SandboxKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "process" => Some(SandboxKind::Process),
            "docker" => Some(SandboxKind::Docker),
            _ => None,
        }
    }

    /// KATA_SANDBOX=process|docker, defaulting to process
    pub fn from_env() -> Result<Self> {
        match std::env::var("KATA_SANDBOX") {
            Ok(raw) => Self::from_str(&raw)
                .ok_or_else(|| anyhow::anyhow!("Invalid KATA_SANDBOX: {} (valid: process, docker)", raw)),
            Err(_) => Ok(SandboxKind::Process),
        }
    }

    pub fn build(self) -> Result<Arc<dyn Sandbox>> {
        match self {
            SandboxKind::Process => Ok(Arc::new(ProcessSandbox::new())),
            SandboxKind::Docker => Ok(Arc::new(crate::docker::DockerSandbox::connect()?)),
        }
    }
}

/// Workspace cleanup guard - removes the per-execution directory on drop
struct WorkspaceGuard {
    path: PathBuf,
}

impl WorkspaceGuard {
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("kata-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create workspace: {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(workspace = %self.path.display(), error = %e, "Failed to remove workspace");
        }
    }
}

/// Local child-process backend.
///
/// Each execution gets a new directory, a new interpreter process and a
/// scrubbed environment. This is process isolation only; it is not a
/// hardened multi-tenant sandbox.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    root: PathBuf,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        Self {
            root: std::env::temp_dir(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn command(&self, config: &LanguageConfig, workspace: &Path, file: &Path) -> Command {
        let mut cmd = Command::new(&config.execution.command);
        cmd.args(&config.execution.args)
            .arg(file)
            .current_dir(workspace)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("HOME", workspace)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("NODE_NO_WARNINGS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run(&self, request: SandboxRequest) -> Result<RawExecution> {
        let workspace = WorkspaceGuard::create(&self.root)?;
        let file = workspace
            .path
            .join(format!("main{}", request.config.execution.file_extension));

        tokio::fs::write(&file, request.source.as_bytes())
            .await
            .with_context(|| format!("Failed to write source file: {}", file.display()))?;

        let start_time = Instant::now();

        let mut child = self
            .command(&request.config, &workspace.path, &file)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start {} runtime '{}'",
                    request.language, request.config.execution.command
                )
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            bail!("Failed to capture output of {} runtime", request.language);
        };

        let limit = request.max_output_bytes;
        let collect = async {
            let (out, err, status) = tokio::join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        let outcome = tokio::time::timeout(request.wall_cap, collect).await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(((stdout, out_truncated), (stderr, err_truncated), status))) => {
                debug!(
                    language = %request.language,
                    exit_code = ?status.code(),
                    execution_ms = execution_time_ms,
                    "Process exited"
                );
                Ok(RawExecution {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code: status.code().map(i64::from),
                    wall_cap_exceeded: false,
                    output_truncated: out_truncated || err_truncated,
                    execution_time_ms,
                })
            }
            Ok(Err(e)) => Err(e).context("Failed to collect process output"),
            Err(_) => {
                warn!(
                    language = %request.language,
                    wall_cap_ms = request.wall_cap.as_millis() as u64,
                    "Process exceeded wall cap - killing"
                );
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to kill process");
                }
                Ok(RawExecution {
                    wall_cap_exceeded: true,
                    execution_time_ms,
                    ..RawExecution::default()
                })
            }
        }
    }
}

/// Read a stream up to `limit` bytes. Past the limit the rest is drained and
/// discarded so the writer never blocks on a full pipe.
pub(crate) async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok((buf, false));
        }
        if buf.len() + n > limit {
            let room = limit - buf.len();
            buf.extend_from_slice(&chunk[..room]);
            tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_common::config::LanguageConfigManager;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn python_request(source: &str) -> SandboxRequest {
        SandboxRequest {
            language: Language::Python,
            config: LanguageConfigManager::builtin()
                .get_config(&Language::Python)
                .unwrap()
                .clone(),
            source: source.to_string(),
            wall_cap: Duration::from_secs(10),
            max_output_bytes: 1024,
        }
    }

    #[test]
    fn test_sandbox_kind_parsing() {
        assert_eq!(SandboxKind::from_str("process"), Some(SandboxKind::Process));
        assert_eq!(SandboxKind::from_str("Docker"), Some(SandboxKind::Docker));
        assert_eq!(SandboxKind::from_str("vm"), None);
    }

    #[tokio::test]
    async fn test_read_capped_within_limit() {
        let data: &[u8] = b"hello world";
        let (buf, truncated) = read_capped(data, 64).await.unwrap();
        assert_eq!(buf, b"hello world");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn test_read_capped_truncates() {
        let data = vec![b'x'; 20_000];
        let (buf, truncated) = read_capped(&data[..], 100).await.unwrap();
        assert_eq!(buf.len(), 100);
        assert!(truncated);
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_infra_error() {
        let mut request = python_request("print(1)");
        request.config.execution.command = "kata-definitely-not-an-interpreter".to_string();

        let result = ProcessSandbox::new().run(request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_process_captures_stdout() {
        if !python_available() {
            return;
        }
        let raw = ProcessSandbox::new()
            .run(python_request("print('hi')\nprint(2 + 3)"))
            .await
            .unwrap();
        assert_eq!(raw.stdout, "hi\n5\n");
        assert!(raw.exited_cleanly());
        assert!(!raw.output_truncated);
    }

    #[tokio::test]
    async fn test_process_reports_failure() {
        if !python_available() {
            return;
        }
        let raw = ProcessSandbox::new()
            .run(python_request("raise ValueError(\"bad\")"))
            .await
            .unwrap();
        assert_eq!(raw.exit_code, Some(1));
        assert!(raw.stderr.contains("ValueError: bad"));
    }

    #[tokio::test]
    async fn test_process_wall_cap() {
        if !python_available() {
            return;
        }
        let mut request = python_request("while True:\n    pass");
        request.wall_cap = Duration::from_millis(300);

        let raw = ProcessSandbox::new().run(request).await.unwrap();
        assert!(raw.wall_cap_exceeded);
        assert!(!raw.exited_cleanly());
    }

    #[tokio::test]
    async fn test_process_output_cap() {
        if !python_available() {
            return;
        }
        let raw = ProcessSandbox::new()
            .run(python_request("print('y' * 5000)"))
            .await
            .unwrap();
        assert!(raw.output_truncated);
        assert_eq!(raw.stdout.len(), 1024);
    }

    #[tokio::test]
    async fn test_workspace_removed_after_run() {
        if !python_available() {
            return;
        }
        let root = std::env::temp_dir().join(format!("kata-root-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();

        ProcessSandbox::with_root(&root)
            .run(python_request("open('scratch.txt', 'w').write('x')"))
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        let _ = std::fs::remove_dir_all(&root);
    }
}
