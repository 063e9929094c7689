// CLI commands for running and judging challenges
use anyhow::{bail, Context, Result};
use kata_common::config::{ExecutionLimits, LanguageConfigManager, DEFAULT_CONFIG_PATH};
use kata_common::types::{ChallengeData, Language, Verdict};
use kata_judge::{execute_with_deadline, ChallengeSession, CompletionCallback, Deadline, Executor, Sandbox, SandboxKind};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct GlobalOptions {
    pub config: Option<std::path::PathBuf>,
    pub sandbox: Option<String>,
    pub time_limit_ms: Option<u64>,
}

fn load_languages(options: &GlobalOptions) -> Result<LanguageConfigManager> {
    if let Some(path) = &options.config {
        return LanguageConfigManager::load(path);
    }

    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        LanguageConfigManager::load_default()
    } else {
        debug!(path = DEFAULT_CONFIG_PATH, "No languages.json found, using built-in languages");
        Ok(LanguageConfigManager::builtin())
    }
}

fn build_executor(options: &GlobalOptions) -> Result<Executor> {
    let languages = load_languages(options)?;

    let mut limits = ExecutionLimits::from_env()?;
    if let Some(ms) = options.time_limit_ms {
        limits = limits.with_time_limit(Duration::from_millis(ms));
        limits.validate()?;
    }

    let kind = match &options.sandbox {
        Some(raw) => SandboxKind::from_str(raw)
            .ok_or_else(|| anyhow::anyhow!("Invalid sandbox: {} (valid: process, docker)", raw))?,
        None => SandboxKind::from_env()?,
    };
    let sandbox = kind.build()?;

    info!(
        sandbox = sandbox.name(),
        languages = ?languages.list_languages(),
        time_limit_ms = limits.time_limit.as_millis() as u64,
        "Executor ready"
    );

    Ok(Executor::new(sandbox, languages, limits))
}

/// Execute a program once
pub async fn run_code(options: &GlobalOptions, language: &str, file: Option<&Path>, code: Option<&str>) -> Result<()> {
    let source = match (file, code) {
        (Some(path), _) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?,
        (None, Some(code)) => code.to_string(),
        (None, None) => bail!("Provide either --file or --code"),
    };

    let Some(language) = Language::from_str(language) else {
        println!("Unsupported language: {}", language);
        return Ok(());
    };

    let executor = build_executor(options)?;
    println!("▶️  Running {} code...", language);

    let time_limit = executor.limits().time_limit;
    match execute_with_deadline(&executor, &source, language, time_limit).await {
        Deadline::Completed(Ok(result)) if result.success => println!("{}", result.output),
        Deadline::Completed(Ok(result)) => println!("Error:\n{}", result.error.unwrap_or_default()),
        Deadline::Completed(Err(e)) => println!("Compilation failed:\n{:#}", e),
        Deadline::TimedOut => println!("Error:\nTime Limit Exceeded"),
    }

    Ok(())
}

fn load_challenge(path: &Path) -> Result<ChallengeData> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read challenge: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse challenge: {}", path.display()))
}

/// Judge code against a challenge, optionally carrying session state between invocations
pub async fn submit_challenge(
    options: &GlobalOptions,
    challenge_path: &Path,
    code_file: Option<&Path>,
    state: Option<&Path>,
) -> Result<()> {
    let challenge = load_challenge(challenge_path)?;
    let executor = build_executor(options)?;

    let mut session = match state {
        Some(path) if path.exists() => ChallengeSession::load_from(executor, path)?,
        _ => ChallengeSession::new(executor),
    };

    let challenge_id = challenge.id.clone();
    let on_completion: CompletionCallback = Arc::new(move || {
        println!("🏆 Challenge '{}' solved!", challenge_id);
    });
    session.initialize(challenge, Some(on_completion));

    if let Some(path) = code_file {
        let code = fs::read_to_string(path)
            .with_context(|| format!("Failed to read code file: {}", path.display()))?;
        session.set_code(code);
    }

    println!("🚀 Submitting {} solution...", session.current_language());
    session.submit().await;

    if let Some(submission) = session.last_submission() {
        println!();
        match &submission.verdict {
            Verdict::Accepted => println!("✅ Accepted"),
            Verdict::WrongAnswer {
                input,
                output,
                expected_output,
            } => {
                println!("❌ Wrong Answer");
                println!("   Input:    {}", input);
                println!("   Output:   {}", output);
                println!("   Expected: {}", expected_output);
            }
            Verdict::RuntimeError { error, .. } => {
                println!("💥 Runtime Error");
                println!("   {}", error);
            }
            Verdict::TimeLimitExceeded { .. } => println!("⏱️  Time Limit Exceeded"),
        }
        println!("   Passed {}/{} tests", submission.tests_passed, submission.tests_total);
    }

    println!();
    println!("{:<4} {:<6} {:<30} {:<20} {}", "#", "RESULT", "INPUT", "EXPECTED", "ACTUAL");
    for (index, result) in session.test_results().iter().enumerate() {
        println!(
            "{:<4} {:<6} {:<30} {:<20} {}",
            index + 1,
            if result.success { "PASS" } else { "FAIL" },
            single_line(&result.input),
            single_line(&result.expected_output),
            single_line(&result.actual_output),
        );
    }

    if let Some(path) = state {
        session.save_to(path)?;
        println!();
        println!("💾 Session saved to {}", path.display());
    }

    Ok(())
}

fn single_line(text: &str) -> String {
    text.replace('\n', "\\n")
}

/// Print configured languages
pub fn list_languages(options: &GlobalOptions) -> Result<()> {
    let languages = load_languages(options)?;

    println!("{:<12} {:<8} {:<20} {:<8} {:<5} {}", "LANGUAGE", "VERSION", "IMAGE", "MEMORY", "CPU", "COMMAND");
    for language in Language::ALL {
        if languages.is_configured(&language) {
            println!("{}", language_row(&languages, language)?);
        }
    }

    Ok(())
}

fn language_row(languages: &LanguageConfigManager, language: Language) -> Result<String> {
    let config = languages.get_config(&language)?;
    let command = std::iter::once(config.execution.command.as_str())
        .chain(config.execution.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    Ok(format!(
        "{:<12} {:<8} {:<20} {:<8} {:<5} {}",
        language,
        config.version,
        languages.get_image(&language)?,
        format!("{}MB", languages.get_memory_limit_mb(&language)?),
        languages.get_cpu_limit(&language)?,
        command,
    ))
}

/// Write the built-in language table to disk
pub fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config already exists: {}", path.display());
    }

    LanguageConfigManager::builtin().save(path)?;
    println!("✅ Wrote {}", path.display());
    println!("   Edit it to change interpreters, images or resource limits.");

    Ok(())
}
