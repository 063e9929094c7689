mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kata")]
#[command(about = "Kata - Run and judge code challenges locally", long_about = None)]
struct Cli {
    /// Path to languages.json (built-in languages are used when the default file is absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sandbox backend: process or docker (defaults to KATA_SANDBOX, then process)
    #[arg(long, global = true)]
    sandbox: Option<String>,

    /// Per-execution time limit in milliseconds
    #[arg(long, global = true)]
    time_limit_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a program once and print its output
    Run {
        /// Language tag (python, javascript, typescript)
        #[arg(short, long)]
        language: String,

        /// Source file to run
        #[arg(short, long, conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Inline source code
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Judge code against a challenge's test cases
    Submit {
        /// Challenge JSON file
        #[arg(long)]
        challenge: PathBuf,

        /// Replace the session code with this file before submitting
        #[arg(long)]
        code_file: Option<PathBuf>,

        /// Session state file, restored before and saved after the submission
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// List configured languages
    Languages,

    /// Write the built-in languages.json
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "config/languages.json")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so program output on stdout stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("KATA_LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }

    let cli = Cli::parse();
    let options = commands::GlobalOptions {
        config: cli.config,
        sandbox: cli.sandbox,
        time_limit_ms: cli.time_limit_ms,
    };

    match cli.command {
        Commands::Run { language, file, code } => {
            commands::run_code(&options, &language, file.as_deref(), code.as_deref()).await?;
        }
        Commands::Submit {
            challenge,
            code_file,
            state,
        } => {
            commands::submit_challenge(&options, &challenge, code_file.as_deref(), state.as_deref()).await?;
        }
        Commands::Languages => {
            commands::list_languages(&options)?;
        }
        Commands::InitConfig { path } => {
            commands::init_config(&path)?;
        }
    }

    Ok(())
}
