mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "CodeGrade CLI - Evaluate submissions locally and inspect the host toolchains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a source file against a JSON test suite
    Evaluate {
        /// Source file to evaluate
        #[arg(short, long)]
        file: PathBuf,

        /// Declared language (python, c, cpp/c++, java)
        #[arg(short, long)]
        language: String,

        /// JSON test suite: `[{"input": ..., "expected": ...}]` or `{"test_cases": [...]}`
        #[arg(short, long)]
        tests: PathBuf,

        /// Compile once and run every test against the same build
        #[arg(long, default_value = "false")]
        compile_once: bool,

        /// Run test cases concurrently
        #[arg(long, default_value = "false")]
        parallel: bool,

        /// Print the full report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Guess the language of a source file
    Detect {
        /// Source file to inspect
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List the configured language recipes
    Languages,

    /// Check which language toolchains are installed on this host
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            file,
            language,
            tests,
            compile_once,
            parallel,
            json,
        } => {
            commands::evaluate(&file, &language, &tests, compile_once, parallel, json).await?;
        }
        Commands::Detect { file } => {
            commands::detect(&file)?;
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
        Commands::Doctor => {
            commands::doctor()?;
        }
    }

    Ok(())
}
