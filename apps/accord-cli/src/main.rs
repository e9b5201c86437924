use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{ConfigCmd, GenerateArgs, ValidateArgs, VerifyArgs};

/// Load or config failure.
pub const EXIT_STARTUP: u8 = 2;
/// At least one contract failed synthesis or verification.
pub const EXIT_FAILED: u8 = 1;

#[derive(Parser)]
#[command(name = "accord-cli", version, about = "Contract set tooling")]
struct Cli {
    /// Path to accord.toml (defaults to ./accord.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a contract set and report every structural problem
    Validate(ValidateArgs),
    /// Emit one verification case per contract (JSON)
    Generate(GenerateArgs),
    /// Drive verification cases against a running producer
    Verify(VerifyArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

fn main() -> ExitCode {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Config { cmd } = &cli.command {
        return commands::config::run(cmd);
    }
    let cfg = accord_core::config::resolve_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Validate(args) => commands::contracts::validate(&cfg, &args),
        Commands::Generate(args) => commands::contracts::generate(&cfg, &args),
        Commands::Verify(args) => commands::verify::run(&cfg, &args),
        Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}
