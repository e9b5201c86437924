pub mod config;
pub mod contracts;
pub mod verify;

use std::path::{Path, PathBuf};

use accord_core::config::Config;
use accord_core::{LoadError, Registry};
use anyhow::Result;
use clap::Args;

pub use config::ConfigCmd;
pub use contracts::{GenerateArgs, ValidateArgs};
pub use verify::VerifyArgs;

/// Contract directory selection shared by every command that loads a set.
#[derive(Args, Clone, Debug)]
pub struct SourceArgs {
    /// Contract directory (defaults to [contracts].dir from the config)
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

impl SourceArgs {
    pub fn resolve(&self, cfg: &Config) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(cfg.contracts.dir()))
    }
}

/// Loads the registry, printing every issue on failure.
pub fn load(cfg: &Config, dir: &Path) -> Result<Registry> {
    accord_core::load_registry(dir, &cfg.contracts.extensions()).map_err(|err: LoadError| {
        for issue in &err.issues {
            eprintln!("  {issue}");
        }
        anyhow::anyhow!(
            "{} contract issue(s) in {}",
            err.issues.len(),
            dir.display()
        )
    })
}
