use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the accord.toml JSON schema
    Schema(SchemaArgs),
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

pub fn run(cmd: &ConfigCmd) -> Result<ExitCode> {
    match cmd {
        ConfigCmd::Schema(args) => {
            let schema = accord_core::config::config_schema_json();
            if args.pretty {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                println!("{schema}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
