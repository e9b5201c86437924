use std::path::PathBuf;
use std::process::ExitCode;

use accord_core::config::Config;
use accord_core::{synthesize_all, CaseOutcome};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use super::{load, SourceArgs};
use crate::EXIT_FAILED;

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Also fail when a contract cannot be turned into a verification case
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Write cases to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

pub fn validate(cfg: &Config, args: &ValidateArgs) -> Result<ExitCode> {
    let dir = args.source.resolve(cfg);
    let registry = load(cfg, &dir)?;
    for contract in registry.all() {
        let priority = contract
            .priority
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        println!("{:<8} {} {}", priority, contract.request.method, contract.id);
    }
    let outcomes = synthesize_all(&registry, cfg.generation.parallelism());
    let failed = report_failures(&outcomes);
    println!(
        "{} contract(s) loaded from {}; {} not verifiable",
        registry.len(),
        dir.display(),
        failed
    );
    if args.strict && failed > 0 {
        return Ok(ExitCode::from(EXIT_FAILED));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn generate(cfg: &Config, args: &GenerateArgs) -> Result<ExitCode> {
    let dir = args.source.resolve(cfg);
    let registry = load(cfg, &dir)?;
    let outcomes = synthesize_all(&registry, cfg.generation.parallelism());
    let failed = report_failures(&outcomes);

    let cases: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| outcome.result.as_ref().ok())
        .collect();
    let errors: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| {
            outcome.result.as_ref().err().map(|err| {
                json!({
                    "contract_id": outcome.contract_id,
                    "field": err.field,
                    "reason": err.reason,
                })
            })
        })
        .collect();
    let doc = json!({"cases": cases, "errors": errors});
    let text = if args.pretty {
        serde_json::to_string_pretty(&doc)?
    } else {
        doc.to_string()
    };
    match &args.out {
        Some(path) => {
            std::fs::write(path, text + "\n")
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {} case(s) to {}", cases.len(), path.display());
        }
        None => println!("{text}"),
    }
    Ok(if failed > 0 {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    })
}

fn report_failures(outcomes: &[CaseOutcome]) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        if let Err(err) = &outcome.result {
            eprintln!("warning: {err}");
            failed += 1;
        }
    }
    failed
}
