use std::process::ExitCode;
use std::time::Duration;

use accord_core::config::Config;
use accord_core::{
    synthesize_all, verify, ActualResponse, ConcreteRequest, DelegateRegistry, VerificationReport,
};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use reqwest::blocking::Client;
use reqwest::Method;

use super::{load, SourceArgs};
use crate::EXIT_FAILED;

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Producer base URL (defaults to [verify].base_url)
    #[arg(long)]
    base_url: Option<String>,
    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(cfg: &Config, args: &VerifyArgs) -> Result<ExitCode> {
    let base_url = args
        .base_url
        .clone()
        .or_else(|| cfg.verify.base_url.clone())
        .ok_or_else(|| anyhow!("no producer base URL; pass --base-url or set [verify].base_url"))?;
    let base_url = base_url.trim_end_matches('/').to_string();
    let timeout = Duration::from_millis(args.timeout_ms.unwrap_or(cfg.verify.timeout_ms()));

    let dir = args.source.resolve(cfg);
    let registry = load(cfg, &dir)?;
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .context("building http client")?;
    // No routines ship with the CLI; delegated assertions surface as binding errors.
    let delegates = DelegateRegistry::new();

    let mut reports = Vec::new();
    let mut failed = 0usize;
    for outcome in synthesize_all(&registry, cfg.generation.parallelism()) {
        let case = match outcome.result {
            Ok(case) => case,
            Err(err) => {
                eprintln!("SKIP {}: {err}", outcome.contract_id);
                failed += 1;
                continue;
            }
        };
        let actual = match send(&client, &base_url, &case.request) {
            Ok(actual) => actual,
            Err(err) => {
                eprintln!("FAIL {}: {err:#}", case.contract_id);
                failed += 1;
                continue;
            }
        };
        let report = verify(&case, &actual, &delegates);
        if !report.passed() {
            failed += 1;
        }
        if !args.json {
            print_report(&report);
        }
        reports.push(report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    tracing::info!(
        target: "accord::verify",
        verified = reports.len(),
        failed,
        "verification finished"
    );
    Ok(if failed > 0 {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    })
}

fn send(client: &Client, base_url: &str, request: &ConcreteRequest) -> Result<ActualResponse> {
    let method = Method::from_bytes(request.method.as_bytes())
        .with_context(|| format!("invalid method `{}`", request.method))?;
    let url = format!("{base_url}{}", request.path);
    let mut builder = client.request(method, &url).query(&request.query);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }
    let response = builder.send().with_context(|| format!("request to {url}"))?;

    let mut actual = ActualResponse::new(response.status().as_u16());
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            actual = actual.with_header(name.as_str(), value);
        }
    }
    let text = response.text().context("reading response body")?;
    if !text.is_empty() {
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        actual = actual.with_body(body);
    }
    Ok(actual)
}

fn print_report(report: &VerificationReport) {
    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    println!("{verdict} {}", report.contract_id);
    for outcome in report.failures() {
        match &outcome.detail {
            Some(detail) => println!("  {}: {detail}", outcome.field),
            None => println!("  {}", outcome.field),
        }
    }
}
