use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

mod app;
mod handlers;
mod responses;

pub(crate) use app::AppState;

#[derive(Parser, Debug)]
#[command(name = "accord-stub-server", version, about = "Serve stubs from a contract set")]
struct Args {
    /// Path to accord.toml (defaults to ./accord.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Contract directory; overrides the config file and ACCORD_CONTRACTS_DIR
    #[arg(long)]
    contracts: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    accord_otel::init();
    let args = Args::parse();

    let (state, addr) = match bootstrap(&args) {
        Ok(ready) => ready,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("error: failed to bind {addr}: {err}");
            std::process::exit(2);
        }
    };
    info!(%addr, contracts = state.registry.len(), "stub server listening");

    let server =
        axum::serve(listener, app::router(state)).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }
}

fn bootstrap(args: &Args) -> anyhow::Result<(AppState, SocketAddr)> {
    let cfg = accord_core::config::resolve_config(args.config.as_deref())?;
    let dir = args
        .contracts
        .clone()
        .unwrap_or_else(|| PathBuf::from(cfg.contracts.dir()));
    let registry = accord_core::load_registry(&dir, &cfg.contracts.extensions())
        .with_context(|| format!("loading contracts from {}", dir.display()))?;
    let bind = format!("{}:{}", cfg.server.host(), cfg.server.port());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let state = AppState::new(registry, cfg.server.unmatched_status())?;
    Ok((state, addr))
}

async fn shutdown_signal() {
    info!("shutdown signal listener active");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
