use accord_core::Registry;
use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};

use crate::handlers;

pub mod paths {
    pub const HEALTHZ: &str = "/__accord/healthz";
    pub const CONTRACTS: &str = "/__accord/contracts";
}

/// Shared, read-only serving state. Cloned per request; the registry snapshot is shared.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub unmatched_status: StatusCode,
}

impl AppState {
    pub fn new(registry: Registry, unmatched_status: u16) -> anyhow::Result<Self> {
        let unmatched_status = StatusCode::from_u16(unmatched_status)
            .with_context(|| format!("unmatched status {unmatched_status} is not an HTTP status"))?;
        Ok(Self {
            registry,
            unmatched_status,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(paths::HEALTHZ, get(handlers::healthz))
        .route(paths::CONTRACTS, get(handlers::contracts))
        .fallback(handlers::serve_stub)
        .with_state(state)
}
