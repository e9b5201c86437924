use std::fmt;

use serde::Serialize;

use crate::Field;

/// One structurally invalid contract (or unreadable contract source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadIssue {
    pub origin: String,
    pub contract_id: Option<String>,
    pub reason: String,
}

impl LoadIssue {
    pub fn new(
        origin: impl Into<String>,
        contract_id: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            contract_id: contract_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.contract_id {
            Some(id) => write!(f, "{} (contract `{id}`): {}", self.origin, self.reason),
            None => write!(f, "{}: {}", self.origin, self.reason),
        }
    }
}

/// Aggregate of every finding made while ingesting a contract set.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("contract set rejected with {} issue(s): {}", .issues.len(), render_issues(.issues))]
pub struct LoadError {
    pub issues: Vec<LoadIssue>,
}

fn render_issues(issues: &[LoadIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A contract cannot be compiled into a stub predicate or a verification case.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("contract `{contract_id}` {field}: {reason}")]
pub struct SpecificationError {
    pub contract_id: String,
    pub field: Field,
    pub reason: String,
}

impl SpecificationError {
    pub fn new(contract_id: &str, field: &Field, reason: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.to_string(),
            field: field.clone(),
            reason: reason.into(),
        }
    }
}

/// A `fromRequest` reference has no value in the concrete incoming request.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("contract `{contract_id}` {field}: incoming request has no value at `{reference}`")]
pub struct ResolutionError {
    pub contract_id: String,
    pub field: Field,
    pub reference: String,
}

/// Failure to synthesize a stub for one request.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StubError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Specification(#[from] SpecificationError),
}

/// A named assertion routine was not registered by the host.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("no assertion routine registered as `{routine}` (contract `{contract_id}`, {field})")]
pub struct BindingError {
    pub routine: String,
    pub contract_id: String,
    pub field: String,
}
