//! Contract IR shared by the stub server, the matcher and the verification generator.
//! Contracts arrive already parsed (JSON/YAML records); this crate owns their typed shape
//! and the structural checks that run before a contract set is accepted.

mod contract;
mod kind;
mod path;
mod value;

pub use contract::*;
pub use kind::*;
pub use path::*;
pub use value::*;

/// Shared error type for contract parsing and validation routines.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("invalid json path `{0}`")]
    InvalidPath(String),
    #[error("invalid value descriptor: {0}")]
    InvalidValue(String),
    #[error("{field}: invalid regex `{pattern}`: {reason}")]
    InvalidRegex {
        field: String,
        pattern: String,
        reason: String,
    },
    #[error("{field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("{field}: declared by more than one matcher")]
    ConflictingMatcher { field: String },
    #[error("assertion failed: {0}")]
    AssertionFailed(&'static str),
}
