use std::fmt;

use accord_contracts::JsonPath;
use serde::{Deserialize, Serialize};

/// Locates a declaration inside a request or response pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "location", content = "key", rename_all = "snake_case")]
pub enum Field {
    Method,
    Status,
    Url,
    Header(String),
    Query(String),
    Body(JsonPath),
}

impl Field {
    pub fn body_root() -> Self {
        Field::Body(JsonPath::root())
    }

    pub(crate) fn child_field(&self, name: &str) -> Self {
        match self {
            Field::Body(path) => Field::Body(path.field(name)),
            other => other.clone(),
        }
    }

    pub(crate) fn child_index(&self, index: usize) -> Self {
        match self {
            Field::Body(path) => Field::Body(path.index(index)),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Method => f.write_str("method"),
            Field::Status => f.write_str("status"),
            Field::Url => f.write_str("url"),
            Field::Header(name) => write!(f, "headers.{name}"),
            Field::Query(name) => write!(f, "query.{name}"),
            Field::Body(path) => write!(f, "body {path}"),
        }
    }
}
