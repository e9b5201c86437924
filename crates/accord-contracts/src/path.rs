use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ContractError;

static BARE_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("field regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

/// Path into a structured body: `$`, `$.a.b`, `$.items[0]`, `$['odd key']`, `$.items[*].id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a path expression. A missing leading `$` is tolerated (`a.b` == `$.a.b`).
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let trimmed = raw.trim();
        let rest = match trimmed.strip_prefix('$') {
            Some(rest) => rest,
            None if trimmed.is_empty() => return Err(ContractError::InvalidPath(raw.into())),
            None if trimmed.starts_with('[') => return Self::parse(&format!("${trimmed}")),
            None => return Self::parse(&format!("$.{trimmed}")),
        };

        let mut segments = Vec::new();
        let chars: Vec<char> = rest.chars().collect();
        let mut idx = 0;
        while idx < chars.len() {
            match chars[idx] {
                '.' => {
                    idx += 1;
                    let start = idx;
                    while idx < chars.len() && chars[idx] != '.' && chars[idx] != '[' {
                        idx += 1;
                    }
                    let name: String = chars[start..idx].iter().collect();
                    if name == "*" {
                        segments.push(Segment::Wildcard);
                    } else if BARE_FIELD_RE.is_match(&name) {
                        segments.push(Segment::Field(name));
                    } else {
                        return Err(ContractError::InvalidPath(raw.into()));
                    }
                }
                '[' => {
                    let close = chars[idx..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| idx + offset)
                        .ok_or_else(|| ContractError::InvalidPath(raw.into()))?;
                    let inner: String = chars[idx + 1..close].iter().collect();
                    segments.push(parse_bracket(&inner).ok_or_else(|| {
                        ContractError::InvalidPath(raw.into())
                    })?);
                    idx = close + 1;
                }
                _ => return Err(ContractError::InvalidPath(raw.into())),
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the path addresses exactly one location (no wildcard segments).
    pub fn is_concrete(&self) -> bool {
        !self.segments.contains(&Segment::Wildcard)
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Field(name.into()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    /// Returns the single value addressed by a concrete path.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Field(name), Value::Object(map)) => map.get(name)?,
                (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Returns every value addressed by the path, expanding wildcards over arrays and objects.
    pub fn select<'a>(&self, value: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![value];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                match (segment, node) {
                    (Segment::Field(name), Value::Object(map)) => next.extend(map.get(name)),
                    (Segment::Index(i), Value::Array(items)) => next.extend(items.get(*i)),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {}
                }
            }
            current = next;
        }
        current
    }

    /// True when `other` is addressed by this path or lies beneath a location it addresses.
    pub fn covers(&self, other: &JsonPath) -> bool {
        if other.segments.len() < self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(mine, theirs)| match (mine, theirs) {
                (Segment::Wildcard, Segment::Index(_) | Segment::Field(_) | Segment::Wildcard) => {
                    true
                }
                (a, b) => a == b,
            })
    }
}

fn parse_bracket(inner: &str) -> Option<Segment> {
    let inner = inner.trim();
    if inner == "*" {
        return Some(Segment::Wildcard);
    }
    if let Ok(index) = inner.parse::<usize>() {
        return Some(Segment::Index(index));
    }
    let quoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    Some(Segment::Field(quoted.to_string()))
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Field(name) if BARE_FIELD_RE.is_match(name) => write!(f, ".{name}")?,
                Segment::Field(name) => write!(f, "['{name}']")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
                Segment::Wildcard => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for JsonPath {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JsonPath {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JsonPath> for String {
    fn from(path: JsonPath) -> Self {
        path.to_string()
    }
}
