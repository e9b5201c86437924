use accord_contracts::{GeneratedKind, MatcherKind, ValueSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON type tag used by type matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

/// Compiled consumer-side test applied to one location of an incoming request.
#[derive(Debug, Clone)]
pub enum Predicate {
    Equals(Value),
    Regex(Regex),
    Kind(GeneratedKind),
    Type {
        expected: Option<JsonType>,
        min: Option<usize>,
        max: Option<usize>,
    },
    Null,
}

impl Predicate {
    /// Predicate for a leaf descriptor as seen by the consumer (stub) side.
    pub fn for_consumer(spec: &ValueSpec) -> Result<Self, String> {
        match spec {
            ValueSpec::Literal(value) => Ok(Predicate::Equals(value.clone())),
            ValueSpec::Generated(kind) => Ok(Predicate::Kind(*kind)),
            ValueSpec::Regex(pattern) => anchored(pattern).map(Predicate::Regex),
            ValueSpec::Sided { consumer, .. } => match &**consumer {
                ValueSpec::Sided { .. } => Err("sided values nest at most one level".into()),
                inner => Predicate::for_consumer(inner),
            },
            ValueSpec::Object(fields) if fields.is_empty() => {
                Ok(Predicate::Equals(Value::Object(Default::default())))
            }
            ValueSpec::Array(items) if items.is_empty() => {
                Ok(Predicate::Equals(Value::Array(vec![])))
            }
            ValueSpec::Object(_) | ValueSpec::Array(_) => {
                Err("containers are matched per leaf".into())
            }
            ValueSpec::FromRequest(_)
            | ValueSpec::Template(_)
            | ValueSpec::ExecutedAssertion(_) => {
                Err("value cannot be matched on the request side".into())
            }
        }
    }

    /// Predicate for a stub-side matcher rule; `declared` is the body descriptor at the
    /// rule's path, if any.
    pub fn for_matcher(kind: &MatcherKind, declared: Option<&ValueSpec>) -> Result<Self, String> {
        match kind {
            MatcherKind::Regex { value } => anchored(value).map(Predicate::Regex),
            MatcherKind::Equality => declared
                .and_then(consumer_literal)
                .map(|value| Predicate::Equals(value.clone()))
                .ok_or_else(|| "equality matcher needs a literal at its path".to_string()),
            MatcherKind::Type {
                min_occurrence,
                max_occurrence,
            } => Ok(Predicate::Type {
                expected: declared.and_then(declared_type),
                min: *min_occurrence,
                max: *max_occurrence,
            }),
            MatcherKind::Null => Ok(Predicate::Null),
            MatcherKind::Command { value } => {
                Err(format!("command `{value}` cannot run on the stub side"))
            }
        }
    }

    /// Tests a typed body value.
    pub fn test_json(&self, value: &Value) -> bool {
        match self {
            Predicate::Equals(expected) => json_eq(expected, value),
            Predicate::Regex(regex) => scalar_text(value).is_some_and(|text| regex.is_match(&text)),
            Predicate::Kind(kind) => kind.accepts_json(value),
            Predicate::Type { expected, min, max } => type_matches(*expected, *min, *max, value),
            Predicate::Null => value.is_null(),
        }
    }

    /// Tests a textual value (header, query parameter, path).
    pub fn test_text(&self, text: &str) -> bool {
        match self {
            Predicate::Equals(expected) => render_text(expected) == text,
            Predicate::Regex(regex) => regex.is_match(text),
            Predicate::Kind(kind) => kind.accepts_text(text),
            Predicate::Type { .. } => true,
            Predicate::Null => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Predicate::Equals(_) => "equality",
            Predicate::Regex(_) => "regex",
            Predicate::Kind(_) => "generated",
            Predicate::Type { .. } => "type",
            Predicate::Null => "null",
        }
    }
}

pub(crate) fn type_matches(
    expected: Option<JsonType>,
    min: Option<usize>,
    max: Option<usize>,
    value: &Value,
) -> bool {
    let actual = JsonType::of(value);
    let type_ok = match expected {
        Some(expected) => expected == actual,
        None => actual != JsonType::Null,
    };
    let len = match value {
        Value::Array(items) => Some(items.len()),
        _ => None,
    };
    let min_ok = match (min, len) {
        (Some(min), Some(len)) => len >= min,
        (Some(_), None) => false,
        _ => true,
    };
    let max_ok = match (max, len) {
        (Some(max), Some(len)) => len <= max,
        (Some(_), None) => false,
        _ => true,
    };
    type_ok && min_ok && max_ok
}

fn consumer_literal(spec: &ValueSpec) -> Option<&Value> {
    match spec {
        ValueSpec::Literal(value) => Some(value),
        ValueSpec::Sided { consumer, .. } => match &**consumer {
            ValueSpec::Literal(value) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn declared_type(spec: &ValueSpec) -> Option<JsonType> {
    match spec {
        ValueSpec::Object(_) => Some(JsonType::Object),
        ValueSpec::Array(_) => Some(JsonType::Array),
        other => other.known_literal().map(JsonType::of),
    }
}

/// Compiles `pattern` so it must match the whole value.
pub fn anchored(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|err| err.to_string())
}

/// Equality where numbers compare by value (`25` == `25.0`).
pub fn json_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_eq(x, y)))
        }
        (a, b) => a == b,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Textual rendering used on headers, query strings and template interpolation.
pub fn render_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
