use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ContractError, GeneratedKind, JsonPath};

const ANY: &str = "$any";
const REGEX: &str = "$regex";
const CONSUMER: &str = "$consumer";
const PRODUCER: &str = "$producer";
const FROM_REQUEST: &str = "$fromRequest";
const EXECUTE: &str = "$execute";
const TEMPLATE: &str = "$template";

/// Field-level descriptor of how a value is produced on the stub side and verified on the
/// producer side.
///
/// On disk literals are plain JSON; dynamic values are single-purpose objects whose keys start
/// with `$` (`{"$any": "anyUuid"}`, `{"$regex": "[0-9]+"}`, `{"$consumer": .., "$producer": ..}`,
/// `{"$fromRequest": "body:$.name"}`, `{"$execute": "assertStatus"}`, `{"$template": ".."}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ValueSpec {
    Literal(Value),
    Generated(GeneratedKind),
    Regex(String),
    Sided {
        consumer: Box<ValueSpec>,
        producer: Box<ValueSpec>,
    },
    FromRequest(RequestRef),
    Template(Template),
    ExecutedAssertion(String),
    Object(IndexMap<String, ValueSpec>),
    Array(Vec<ValueSpec>),
}

impl ValueSpec {
    /// Builds a descriptor from plain JSON, interpreting `$` directives at any depth.
    pub fn from_json(value: Value) -> Result<Self, ContractError> {
        match value {
            Value::Object(map) if is_directive(&map) => parse_directive(map),
            Value::Object(map) => {
                let mut fields = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    fields.insert(key, ValueSpec::from_json(value)?);
                }
                Ok(ValueSpec::Object(fields))
            }
            Value::Array(items) => Ok(ValueSpec::Array(
                items
                    .into_iter()
                    .map(ValueSpec::from_json)
                    .collect::<Result<_, _>>()?,
            )),
            scalar => Ok(ValueSpec::Literal(scalar)),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ValueSpec::Literal(value.into())
    }

    pub fn any(kind: GeneratedKind) -> Self {
        ValueSpec::Generated(kind)
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        ValueSpec::Regex(pattern.into())
    }

    pub fn sided(consumer: ValueSpec, producer: ValueSpec) -> Self {
        ValueSpec::Sided {
            consumer: Box::new(consumer),
            producer: Box::new(producer),
        }
    }

    pub fn execute(name: impl Into<String>) -> Self {
        ValueSpec::ExecutedAssertion(name.into())
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ValueSpec::Object(_) | ValueSpec::Array(_))
    }

    /// The literal a concrete caller would send for this descriptor, when one is declared.
    /// For a sided value the producer branch wins, then the consumer branch.
    pub fn known_literal(&self) -> Option<&Value> {
        match self {
            ValueSpec::Literal(value) => Some(value),
            ValueSpec::Sided { consumer, producer } => match (&**producer, &**consumer) {
                (ValueSpec::Literal(value), _) | (_, ValueSpec::Literal(value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Navigates object/array descriptors along a concrete path.
    pub fn at(&self, path: &JsonPath) -> Option<&ValueSpec> {
        let mut current = self;
        for segment in path.segments() {
            current = match (segment, current) {
                (crate::Segment::Field(name), ValueSpec::Object(fields)) => fields.get(name)?,
                (crate::Segment::Index(i), ValueSpec::Array(items)) => items.get(*i)?,
                (crate::Segment::Wildcard, ValueSpec::Array(items)) => items.first()?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Visits every leaf descriptor together with its path. Empty containers count as leaves.
    pub fn leaves(&self) -> Vec<(JsonPath, &ValueSpec)> {
        let mut out = Vec::new();
        collect_leaves(self, JsonPath::root(), &mut out);
        out
    }
}

fn collect_leaves<'a>(
    spec: &'a ValueSpec,
    path: JsonPath,
    out: &mut Vec<(JsonPath, &'a ValueSpec)>,
) {
    match spec {
        ValueSpec::Object(fields) if !fields.is_empty() => {
            for (name, child) in fields {
                collect_leaves(child, path.field(name.clone()), out);
            }
        }
        ValueSpec::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                collect_leaves(child, path.index(i), out);
            }
        }
        leaf => out.push((path, leaf)),
    }
}

/// Only the known directive keys make an object a directive; other `$` keys such as
/// `$schema` or `$ref` stay literal fields.
fn is_directive(map: &Map<String, Value>) -> bool {
    map.keys().any(|key| {
        matches!(
            key.as_str(),
            ANY | REGEX | CONSUMER | PRODUCER | FROM_REQUEST | EXECUTE | TEMPLATE
        )
    })
}

fn parse_directive(map: Map<String, Value>) -> Result<ValueSpec, ContractError> {
    if map.contains_key(CONSUMER) || map.contains_key(PRODUCER) {
        if map.len() != 2 || !map.contains_key(CONSUMER) || !map.contains_key(PRODUCER) {
            return Err(ContractError::InvalidValue(
                "`$consumer` and `$producer` must be declared together and alone".into(),
            ));
        }
        let mut map = map;
        let consumer = map.remove(CONSUMER).unwrap_or(Value::Null);
        let producer = map.remove(PRODUCER).unwrap_or(Value::Null);
        return Ok(ValueSpec::sided(
            ValueSpec::from_json(consumer)?,
            ValueSpec::from_json(producer)?,
        ));
    }

    if map.len() != 1 {
        let keys: Vec<_> = map.keys().cloned().collect();
        return Err(ContractError::InvalidValue(format!(
            "directive objects take exactly one key, found {keys:?}"
        )));
    }
    let Some((key, value)) = map.into_iter().next() else {
        return Err(ContractError::InvalidValue("empty directive".into()));
    };
    let text = match value {
        Value::String(text) => text,
        other => {
            return Err(ContractError::InvalidValue(format!(
                "`{key}` expects a string, got {other}"
            )))
        }
    };
    match key.as_str() {
        ANY => Ok(ValueSpec::Generated(text.parse()?)),
        REGEX => Ok(ValueSpec::Regex(text)),
        FROM_REQUEST => Ok(ValueSpec::FromRequest(text.parse()?)),
        EXECUTE if text.trim().is_empty() => Err(ContractError::InvalidValue(
            "`$execute` needs a routine name".into(),
        )),
        EXECUTE => Ok(ValueSpec::ExecutedAssertion(text.trim().to_string())),
        TEMPLATE => Ok(ValueSpec::Template(text.parse()?)),
        other => Err(ContractError::InvalidValue(format!(
            "unknown directive `{other}`"
        ))),
    }
}

fn directive(key: &str, value: impl Into<Value>) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value.into());
    Value::Object(map)
}

impl From<ValueSpec> for Value {
    fn from(spec: ValueSpec) -> Self {
        match spec {
            ValueSpec::Literal(value) => value,
            ValueSpec::Generated(kind) => directive(ANY, kind.as_str()),
            ValueSpec::Regex(pattern) => directive(REGEX, pattern),
            ValueSpec::Sided { consumer, producer } => {
                let mut map = Map::new();
                map.insert(CONSUMER.into(), Value::from(*consumer));
                map.insert(PRODUCER.into(), Value::from(*producer));
                Value::Object(map)
            }
            ValueSpec::FromRequest(reference) => directive(FROM_REQUEST, reference.to_string()),
            ValueSpec::Template(template) => directive(TEMPLATE, template.to_string()),
            ValueSpec::ExecutedAssertion(name) => directive(EXECUTE, name),
            ValueSpec::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
            ValueSpec::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

impl TryFrom<Value> for ValueSpec {
    type Error = ContractError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ValueSpec::from_json(value)
    }
}

/// Location inside a concrete incoming request that a response value is copied from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestRef {
    Body(JsonPath),
    Header(String),
    Query(String),
    Path,
}

impl FromStr for RequestRef {
    type Err = ContractError;

    /// Accepts `body:$.name`, a bare `$.name`, `header:X-Name`, `query:q` and `path`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw == "path" {
            return Ok(RequestRef::Path);
        }
        if let Some(path) = raw.strip_prefix("body:") {
            return Ok(RequestRef::Body(JsonPath::parse(path)?));
        }
        if let Some(name) = raw.strip_prefix("header:") {
            return non_empty(name, raw).map(RequestRef::Header);
        }
        if let Some(name) = raw.strip_prefix("query:") {
            return non_empty(name, raw).map(RequestRef::Query);
        }
        if raw.starts_with('$') {
            return Ok(RequestRef::Body(JsonPath::parse(raw)?));
        }
        Err(ContractError::InvalidValue(format!(
            "unsupported request reference `{raw}`"
        )))
    }
}

fn non_empty(name: &str, raw: &str) -> Result<String, ContractError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContractError::InvalidValue(format!(
            "request reference `{raw}` has no name"
        )));
    }
    Ok(name.to_string())
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestRef::Body(path) => write!(f, "body:{path}"),
            RequestRef::Header(name) => write!(f, "header:{name}"),
            RequestRef::Query(name) => write!(f, "query:{name}"),
            RequestRef::Path => f.write_str("path"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Text(String),
    Ref(RequestRef),
}

/// String with `{{ reference }}` placeholders filled from the incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

impl Template {
    pub fn references(&self) -> impl Iterator<Item = &RequestRef> {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::Ref(reference) => Some(reference),
            TemplatePart::Text(_) => None,
        })
    }
}

impl FromStr for Template {
    type Err = ContractError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                parts.push(TemplatePart::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                ContractError::InvalidValue(format!("unterminated placeholder in `{raw}`"))
            })?;
            parts.push(TemplatePart::Ref(after[..close].parse()?));
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_string()));
        }
        Ok(Template { parts })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => f.write_str(text)?,
                TemplatePart::Ref(reference) => write!(f, "{{{{{reference}}}}}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_becomes_literal_tree() {
        let spec = ValueSpec::from_json(json!({"name": "alice", "tags": ["a"]})).unwrap();
        let leaves = spec.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0.to_string(), "$.name");
        assert_eq!(leaves[1].0.to_string(), "$.tags[0]");
    }

    #[test]
    fn directives_parse_into_variants() {
        let spec: ValueSpec = serde_json::from_value(json!({
            "name": {"$any": "anyAlphaUnicode"},
            "age": {"$consumer": {"$regex": "[2-9][0-9]"}, "$producer": 25},
            "echo": {"$fromRequest": "$.name"},
            "status": {"$consumer": "NOT_OK", "$producer": {"$execute": "assertStatus"}},
        }))
        .unwrap();
        let ValueSpec::Object(fields) = &spec else {
            panic!("expected object");
        };
        assert_eq!(fields["name"], ValueSpec::any(GeneratedKind::AlphaUnicode));
        assert_eq!(
            fields["age"],
            ValueSpec::sided(ValueSpec::regex("[2-9][0-9]"), ValueSpec::literal(25))
        );
        assert_eq!(
            fields["echo"],
            ValueSpec::FromRequest(RequestRef::Body(JsonPath::root().field("name")))
        );
        assert_eq!(fields["age"].known_literal(), Some(&json!(25)));
    }

    #[test]
    fn sided_requires_both_branches() {
        let err = ValueSpec::from_json(json!({"$consumer": 1})).unwrap_err();
        assert!(matches!(err, ContractError::InvalidValue(_)));
    }

    #[test]
    fn dollar_keys_outside_the_directive_set_stay_literal() {
        let spec = ValueSpec::from_json(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": "order"
        }))
        .unwrap();
        let ValueSpec::Object(fields) = &spec else {
            panic!("expected object");
        };
        assert_eq!(
            fields["$schema"],
            ValueSpec::literal("http://json-schema.org/draft-07/schema#")
        );
        assert_eq!(fields["title"], ValueSpec::literal("order"));

        let spec = ValueSpec::from_json(json!({"$ref": "#/defs/order"})).unwrap();
        assert!(matches!(spec, ValueSpec::Object(_)));

        let err = ValueSpec::from_json(json!({"$regex": "[a-z]+", "title": "x"})).unwrap_err();
        assert!(matches!(err, ContractError::InvalidValue(_)));
    }

    #[test]
    fn template_round_trips_through_text() {
        let template: Template = "You're drunk [{{ body:$.name }}]. Go home!".parse().unwrap();
        assert_eq!(template.parts.len(), 3);
        assert_eq!(
            template.to_string(),
            "You're drunk [{{body:$.name}}]. Go home!"
        );
        assert!("broken {{ body:$.x".parse::<Template>().is_err());
    }

    #[test]
    fn serializes_back_to_directive_form() {
        let spec = ValueSpec::sided(
            ValueSpec::literal("NOT_OK"),
            ValueSpec::execute("assertStatus"),
        );
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"$consumer": "NOT_OK", "$producer": {"$execute": "assertStatus"}})
        );
    }
}
