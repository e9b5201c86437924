//! Side-specific resolution of value descriptors.
//!
//! The same [`ValueSpec`] resolves three ways: to a concrete value served by a stub, to a
//! runtime [`Check`] applied to a producer's response, and to the concrete value a
//! verification case sends to the producer.

use accord_contracts::{
    GeneratedKind, RequestPattern, RequestRef, Template, TemplatePart, ValueSpec,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ResolutionError, SpecificationError, StubError};
use crate::field::Field;
use crate::generate::{generate_kind, sample_regex};
use crate::matcher::IncomingRequest;
use crate::predicate::{render_text, JsonType};

/// Runtime check on one response location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    Equals {
        expected: Value,
    },
    Matches {
        pattern: String,
    },
    Generated {
        generator: GeneratedKind,
    },
    Type {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<JsonType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_occurrence: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_occurrence: Option<usize>,
    },
    IsNull,
    /// Hand the actual value to a host-registered routine.
    Delegate {
        routine: String,
    },
}

impl Check {
    pub fn is_delegate(&self) -> bool {
        matches!(self, Check::Delegate { .. })
    }
}

/// Concrete request a stub is being synthesised for. Built per call and dropped with it.
#[derive(Debug, Clone, Copy)]
pub struct StubContext<'a> {
    pub contract_id: &'a str,
    pub request: &'a IncomingRequest,
}

impl<'a> StubContext<'a> {
    pub fn new(contract_id: &'a str, request: &'a IncomingRequest) -> Self {
        Self {
            contract_id,
            request,
        }
    }

    pub fn lookup(&self, reference: &RequestRef) -> Option<Value> {
        match reference {
            RequestRef::Body(path) => {
                let body = self.request.body.as_ref()?;
                if path.is_concrete() {
                    path.get(body).cloned()
                } else {
                    path.select(body).into_iter().next().cloned()
                }
            }
            RequestRef::Header(name) => self.request.header(name).map(Value::from),
            RequestRef::Query(name) => self.request.query_param(name).map(Value::from),
            RequestRef::Path => Some(Value::from(self.request.path.as_str())),
        }
    }

    fn require(&self, reference: &RequestRef, field: &Field) -> Result<Value, ResolutionError> {
        self.lookup(reference).ok_or_else(|| ResolutionError {
            contract_id: self.contract_id.to_string(),
            field: field.clone(),
            reference: reference.to_string(),
        })
    }
}

/// Declared request pattern a verification case is derived from.
#[derive(Debug, Clone, Copy)]
pub struct TestContext<'a> {
    pub contract_id: &'a str,
    pub request: &'a RequestPattern,
}

impl<'a> TestContext<'a> {
    pub fn new(contract_id: &'a str, request: &'a RequestPattern) -> Self {
        Self {
            contract_id,
            request,
        }
    }

    /// The request value known before any producer call, if the reference points at one.
    pub fn known(&self, reference: &RequestRef) -> Option<Value> {
        let spec = match reference {
            RequestRef::Body(path) => self.request.body.as_ref()?.at(path)?,
            RequestRef::Header(name) => self
                .request
                .headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, spec)| spec)?,
            RequestRef::Query(name) => self.request.query.get(name)?,
            RequestRef::Path => &self.request.url,
        };
        spec.known_literal().cloned()
    }
}

/// Value the stub serves for `spec`. Generated and regex values are fresh on every call.
pub fn resolve_for_stub(
    spec: &ValueSpec,
    ctx: &StubContext<'_>,
    field: &Field,
) -> Result<Value, StubError> {
    let mut rng = rand::rng();
    stub_value(spec, ctx, field, &mut rng, false)
}

fn stub_value<R: Rng + ?Sized>(
    spec: &ValueSpec,
    ctx: &StubContext<'_>,
    field: &Field,
    rng: &mut R,
    in_branch: bool,
) -> Result<Value, StubError> {
    match spec {
        ValueSpec::Literal(value) => Ok(value.clone()),
        ValueSpec::Generated(kind) => Ok(generate_kind(*kind, rng)),
        ValueSpec::Regex(pattern) => sample_regex(pattern, rng)
            .map(Value::String)
            .map_err(|err| SpecificationError::new(ctx.contract_id, field, err.to_string()).into()),
        ValueSpec::Sided { .. } if in_branch => Err(nested(ctx.contract_id, field).into()),
        ValueSpec::Sided { consumer, .. } => stub_value(consumer, ctx, field, rng, true),
        ValueSpec::FromRequest(reference) => Ok(ctx.require(reference, field)?),
        ValueSpec::Template(template) => {
            let text = interpolate(template, |reference| {
                ctx.require(reference, field).map(|value| render_text(&value))
            })?;
            Ok(Value::String(text))
        }
        // No consumer-side value exists for a producer-only check.
        ValueSpec::ExecutedAssertion(_) => Ok(Value::Null),
        ValueSpec::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (name, child) in fields {
                let value = stub_value(child, ctx, &field.child_field(name), rng, false)?;
                out.insert(name.clone(), value);
            }
            Ok(Value::Object(out))
        }
        ValueSpec::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| stub_value(child, ctx, &field.child_index(i), rng, false))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
    }
}

/// Check a verification case applies at `field` of the producer's response.
pub fn resolve_for_test(
    spec: &ValueSpec,
    ctx: &TestContext<'_>,
    field: &Field,
) -> Result<Check, SpecificationError> {
    test_check(spec, ctx, field, false)
}

fn test_check(
    spec: &ValueSpec,
    ctx: &TestContext<'_>,
    field: &Field,
    in_branch: bool,
) -> Result<Check, SpecificationError> {
    match spec {
        ValueSpec::Literal(value) => Ok(Check::Equals {
            expected: value.clone(),
        }),
        ValueSpec::Generated(kind) => Ok(Check::Generated { generator: *kind }),
        ValueSpec::Regex(pattern) => Ok(Check::Matches {
            pattern: pattern.clone(),
        }),
        ValueSpec::ExecutedAssertion(routine) => Ok(Check::Delegate {
            routine: routine.clone(),
        }),
        ValueSpec::Sided { .. } if in_branch => Err(nested(ctx.contract_id, field)),
        ValueSpec::Sided { producer, .. } => test_check(producer, ctx, field, true),
        ValueSpec::FromRequest(reference) => ctx
            .known(reference)
            .map(|expected| Check::Equals { expected })
            .ok_or_else(|| unbound(ctx.contract_id, field, reference)),
        ValueSpec::Template(template) => {
            let text = interpolate(template, |reference| {
                ctx.known(reference)
                    .map(|value| render_text(&value))
                    .ok_or_else(|| unbound(ctx.contract_id, field, reference))
            })?;
            Ok(Check::Equals {
                expected: Value::String(text),
            })
        }
        ValueSpec::Object(fields) if fields.is_empty() => Ok(Check::Equals {
            expected: Value::Object(Map::new()),
        }),
        ValueSpec::Array(items) if items.is_empty() => Ok(Check::Equals {
            expected: Value::Array(Vec::new()),
        }),
        ValueSpec::Object(_) | ValueSpec::Array(_) => Err(SpecificationError::new(
            ctx.contract_id,
            field,
            "containers are checked per leaf",
        )),
    }
}

/// Concrete value a verification case sends for a request-side descriptor.
pub fn resolve_for_request<R: Rng + ?Sized>(
    spec: &ValueSpec,
    contract_id: &str,
    field: &Field,
    rng: &mut R,
) -> Result<Value, SpecificationError> {
    match spec {
        ValueSpec::Literal(value) => Ok(value.clone()),
        ValueSpec::Generated(kind) => Ok(generate_kind(*kind, rng)),
        ValueSpec::Regex(pattern) => sample_regex(pattern, rng)
            .map(Value::String)
            .map_err(|err| SpecificationError::new(contract_id, field, err.to_string())),
        ValueSpec::Sided { consumer, producer } => {
            if matches!(**consumer, ValueSpec::Sided { .. })
                || matches!(**producer, ValueSpec::Sided { .. })
            {
                return Err(nested(contract_id, field));
            }
            spec.known_literal().cloned().ok_or_else(|| {
                SpecificationError::new(
                    contract_id,
                    field,
                    "both sides are dynamic; no concrete value to send",
                )
            })
        }
        ValueSpec::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (name, child) in fields {
                let value = resolve_for_request(child, contract_id, &field.child_field(name), rng)?;
                out.insert(name.clone(), value);
            }
            Ok(Value::Object(out))
        }
        ValueSpec::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| resolve_for_request(child, contract_id, &field.child_index(i), rng))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ValueSpec::FromRequest(_) | ValueSpec::Template(_) | ValueSpec::ExecutedAssertion(_) => {
            Err(SpecificationError::new(
                contract_id,
                field,
                "value is only meaningful in a response",
            ))
        }
    }
}

fn interpolate<E>(
    template: &Template,
    mut lookup: impl FnMut(&RequestRef) -> Result<String, E>,
) -> Result<String, E> {
    let mut out = String::new();
    for part in &template.parts {
        match part {
            TemplatePart::Text(text) => out.push_str(text),
            TemplatePart::Ref(reference) => out.push_str(&lookup(reference)?),
        }
    }
    Ok(out)
}

fn nested(contract_id: &str, field: &Field) -> SpecificationError {
    SpecificationError::new(
        contract_id,
        field,
        "sided values nest at most one level",
    )
}

fn unbound(contract_id: &str, field: &Field, reference: &RequestRef) -> SpecificationError {
    SpecificationError::new(
        contract_id,
        field,
        format!("`{reference}` is dynamic in the request; no concrete value to compare"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_contracts::JsonPath;
    use serde_json::json;

    fn request_pattern(body: Value) -> RequestPattern {
        serde_json::from_value(json!({"method": "POST", "url": "/check", "body": body})).unwrap()
    }

    #[test]
    fn stub_copies_request_values_into_templates() {
        let request = IncomingRequest::new("POST", "/check").with_body(json!({"name": "alice"}));
        let ctx = StubContext::new("grumpy", &request);
        let spec = ValueSpec::Template("You're drunk [{{body:$.name}}]. Go home!".parse().unwrap());
        let value = resolve_for_stub(&spec, &ctx, &Field::body_root()).unwrap();
        assert_eq!(value, json!("You're drunk [alice]. Go home!"));
    }

    #[test]
    fn missing_reference_is_a_resolution_error() {
        let request = IncomingRequest::new("POST", "/check");
        let ctx = StubContext::new("grumpy", &request);
        let spec = ValueSpec::FromRequest("body:$.name".parse().unwrap());
        let field = Field::Body(JsonPath::root().field("message"));
        let err = resolve_for_stub(&spec, &ctx, &field).unwrap_err();
        let StubError::Resolution(err) = err else {
            panic!("expected resolution error, got {err:?}");
        };
        assert_eq!(err.reference, "body:$.name");
        assert_eq!(err.field, field);
    }

    #[test]
    fn sided_values_split_by_side() {
        let spec = ValueSpec::sided(
            ValueSpec::literal("NOT_OK"),
            ValueSpec::execute("assertStatus"),
        );
        let request = IncomingRequest::new("GET", "/");
        let stub = resolve_for_stub(&spec, &StubContext::new("c", &request), &Field::body_root());
        assert_eq!(stub.unwrap(), json!("NOT_OK"));

        let pattern = request_pattern(json!({}));
        let check = resolve_for_test(&spec, &TestContext::new("c", &pattern), &Field::body_root());
        assert_eq!(
            check.unwrap(),
            Check::Delegate {
                routine: "assertStatus".into()
            }
        );
    }

    #[test]
    fn test_side_reference_needs_a_literal_request_value() {
        let pattern = request_pattern(json!({
            "name": {"$any": "anyAlphaUnicode"},
            "age": {"$consumer": {"$regex": "[2-9][0-9]"}, "$producer": 25}
        }));
        let ctx = TestContext::new("grumpy", &pattern);
        let age = ValueSpec::FromRequest("$.age".parse().unwrap());
        assert_eq!(
            resolve_for_test(&age, &ctx, &Field::body_root()).unwrap(),
            Check::Equals { expected: json!(25) }
        );
        let name = ValueSpec::FromRequest("$.name".parse().unwrap());
        assert!(resolve_for_test(&name, &ctx, &Field::body_root()).is_err());
    }

    #[test]
    fn nested_sided_value_is_a_specification_error() {
        let spec = ValueSpec::sided(
            ValueSpec::literal("a"),
            ValueSpec::sided(ValueSpec::literal("b"), ValueSpec::literal("c")),
        );
        let pattern = request_pattern(json!({}));
        assert!(resolve_for_test(&spec, &TestContext::new("c", &pattern), &Field::Status).is_err());
        assert!(resolve_for_request(&spec, "c", &Field::Status, &mut rand::rng()).is_err());
    }

    #[test]
    fn request_side_prefers_the_literal_branch() {
        let spec = ValueSpec::sided(ValueSpec::regex("[2-9][0-9]"), ValueSpec::literal(25));
        let value = resolve_for_request(&spec, "c", &Field::body_root(), &mut rand::rng());
        assert_eq!(value.unwrap(), json!(25));

        let dynamic = ValueSpec::sided(
            ValueSpec::regex("[a-z]+"),
            ValueSpec::any(GeneratedKind::AlphaUnicode),
        );
        assert!(resolve_for_request(&dynamic, "c", &Field::body_root(), &mut rand::rng()).is_err());
    }
}
