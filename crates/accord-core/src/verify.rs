//! Evaluation of a verification case against an actual producer response.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::BindingError;
use crate::field::Field;
use crate::predicate::{anchored, json_eq, render_text, type_matches};
use crate::resolve::Check;
use crate::testgen::VerificationCase;

/// Host-supplied assertion routine. `Err` carries the failure message.
pub type DelegateFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Explicit name → routine table consulted for `Delegate` checks.
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    routines: HashMap<String, DelegateFn>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, routine: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.routines.insert(name.into(), Arc::new(routine));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routines.contains_key(name)
    }

    pub fn resolve(
        &self,
        name: &str,
        contract_id: &str,
        field: &Field,
    ) -> Result<&DelegateFn, BindingError> {
        self.routines.get(name).ok_or_else(|| BindingError {
            routine: name.to_string(),
            contract_id: contract_id.to_string(),
            field: field.to_string(),
        })
    }
}

impl fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.routines.keys().collect();
        names.sort();
        f.debug_struct("DelegateRegistry")
            .field("routines", &names)
            .finish()
    }
}

/// Response captured from the producer under test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActualResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ActualResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionOutcome {
    pub field: Field,
    pub check: Check,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub contract_id: String,
    pub outcomes: Vec<AssertionOutcome>,
    pub binding_errors: Vec<BindingError>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.binding_errors.is_empty() && self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

/// Located value(s) for one assertion. Headers are textual; body values keep their JSON type.
enum Actual<'a> {
    Missing,
    Json(Vec<&'a Value>),
    Text(&'a str),
    Owned(Value),
}

fn locate<'a>(field: &Field, actual: &'a ActualResponse) -> Actual<'a> {
    match field {
        Field::Status => Actual::Owned(Value::from(actual.status)),
        Field::Header(name) => actual.header(name).map_or(Actual::Missing, Actual::Text),
        Field::Body(path) => {
            let Some(body) = &actual.body else {
                return Actual::Missing;
            };
            let selected: Vec<&Value> = if path.is_concrete() {
                path.get(body).into_iter().collect()
            } else {
                path.select(body)
            };
            if selected.is_empty() {
                Actual::Missing
            } else {
                Actual::Json(selected)
            }
        }
        Field::Method | Field::Url | Field::Query(_) => Actual::Missing,
    }
}

/// Evaluates every assertion of `case` against `actual`. An unregistered delegate fails
/// its assertion and is recorded as a binding error; remaining assertions still run.
pub fn verify(
    case: &VerificationCase,
    actual: &ActualResponse,
    delegates: &DelegateRegistry,
) -> VerificationReport {
    let mut outcomes = Vec::with_capacity(case.assertions.len());
    let mut binding_errors = Vec::new();

    for assertion in &case.assertions {
        let located = locate(&assertion.field, actual);
        let result = match &assertion.check {
            Check::Delegate { routine } => {
                match delegates.resolve(routine, &case.contract_id, &assertion.field) {
                    Ok(delegate) => run_delegate(delegate, &located),
                    Err(err) => {
                        let detail = err.to_string();
                        binding_errors.push(err);
                        Err(detail)
                    }
                }
            }
            check => evaluate(check, &located),
        };
        if let Err(detail) = &result {
            tracing::debug!(
                target: "accord::verify",
                contract_id = %case.contract_id,
                field = %assertion.field,
                detail = %detail,
                "assertion failed"
            );
        }
        outcomes.push(AssertionOutcome {
            field: assertion.field.clone(),
            check: assertion.check.clone(),
            passed: result.is_ok(),
            detail: result.err(),
        });
    }

    let report = VerificationReport {
        contract_id: case.contract_id.clone(),
        outcomes,
        binding_errors,
    };
    tracing::info!(
        target: "accord::verify",
        contract_id = %report.contract_id,
        passed = report.passed(),
        "verification evaluated"
    );
    report
}

fn run_delegate(delegate: &DelegateFn, located: &Actual<'_>) -> Result<(), String> {
    let values: Vec<Value> = match located {
        Actual::Missing => vec![Value::Null],
        Actual::Json(values) => values.iter().map(|v| (*v).clone()).collect(),
        Actual::Text(text) => vec![Value::from(*text)],
        Actual::Owned(value) => vec![value.clone()],
    };
    for value in &values {
        match catch_unwind(AssertUnwindSafe(|| delegate(value))) {
            Ok(result) => result?,
            Err(_) => return Err("assertion routine panicked".into()),
        }
    }
    Ok(())
}

fn evaluate(check: &Check, located: &Actual<'_>) -> Result<(), String> {
    match located {
        Actual::Missing => match check {
            Check::IsNull => Ok(()),
            _ => Err("value missing from response".into()),
        },
        Actual::Text(text) => evaluate_text(check, text),
        Actual::Owned(value) => evaluate_json(check, value),
        Actual::Json(values) => values.iter().try_for_each(|value| evaluate_json(check, value)),
    }
}

fn evaluate_json(check: &Check, value: &Value) -> Result<(), String> {
    let passed = match check {
        Check::Equals { expected } => json_eq(expected, value),
        Check::Matches { pattern } => {
            let regex = anchored(pattern)?;
            match value {
                Value::String(text) => regex.is_match(text),
                Value::Number(_) | Value::Bool(_) => regex.is_match(&value.to_string()),
                _ => false,
            }
        }
        Check::Generated { generator } => generator.accepts_json(value),
        Check::Type {
            expected,
            min_occurrence,
            max_occurrence,
        } => type_matches(*expected, *min_occurrence, *max_occurrence, value),
        Check::IsNull => value.is_null(),
        Check::Delegate { .. } => false,
    };
    if passed {
        Ok(())
    } else {
        Err(format!("{value} does not satisfy {}", describe(check)))
    }
}

fn evaluate_text(check: &Check, text: &str) -> Result<(), String> {
    let passed = match check {
        Check::Equals { expected } => render_text(expected) == text,
        Check::Matches { pattern } => anchored(pattern)?.is_match(text),
        Check::Generated { generator } => generator.accepts_text(text),
        Check::Type { .. } => true,
        Check::IsNull | Check::Delegate { .. } => false,
    };
    if passed {
        Ok(())
    } else {
        Err(format!("`{text}` does not satisfy {}", describe(check)))
    }
}

fn describe(check: &Check) -> String {
    match check {
        Check::Equals { expected } => format!("equality with {expected}"),
        Check::Matches { pattern } => format!("regex `{pattern}`"),
        Check::Generated { generator } => format!("generator {generator}"),
        Check::Type { expected, .. } => match expected {
            Some(expected) => format!("type {expected:?}"),
            None => "a non-null type".into(),
        },
        Check::IsNull => "null".into(),
        Check::Delegate { routine } => format!("routine `{routine}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgen::{Assertion, ConcreteRequest};
    use accord_contracts::JsonPath;
    use serde_json::json;

    fn case(assertions: Vec<Assertion>) -> VerificationCase {
        VerificationCase {
            contract_id: "c".into(),
            description: None,
            priority: None,
            request: ConcreteRequest {
                method: "GET".into(),
                path: "/".into(),
                query: vec![],
                headers: vec![],
                body: None,
            },
            assertions,
        }
    }

    fn body(path: &str, check: Check) -> Assertion {
        Assertion {
            field: Field::Body(JsonPath::parse(path).unwrap()),
            check,
        }
    }

    #[test]
    fn evaluates_each_assertion_independently() {
        let case = case(vec![
            Assertion {
                field: Field::Status,
                check: Check::Equals { expected: json!(200) },
            },
            Assertion {
                field: Field::Header("Content-Type".into()),
                check: Check::Matches {
                    pattern: "application/json.*".into(),
                },
            },
            body("$.ids[*]", Check::Generated {
                generator: accord_contracts::GeneratedKind::PositiveInt,
            }),
            body("$.name", Check::Equals { expected: json!("x") }),
        ]);
        let actual = ActualResponse::new(200)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(json!({"ids": [1, 2], "name": "y"}));
        let report = verify(&case, &actual, &DelegateRegistry::new());
        assert!(!report.passed());
        let failed: Vec<_> = report.failures().map(|o| o.field.to_string()).collect();
        assert_eq!(failed, ["body $.name"]);
    }

    #[test]
    fn delegates_receive_the_field_value() {
        let mut delegates = DelegateRegistry::new();
        delegates.register("assertStatus", |value| {
            if value == &json!("OK") {
                Ok(())
            } else {
                Err(format!("unexpected status {value}"))
            }
        });
        let case = case(vec![
            body("$.status", Check::Delegate {
                routine: "assertStatus".into(),
            }),
            body("$.message", Check::Delegate {
                routine: "assertMessage".into(),
            }),
        ]);
        let actual = ActualResponse::new(200).with_body(json!({"status": "OK", "message": "hi"}));
        let report = verify(&case, &actual, &delegates);
        assert!(report.outcomes[0].passed);
        assert!(!report.outcomes[1].passed);
        assert_eq!(report.binding_errors.len(), 1);
        assert_eq!(report.binding_errors[0].routine, "assertMessage");
    }

    #[test]
    fn panicking_routine_fails_only_its_assertion() {
        let mut delegates = DelegateRegistry::new();
        delegates.register("boom", |_| panic!("boom"));
        let case = case(vec![body("$.x", Check::Delegate { routine: "boom".into() })]);
        let actual = ActualResponse::new(200).with_body(json!({"x": 1}));
        let report = verify(&case, &actual, &delegates);
        assert_eq!(
            report.outcomes[0].detail.as_deref(),
            Some("assertion routine panicked")
        );
    }
}
