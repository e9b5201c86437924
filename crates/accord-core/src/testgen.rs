//! Offline synthesis of verification cases, one per contract.

use std::num::NonZeroUsize;
use std::panic;
use std::thread;

use accord_contracts::{Contract, MatcherKind, MatcherRule, ResponsePattern, ValueSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SpecificationError;
use crate::field::Field;
use crate::matcher::IncomingRequest;
use crate::predicate::{declared_type, render_text};
use crate::registry::Registry;
use crate::resolve::{resolve_for_request, resolve_for_test, Check, TestContext};

/// Request a verification case sends to the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteRequest {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl From<&ConcreteRequest> for IncomingRequest {
    fn from(request: &ConcreteRequest) -> Self {
        IncomingRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub field: Field,
    pub check: Check,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCase {
    pub contract_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    pub request: ConcreteRequest,
    /// Status, then headers and body leaves in declaration order, then matcher rules.
    pub assertions: Vec<Assertion>,
}

impl VerificationCase {
    pub fn delegates(&self) -> impl Iterator<Item = (&Field, &str)> {
        self.assertions.iter().filter_map(|assertion| match &assertion.check {
            Check::Delegate { routine } => Some((&assertion.field, routine.as_str())),
            _ => None,
        })
    }
}

pub fn synthesize_verification_case(
    contract: &Contract,
) -> Result<VerificationCase, SpecificationError> {
    let id = contract.id.as_str();
    let request = concrete_request(contract)?;
    let ctx = TestContext::new(id, &contract.request);
    let response = &contract.response;

    let mut assertions = vec![Assertion {
        field: Field::Status,
        check: Check::Equals {
            expected: Value::from(response.status),
        },
    }];
    for (name, spec) in &response.headers {
        let field = Field::Header(name.clone());
        let check = resolve_for_test(spec, &ctx, &field)?;
        assertions.push(Assertion { field, check });
    }
    if let Some(body) = &response.body {
        for (path, spec) in body.leaves() {
            if response.matchers.iter().any(|rule| rule.path.covers(&path)) {
                continue;
            }
            let field = Field::Body(path);
            let check = resolve_for_test(spec, &ctx, &field)?;
            assertions.push(Assertion { field, check });
        }
    }
    for rule in &response.matchers {
        let field = Field::Body(rule.path.clone());
        let check = matcher_check(id, response, rule, &field)?;
        assertions.push(Assertion { field, check });
    }

    tracing::debug!(
        target: "accord::testgen",
        contract_id = %id,
        assertions = assertions.len(),
        "verification case synthesised"
    );
    Ok(VerificationCase {
        contract_id: contract.id.clone(),
        description: contract.description.clone(),
        priority: contract.priority,
        request,
        assertions,
    })
}

fn concrete_request(contract: &Contract) -> Result<ConcreteRequest, SpecificationError> {
    let id = contract.id.as_str();
    let pattern = &contract.request;
    let mut rng = rand::rng();

    let path = resolve_for_request(&pattern.url, id, &Field::Url, &mut rng)?;
    let mut query = Vec::with_capacity(pattern.query.len());
    for (name, spec) in &pattern.query {
        let value = resolve_for_request(spec, id, &Field::Query(name.clone()), &mut rng)?;
        query.push((name.clone(), render_text(&value)));
    }
    let mut headers = Vec::with_capacity(pattern.headers.len());
    for (name, spec) in &pattern.headers {
        let value = resolve_for_request(spec, id, &Field::Header(name.clone()), &mut rng)?;
        headers.push((name.clone(), render_text(&value)));
    }
    let body = pattern
        .body
        .as_ref()
        .map(|spec| resolve_for_request(spec, id, &Field::body_root(), &mut rng))
        .transpose()?;

    Ok(ConcreteRequest {
        method: pattern.method.to_ascii_uppercase(),
        path: render_text(&path),
        query,
        headers,
        body,
    })
}

fn matcher_check(
    contract_id: &str,
    response: &ResponsePattern,
    rule: &MatcherRule,
    field: &Field,
) -> Result<Check, SpecificationError> {
    let declared = response.body.as_ref().and_then(|body| body.at(&rule.path));
    Ok(match &rule.kind {
        MatcherKind::Regex { value } => Check::Matches {
            pattern: value.clone(),
        },
        MatcherKind::Equality => {
            let expected = declared.and_then(producer_literal).ok_or_else(|| {
                SpecificationError::new(
                    contract_id,
                    field,
                    "equality matcher needs a literal at its path",
                )
            })?;
            Check::Equals {
                expected: expected.clone(),
            }
        }
        MatcherKind::Type {
            min_occurrence,
            max_occurrence,
        } => Check::Type {
            expected: declared.and_then(declared_type),
            min_occurrence: *min_occurrence,
            max_occurrence: *max_occurrence,
        },
        MatcherKind::Null => Check::IsNull,
        MatcherKind::Command { value } => Check::Delegate {
            routine: value.clone(),
        },
    })
}

fn producer_literal(spec: &ValueSpec) -> Option<&Value> {
    match spec {
        ValueSpec::Literal(value) => Some(value),
        ValueSpec::Sided { producer, .. } => match &**producer {
            ValueSpec::Literal(value) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

/// Result of synthesising one contract's case; failures do not stop the others.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub contract_id: String,
    pub result: Result<VerificationCase, SpecificationError>,
}

/// Synthesises a case for every contract on up to `parallelism` threads, returning outcomes
/// in registry order.
pub fn synthesize_all(registry: &Registry, parallelism: usize) -> Vec<CaseOutcome> {
    let contracts: Vec<&Contract> = registry.all().collect();
    if contracts.is_empty() {
        return Vec::new();
    }
    let workers = NonZeroUsize::new(parallelism)
        .or_else(|| thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get)
        .min(contracts.len());
    let chunk = contracts.len().div_ceil(workers);

    let outcomes: Vec<CaseOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = contracts
            .chunks(chunk)
            .map(|slice| {
                scope.spawn(move || slice.iter().map(|c| synthesize_one(c)).collect::<Vec<_>>())
            })
            .collect();
        // A panicking worker would silently drop its contracts, so re-raise it.
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(outcomes) => outcomes,
                Err(panic) => panic::resume_unwind(panic),
            })
            .collect()
    });

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    tracing::info!(
        target: "accord::testgen",
        cases = outcomes.len() - failed,
        failed,
        workers,
        "verification cases synthesised"
    );
    outcomes
}

fn synthesize_one(contract: &Contract) -> CaseOutcome {
    let result = synthesize_verification_case(contract);
    if let Err(err) = &result {
        tracing::warn!(
            target: "accord::testgen",
            contract_id = %contract.id,
            error = %err,
            "contract skipped"
        );
    }
    CaseOutcome {
        contract_id: contract.id.clone(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract(value: Value) -> Contract {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn assertions_follow_declaration_order() {
        let case = synthesize_verification_case(&contract(json!({
            "id": "orders",
            "request": {
                "method": "get",
                "url": "/orders",
                "query": {"page": {"$any": "anyPositiveInt"}}
            },
            "response": {
                "status": 200,
                "headers": {"Content-Type": "application/json"},
                "body": {"id": {"$any": "anyUuid"}, "items": [{"sku": "A"}], "note": null},
                "testMatchers": [
                    {"path": "$.items", "type": "type", "minOccurrence": 1},
                    {"path": "$.note", "type": "null"}
                ]
            }
        })))
        .unwrap();

        assert_eq!(case.request.method, "GET");
        assert!(case.request.query[0].1.parse::<u64>().unwrap() >= 1);
        let fields: Vec<String> = case.assertions.iter().map(|a| a.field.to_string()).collect();
        assert_eq!(
            fields,
            ["status", "headers.Content-Type", "body $.id", "body $.items", "body $.note"]
        );
        assert_eq!(
            case.assertions[3].check,
            Check::Type {
                expected: Some(crate::JsonType::Array),
                min_occurrence: Some(1),
                max_occurrence: None
            }
        );
        assert_eq!(case.assertions[4].check, Check::IsNull);
    }

    #[test]
    fn dynamic_request_reference_fails_only_its_contract() {
        let bad = contract(json!({
            "id": "echo",
            "request": {
                "method": "POST",
                "url": "/echo",
                "body": {"name": {"$any": "anyAlphaUnicode"}}
            },
            "response": {"status": 200, "body": {"name": {"$fromRequest": "$.name"}}}
        }));
        let good = contract(json!({
            "id": "ping",
            "request": {"method": "GET", "url": "/ping"},
            "response": {"status": 204}
        }));
        let registry = Registry::load(vec![bad, good]).unwrap();
        let outcomes = synthesize_all(&registry, 2);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].contract_id, "echo");
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(err.field.to_string(), "body $.name");
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn every_contract_yields_one_outcome_in_order() {
        let contracts: Vec<Contract> = (0..7)
            .map(|i| {
                contract(json!({
                    "id": format!("c{i}"),
                    "priority": i,
                    "request": {"method": "GET", "url": format!("/items/{i}")},
                    "response": {"status": 200, "body": {"n": i}}
                }))
            })
            .collect();
        let registry = Registry::load(contracts).unwrap();
        let outcomes = synthesize_all(&registry, 3);
        let ids: Vec<&str> = outcomes.iter().map(|o| o.contract_id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2", "c3", "c4", "c5", "c6"]);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[test]
    fn equality_matcher_uses_the_producer_literal() {
        let case = synthesize_verification_case(&contract(json!({
            "id": "status",
            "request": {"method": "GET", "url": "/status"},
            "response": {
                "status": 200,
                "body": {"state": {"$consumer": "STUB", "$producer": "LIVE"}},
                "testMatchers": [{"path": "$.state", "type": "equality"}]
            }
        })))
        .unwrap();
        assert_eq!(case.assertions.len(), 2);
        assert_eq!(case.assertions[1].check, Check::Equals { expected: json!("LIVE") });
    }
}
