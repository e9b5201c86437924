use std::collections::HashSet;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{ContractError, JsonPath, ValueSpec};

/// Declarative request/response pairing. Immutable once loaded.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: String,
    /// Lower value wins. Absent means lowest precedence.
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    pub request: RequestPattern,
    pub response: ResponsePattern,
}

impl Contract {
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(i64::MAX)
    }

    /// Every structural problem in the contract, in declaration order.
    pub fn issues(&self) -> Vec<ContractError> {
        let mut issues = Vec::new();
        if self.id.trim().is_empty() {
            issues.push(ContractError::AssertionFailed("contract id empty"));
        }
        self.request.collect_issues(&mut issues);
        self.response.collect_issues(&mut issues);
        issues
    }
}


#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
    pub method: String,
    #[serde(alias = "path")]
    pub url: ValueSpec,
    #[serde(default)]
    pub query: IndexMap<String, ValueSpec>,
    #[serde(default)]
    pub headers: IndexMap<String, ValueSpec>,
    #[serde(default)]
    pub body: Option<ValueSpec>,
    /// Stub-side matcher rules over the request body.
    #[serde(default, alias = "stubMatchers", alias = "bodyMatchers")]
    pub matchers: Vec<MatcherRule>,
}

impl RequestPattern {
    fn collect_issues(&self, issues: &mut Vec<ContractError>) {
        if self.method.trim().is_empty()
            || !self.method.chars().all(|c| c.is_ascii_alphabetic())
        {
            issues.push(ContractError::InvalidField {
                field: "request.method".into(),
                reason: format!("`{}` is not an HTTP method", self.method),
            });
        }
        check_request_side("request.url", &self.url, issues);
        for (name, spec) in &self.query {
            check_request_side(&format!("request.query.{name}"), spec, issues);
        }
        for (name, spec) in &self.headers {
            check_request_side(&format!("request.headers.{name}"), spec, issues);
        }
        if let Some(body) = &self.body {
            for (path, spec) in body.leaves() {
                check_request_side(&format!("request.body {path}"), spec, issues);
            }
        }
        check_matchers("request.matchers", &self.matchers, false, issues);
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePattern {
    pub status: u16,
    #[serde(default)]
    pub headers: IndexMap<String, ValueSpec>,
    #[serde(default)]
    pub body: Option<ValueSpec>,
    /// Verification-side matcher rules over the response body.
    #[serde(default, alias = "testMatchers", alias = "bodyMatchers")]
    pub matchers: Vec<MatcherRule>,
    /// The stub must be completed off the transport's synchronous path.
    #[serde(default, rename = "async")]
    pub is_async: bool,
    #[serde(default)]
    pub fixed_delay_ms: Option<u64>,
}

impl ResponsePattern {
    fn collect_issues(&self, issues: &mut Vec<ContractError>) {
        if !(100..=599).contains(&self.status) {
            issues.push(ContractError::InvalidField {
                field: "response.status".into(),
                reason: format!("{} is not an HTTP status", self.status),
            });
        }
        for (name, spec) in &self.headers {
            check_response_side(&format!("response.headers.{name}"), spec, issues);
        }
        if let Some(body) = &self.body {
            for (path, spec) in body.leaves() {
                check_response_side(&format!("response.body {path}"), spec, issues);
            }
        }
        check_matchers("response.matchers", &self.matchers, true, issues);
    }
}

/// Path-scoped override of the default body behaviour.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatcherRule {
    pub path: JsonPath,
    #[serde(flatten)]
    pub kind: MatcherKind,
}

impl MatcherRule {
    pub fn new(path: JsonPath, kind: MatcherKind) -> Self {
        Self { path, kind }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MatcherKind {
    Regex {
        value: String,
    },
    /// Equality with the value declared in the body at the same path.
    Equality,
    /// Same JSON type as the declared value; arrays may bound their length.
    #[serde(rename_all = "camelCase")]
    Type {
        #[serde(default)]
        min_occurrence: Option<usize>,
        #[serde(default)]
        max_occurrence: Option<usize>,
    },
    Null,
    /// Delegates to a named assertion routine. Verification side only.
    Command {
        value: String,
    },
}

fn check_regex(field: &str, pattern: &str, issues: &mut Vec<ContractError>) {
    if let Err(err) = Regex::new(pattern) {
        issues.push(ContractError::InvalidRegex {
            field: field.to_string(),
            pattern: pattern.to_string(),
            reason: err.to_string(),
        });
    }
}

fn check_common(field: &str, spec: &ValueSpec, issues: &mut Vec<ContractError>) {
    match spec {
        ValueSpec::Regex(pattern) => check_regex(field, pattern, issues),
        ValueSpec::Sided { consumer, producer } => {
            for (side, branch) in [("consumer", consumer), ("producer", producer)] {
                match &**branch {
                    ValueSpec::Sided { .. } => issues.push(ContractError::InvalidField {
                        field: field.to_string(),
                        reason: format!("{side} branch nests another sided value"),
                    }),
                    ValueSpec::Object(_) | ValueSpec::Array(_) => {
                        issues.push(ContractError::InvalidField {
                            field: field.to_string(),
                            reason: format!("{side} branch must describe a single value"),
                        })
                    }
                    ValueSpec::Regex(pattern) => check_regex(field, pattern, issues),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn check_request_side(field: &str, spec: &ValueSpec, issues: &mut Vec<ContractError>) {
    check_common(field, spec, issues);
    let offending = |spec: &ValueSpec| match spec {
        ValueSpec::FromRequest(_) => Some("request values cannot reference the request"),
        ValueSpec::Template(_) => Some("templates are response-only"),
        ValueSpec::ExecutedAssertion(_) => Some("executed assertions are response-only"),
        _ => None,
    };
    let reason = match spec {
        ValueSpec::Sided { consumer, producer } => {
            offending(&**consumer).or_else(|| offending(&**producer))
        }
        other => offending(other),
    };
    if let Some(reason) = reason {
        issues.push(ContractError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        });
    }
}

fn check_response_side(field: &str, spec: &ValueSpec, issues: &mut Vec<ContractError>) {
    check_common(field, spec, issues);
    if let ValueSpec::Sided { consumer, .. } = spec {
        if matches!(**consumer, ValueSpec::ExecutedAssertion(_)) {
            issues.push(ContractError::InvalidField {
                field: field.to_string(),
                reason: "executed assertions belong on the producer side".into(),
            });
        }
    }
}

fn check_matchers(
    field: &str,
    rules: &[MatcherRule],
    allow_commands: bool,
    issues: &mut Vec<ContractError>,
) {
    let mut seen = HashSet::new();
    for rule in rules {
        let located = format!("{field} {}", rule.path);
        if !seen.insert(rule.path.clone()) {
            issues.push(ContractError::ConflictingMatcher { field: located });
            continue;
        }
        match &rule.kind {
            MatcherKind::Regex { value } => check_regex(&located, value, issues),
            MatcherKind::Command { value } if !allow_commands => {
                issues.push(ContractError::InvalidField {
                    field: located,
                    reason: format!("command `{value}` cannot run on the stub side"),
                })
            }
            MatcherKind::Command { value } if value.trim().is_empty() => {
                issues.push(ContractError::InvalidField {
                    field: located,
                    reason: "command needs a routine name".into(),
                })
            }
            MatcherKind::Type {
                min_occurrence: Some(min),
                max_occurrence: Some(max),
            } if min > max => issues.push(ContractError::InvalidField {
                field: located,
                reason: format!("minOccurrence {min} exceeds maxOccurrence {max}"),
            }),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grumpy() -> Contract {
        serde_json::from_value(json!({
            "id": "grumpy",
            "priority": 100,
            "request": {
                "method": "POST",
                "url": "/check",
                "body": {
                    "name": {"$any": "anyAlphaUnicode"},
                    "age": {"$consumer": {"$regex": "[2-9][0-9]"}, "$producer": 25}
                }
            },
            "response": {
                "status": 200,
                "body": {
                    "message": {"$template": "You're drunk [{{body:$.name}}]. Go home!"},
                    "status": {"$consumer": "NOT_OK", "$producer": {"$execute": "assertStatus"}}
                },
                "testMatchers": [
                    {"path": "$.message", "type": "command", "value": "assertMessage"}
                ],
                "async": true
            }
        }))
        .expect("grumpy contract parses")
    }

    #[test]
    fn well_formed_contract_validates() {
        let contract = grumpy();
        assert!(contract.issues().is_empty());
        assert!(contract.response.is_async);
        assert_eq!(contract.effective_priority(), 100);
        assert_eq!(
            contract.response.matchers[0].kind,
            MatcherKind::Command {
                value: "assertMessage".into()
            }
        );
    }

    #[test]
    fn request_side_rejects_response_only_directives() {
        let mut contract = grumpy();
        contract.request.headers.insert(
            "X-Echo".into(),
            ValueSpec::execute("assertHeader"),
        );
        let issues = contract.issues();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("request.headers.X-Echo"));
    }

    #[test]
    fn duplicate_matcher_paths_conflict() {
        let mut contract = grumpy();
        let rule = contract.response.matchers[0].clone();
        contract.response.matchers.push(rule);
        assert!(matches!(
            contract.issues().as_slice(),
            [ContractError::ConflictingMatcher { .. }]
        ));
    }

    #[test]
    fn stub_side_commands_are_rejected() {
        let mut contract = grumpy();
        contract.request.matchers.push(MatcherRule::new(
            JsonPath::parse("$.age").unwrap(),
            MatcherKind::Command {
                value: "check".into(),
            },
        ));
        assert!(!contract.issues().is_empty());
    }

    #[test]
    fn nested_sided_values_are_rejected() {
        let mut contract = grumpy();
        contract.response.headers.insert(
            "X-Deep".into(),
            ValueSpec::sided(
                ValueSpec::sided(ValueSpec::literal("a"), ValueSpec::literal("b")),
                ValueSpec::literal("c"),
            ),
        );
        let issues = contract.issues();
        assert!(issues
            .iter()
            .any(|issue| issue.to_string().contains("nests another sided value")));
    }
}
