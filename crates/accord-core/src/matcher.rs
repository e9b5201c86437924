use accord_contracts::{Contract, JsonPath, ValueSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SpecificationError;
use crate::field::Field;
use crate::predicate::Predicate;

/// Transport-neutral view of a request received by the stub server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// First header value, compared case-insensitively on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOrigin {
    /// Derived from a leaf of the declared request body.
    Declared,
    /// Derived from a stub-side matcher rule.
    Matcher,
}

#[derive(Debug, Clone)]
pub struct BodyPredicate {
    pub path: JsonPath,
    pub predicate: Predicate,
    pub origin: PredicateOrigin,
}

impl BodyPredicate {
    fn holds(&self, body: &Value) -> bool {
        if self.path.is_concrete() {
            return match self.path.get(body) {
                Some(value) => self.predicate.test_json(value),
                None => matches!(self.predicate, Predicate::Null),
            };
        }
        let selected = self.path.select(body);
        !selected.is_empty() && selected.into_iter().all(|value| self.predicate.test_json(value))
    }
}

/// A contract's request pattern compiled into independent predicates.
#[derive(Debug, Clone)]
pub struct CompiledRequest {
    method: String,
    url: Predicate,
    query: Vec<(String, Predicate)>,
    headers: Vec<(String, Predicate)>,
    body: Vec<BodyPredicate>,
}

impl CompiledRequest {
    pub fn compile(contract: &Contract) -> Result<Self, SpecificationError> {
        let request = &contract.request;
        let id = contract.id.as_str();
        let consumer = |spec: &ValueSpec, field: Field| {
            Predicate::for_consumer(spec)
                .map_err(|reason| SpecificationError::new(id, &field, reason))
        };

        let url = consumer(&request.url, Field::Url)?;
        let query = request
            .query
            .iter()
            .map(|(name, spec)| {
                consumer(spec, Field::Query(name.clone()))
                    .map(|predicate| (name.clone(), predicate))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let headers = request
            .headers
            .iter()
            .map(|(name, spec)| {
                consumer(spec, Field::Header(name.clone()))
                    .map(|predicate| (name.clone(), predicate))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut body = Vec::new();
        if let Some(declared) = &request.body {
            for (path, spec) in declared.leaves() {
                if request.matchers.iter().any(|rule| rule.path.covers(&path)) {
                    continue;
                }
                let predicate = consumer(spec, Field::Body(path.clone()))?;
                body.push(BodyPredicate {
                    path,
                    predicate,
                    origin: PredicateOrigin::Declared,
                });
            }
        }
        for rule in &request.matchers {
            let declared = request.body.as_ref().and_then(|b| b.at(&rule.path));
            let predicate = Predicate::for_matcher(&rule.kind, declared).map_err(|reason| {
                SpecificationError::new(id, &Field::Body(rule.path.clone()), reason)
            })?;
            body.push(BodyPredicate {
                path: rule.path.clone(),
                predicate,
                origin: PredicateOrigin::Matcher,
            });
        }

        Ok(Self {
            method: request.method.to_ascii_uppercase(),
            url,
            query,
            headers,
            body,
        })
    }

    pub fn body_predicates(&self) -> &[BodyPredicate] {
        &self.body
    }

    /// First location whose predicate fails, or `None` when the request matches.
    pub fn mismatch(&self, request: &IncomingRequest) -> Option<Field> {
        if !self.method.eq_ignore_ascii_case(&request.method) {
            return Some(Field::Method);
        }
        if !self.url.test_text(&request.path) {
            return Some(Field::Url);
        }
        for (name, predicate) in &self.query {
            let satisfied = request
                .query
                .iter()
                .any(|(key, value)| key == name && predicate.test_text(value));
            if !satisfied {
                return Some(Field::Query(name.clone()));
            }
        }
        for (name, predicate) in &self.headers {
            if !request.header(name).is_some_and(|value| predicate.test_text(value)) {
                return Some(Field::Header(name.clone()));
            }
        }
        if self.body.is_empty() {
            return None;
        }
        let Some(body) = &request.body else {
            return Some(Field::body_root());
        };
        self.body
            .iter()
            .find(|predicate| !predicate.holds(body))
            .map(|predicate| Field::Body(predicate.path.clone()))
    }

    pub fn matches(&self, request: &IncomingRequest) -> bool {
        self.mismatch(request).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiled(value: Value) -> CompiledRequest {
        let contract: Contract = serde_json::from_value(value).unwrap();
        CompiledRequest::compile(&contract).unwrap()
    }

    fn grumpy() -> CompiledRequest {
        compiled(json!({
            "id": "grumpy",
            "request": {
                "method": "POST",
                "url": "/check",
                "headers": {"Content-Type": {"$regex": "application/json.*"}},
                "body": {
                    "name": {"$any": "anyAlphaUnicode"},
                    "age": {"$consumer": {"$regex": "[2-9][0-9]"}, "$producer": 25}
                }
            },
            "response": {"status": 200}
        }))
    }

    fn check(body: Value) -> IncomingRequest {
        IncomingRequest::new("POST", "/check")
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    #[test]
    fn matches_on_every_predicate() {
        let request = grumpy();
        assert!(request.matches(&check(json!({"name": "alice", "age": 25, "extra": true}))));
        assert_eq!(
            request.mismatch(&check(json!({"name": "alice", "age": 10}))),
            Some(Field::Body(JsonPath::parse("$.age").unwrap()))
        );
        assert!(!request.matches(&check(json!({"age": 25}))));
        assert!(!request.matches(&IncomingRequest::new("GET", "/check")));
    }

    #[test]
    fn matcher_paths_replace_declared_leaves() {
        let request = compiled(json!({
            "id": "orders",
            "request": {
                "method": "PUT",
                "url": {"$regex": "/orders/[0-9]+"},
                "query": {"dryRun": "true"},
                "body": {"items": [{"sku": "ABC-1"}]},
                "stubMatchers": [
                    {"path": "$.items[*].sku", "type": "regex", "value": "[A-Z]+-[0-9]"}
                ]
            },
            "response": {"status": 204}
        }));
        let declared: Vec<_> = request
            .body_predicates()
            .iter()
            .filter(|p| p.origin == PredicateOrigin::Declared)
            .collect();
        assert!(declared.is_empty());

        let incoming = IncomingRequest::new("PUT", "/orders/42")
            .with_query("dryRun", "true")
            .with_body(json!({"items": [{"sku": "XYZ-9"}, {"sku": "QQ-1"}]}));
        assert!(request.matches(&incoming));

        let wrong = incoming.clone().with_body(json!({"items": [{"sku": "nope"}]}));
        assert!(!request.matches(&wrong));
        let empty = incoming.with_body(json!({"items": []}));
        assert!(!request.matches(&empty));
    }
}
