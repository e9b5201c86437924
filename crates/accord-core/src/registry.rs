use std::collections::HashSet;
use std::sync::Arc;

use accord_contracts::Contract;

use crate::error::{LoadError, LoadIssue};
use crate::matcher::{CompiledRequest, IncomingRequest};
use crate::source::SourcedContract;

/// A loaded contract with its compiled request predicates.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub origin: String,
    pub contract: Contract,
    pub request: CompiledRequest,
    declared: usize,
}

impl CompiledContract {
    /// Position in the source set, before priority ordering.
    pub fn declaration_index(&self) -> usize {
        self.declared
    }
}

/// Immutable, priority-ordered contract set. Cloning shares the same snapshot, so request
/// handlers read it concurrently without locking.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Arc<[CompiledContract]>,
}

impl Registry {
    /// Loads contracts in declaration order, naming each by its index in the sequence.
    pub fn load(contracts: impl IntoIterator<Item = Contract>) -> Result<Self, LoadError> {
        Self::load_sourced(
            contracts
                .into_iter()
                .enumerate()
                .map(|(idx, contract)| SourcedContract::new(format!("#{idx}"), contract)),
        )
    }

    /// Validates and compiles every contract, reporting all findings together.
    pub fn load_sourced(
        contracts: impl IntoIterator<Item = SourcedContract>,
    ) -> Result<Self, LoadError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for (declared, sourced) in contracts.into_iter().enumerate() {
            let SourcedContract { origin, contract } = sourced;
            let id = contract.id.as_str();
            let before = issues.len();
            for issue in contract.issues() {
                issues.push(LoadIssue::new(&origin, Some(id), issue.to_string()));
            }
            if !seen.insert(contract.id.clone()) {
                issues.push(LoadIssue::new(&origin, Some(id), "duplicate contract id"));
            }
            if issues.len() > before {
                continue;
            }
            match CompiledRequest::compile(&contract) {
                Ok(request) => entries.push(CompiledContract {
                    origin,
                    contract,
                    request,
                    declared,
                }),
                Err(err) => issues.push(LoadIssue::new(
                    &origin,
                    Some(contract.id.as_str()),
                    err.to_string(),
                )),
            }
        }

        if !issues.is_empty() {
            for issue in &issues {
                tracing::warn!(
                    target: "accord::registry",
                    origin = %issue.origin,
                    reason = %issue.reason,
                    "contract rejected"
                );
            }
            return Err(LoadError { issues });
        }

        entries.sort_by_key(|entry| (entry.contract.effective_priority(), entry.declared));
        for entry in &entries {
            tracing::debug!(
                target: "accord::registry",
                contract_id = %entry.contract.id,
                priority = entry.contract.effective_priority(),
                origin = %entry.origin,
                "contract registered"
            );
        }
        tracing::info!(
            target: "accord::registry",
            contracts = entries.len(),
            "contract registry loaded"
        );
        Ok(Self {
            entries: entries.into(),
        })
    }

    /// Contracts in ascending priority, declaration order on ties.
    pub fn all(&self) -> impl Iterator<Item = &Contract> + '_ {
        self.entries.iter().map(|entry| &entry.contract)
    }

    pub fn entries(&self) -> &[CompiledContract] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&Contract> {
        self.all().find(|contract| contract.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First contract in registry order whose request predicates all hold.
    pub fn match_request(&self, request: &IncomingRequest) -> Option<&Contract> {
        for entry in self.entries.iter() {
            match entry.request.mismatch(request) {
                None => {
                    tracing::debug!(
                        target: "accord::matcher",
                        contract_id = %entry.contract.id,
                        method = %request.method,
                        path = %request.path,
                        "request matched"
                    );
                    return Some(&entry.contract);
                }
                Some(field) => tracing::trace!(
                    target: "accord::matcher",
                    contract_id = %entry.contract.id,
                    field = %field,
                    "predicate failed"
                ),
            }
        }
        tracing::debug!(
            target: "accord::matcher",
            method = %request.method,
            path = %request.path,
            inspected = self.entries.len(),
            "no contract matched"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract(id: &str, priority: Option<i64>, name: serde_json::Value) -> Contract {
        serde_json::from_value(json!({
            "id": id,
            "priority": priority,
            "request": {"method": "POST", "url": "/check", "body": {"name": name}},
            "response": {"status": 200, "body": {"winner": id}}
        }))
        .unwrap()
    }

    #[test]
    fn orders_by_priority_then_declaration() {
        let registry = Registry::load(vec![
            contract("late", None, json!("x")),
            contract("second", Some(5), json!("x")),
            contract("first", Some(5), json!("x")),
            contract("top", Some(1), json!("x")),
        ])
        .unwrap();
        let ids: Vec<_> = registry.all().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["top", "second", "first", "late"]);
    }

    #[test]
    fn lower_priority_number_wins() {
        let registry = Registry::load(vec![
            contract("generic", Some(100), json!({"$any": "anyAlphaUnicode"})),
            contract("specific", Some(10), json!("starbuxman")),
        ])
        .unwrap();
        let request =
            IncomingRequest::new("POST", "/check").with_body(json!({"name": "starbuxman"}));
        assert_eq!(registry.match_request(&request).unwrap().id, "specific");
        let other = IncomingRequest::new("POST", "/check").with_body(json!({"name": "alice"}));
        assert_eq!(registry.match_request(&other).unwrap().id, "generic");
        let none = IncomingRequest::new("POST", "/other").with_body(json!({"name": "alice"}));
        assert!(registry.match_request(&none).is_none());
    }

    #[test]
    fn load_reports_every_invalid_contract() {
        let mut bad_status = contract("bad-status", None, json!("x"));
        bad_status.response.status = 42;
        let err = Registry::load(vec![
            bad_status,
            contract("dup", None, json!("x")),
            contract("dup", None, json!("y")),
            contract("ok", None, json!("z")),
        ])
        .unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert_eq!(err.issues[0].contract_id.as_deref(), Some("bad-status"));
        assert_eq!(err.issues[1].reason, "duplicate contract id");
    }
}
