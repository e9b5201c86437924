//! Contract ingestion from a directory of JSON/YAML files.

use std::path::Path;

use accord_contracts::Contract;
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{LoadError, LoadIssue};
use crate::registry::Registry;

pub const DEFAULT_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// A parsed contract together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedContract {
    pub origin: String,
    pub contract: Contract,
}

impl SourcedContract {
    pub fn new(origin: impl Into<String>, contract: Contract) -> Self {
        Self {
            origin: origin.into(),
            contract,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            _ => None,
        }
    }
}

/// Parses one document holding a contract or an array of contracts. Ids default to `stem`
/// (or `stem#index` inside an array).
pub fn parse_document(
    origin: &str,
    stem: &str,
    text: &str,
    format: Format,
) -> (Vec<SourcedContract>, Vec<LoadIssue>) {
    let parsed: Result<Value, String> = match format {
        Format::Json => serde_json::from_str(text).map_err(|err| err.to_string()),
        Format::Yaml => serde_yaml::from_str(text).map_err(|err| err.to_string()),
    };
    let document = match parsed {
        Ok(document) => document,
        Err(reason) => return (Vec::new(), vec![LoadIssue::new(origin, None, reason)]),
    };

    let records: Vec<(String, String, Value)> = match document {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| (format!("{origin}[{idx}]"), format!("{stem}#{idx}"), item))
            .collect(),
        single => vec![(origin.to_string(), stem.to_string(), single)],
    };

    let mut contracts = Vec::new();
    let mut issues = Vec::new();
    for (origin, default_id, record) in records {
        match parse_record(record, &default_id) {
            Ok(contract) => contracts.push(SourcedContract::new(origin, contract)),
            Err((id, reason)) => issues.push(LoadIssue::new(origin, id.as_deref(), reason)),
        }
    }
    (contracts, issues)
}

fn parse_record(record: Value, default_id: &str) -> Result<Contract, (Option<String>, String)> {
    let Value::Object(mut map) = record else {
        return Err((None, "contract must be an object".into()));
    };
    if !map.contains_key("id") {
        map.insert("id".into(), Value::from(default_id));
    }
    let id = map.get("id").and_then(Value::as_str).map(str::to_string);
    let missing: Vec<&str> = ["request", "response"]
        .into_iter()
        .filter(|block| !map.get(*block).is_some_and(Value::is_object))
        .collect();
    if !missing.is_empty() {
        return Err((id, format!("missing {} block", missing.join(" and "))));
    }
    serde_json::from_value(Value::Object(map)).map_err(|err| (id, err.to_string()))
}

/// Reads every contract file under `dir`, sorted by path so declaration order is stable.
pub fn read_dir(dir: &Path, extensions: &[String]) -> Result<Vec<SourcedContract>, LoadError> {
    let (contracts, issues) = scan(dir, extensions);
    if issues.is_empty() {
        Ok(contracts)
    } else {
        Err(LoadError { issues })
    }
}

fn scan(dir: &Path, extensions: &[String]) -> (Vec<SourcedContract>, Vec<LoadIssue>) {
    let mut contracts = Vec::new();
    let mut issues = Vec::new();
    if !dir.is_dir() {
        issues.push(LoadIssue::new(
            dir.display().to_string(),
            None,
            "contract directory not found",
        ));
        return (contracts, issues);
    }

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                issues.push(LoadIssue::new(dir.display().to_string(), None, err.to_string()));
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
            continue;
        }
        let Some(format) = Format::from_extension(ext) else {
            continue;
        };
        let origin = path.display().to_string();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("contract")
            .to_string();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let (found, problems) = parse_document(&origin, &stem, &text, format);
                tracing::debug!(
                    target: "accord::registry",
                    origin = %origin,
                    contracts = found.len(),
                    "contract file read"
                );
                contracts.extend(found);
                issues.extend(problems);
            }
            Err(err) => issues.push(LoadIssue::new(origin, None, err.to_string())),
        }
    }
    (contracts, issues)
}

/// Reads `dir` and builds a registry, aggregating file and contract issues into one error.
pub fn load_registry(dir: &Path, extensions: &[String]) -> Result<Registry, LoadError> {
    let (contracts, mut issues) = scan(dir, extensions);
    match Registry::load_sourced(contracts) {
        Ok(registry) if issues.is_empty() => Ok(registry),
        Ok(_) => Err(LoadError { issues }),
        Err(err) => {
            issues.extend(err.issues);
            Err(LoadError { issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn ids_default_to_file_stem() {
        let (contracts, issues) = parse_document(
            "orders.json",
            "orders",
            r#"[
                {"request": {"method": "GET", "url": "/a"}, "response": {"status": 200}},
                {"id": "named",
                 "request": {"method": "GET", "url": "/b"},
                 "response": {"status": 200}}
            ]"#,
            Format::Json,
        );
        assert!(issues.is_empty(), "{issues:?}");
        let ids: Vec<_> = contracts.iter().map(|c| c.contract.id.as_str()).collect();
        assert_eq!(ids, ["orders#0", "named"]);
        assert_eq!(contracts[0].origin, "orders.json[0]");
    }

    #[test]
    fn missing_blocks_are_reported_per_record() {
        let (contracts, issues) = parse_document(
            "broken.yaml",
            "broken",
            "- id: a\n  request: {method: GET, url: /a}\n- id: b\n",
            Format::Yaml,
        );
        assert!(contracts.is_empty());
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].reason, "missing response block");
        assert_eq!(issues[1].reason, "missing request and response block");
    }

    #[test]
    fn directory_walk_is_sorted_and_aggregates_issues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "request: {method: GET, url: /b}\nresponse: {status: 200}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"request": {"method": "GET", "url": "/a"}, "response": {"status": 200}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let contracts = read_dir(dir.path(), &exts()).unwrap();
        let ids: Vec<_> = contracts.iter().map(|c| c.contract.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);

        std::fs::write(dir.path().join("c.json"), "{not json").unwrap();
        std::fs::write(
            dir.path().join("d.json"),
            r#"{"request": {"method": "GET", "url": "/d"}, "response": {"status": 9}}"#,
        )
        .unwrap();
        let err = load_registry(dir.path(), &exts()).unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }
}
