use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::source::DEFAULT_EXTENSIONS;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_UNMATCHED_STATUS: u16 = 404;
pub const DEFAULT_CONTRACTS_DIR: &str = "contracts";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the stub server
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Status returned when no contract matches (default 404)
    #[serde(default)]
    #[schemars(range(min = 100, max = 599))]
    pub unmatched_status: Option<u16>,
}

impl ServerConfig {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn unmatched_status(&self) -> u16 {
        self.unmatched_status.unwrap_or(DEFAULT_UNMATCHED_STATUS)
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ContractsConfig {
    /// Directory walked for contract files
    #[serde(default)]
    pub dir: Option<String>,
    /// File extensions read as contracts, e.g. ["json", "yaml"]
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

impl ContractsConfig {
    pub fn dir(&self) -> &str {
        self.dir.as_deref().unwrap_or(DEFAULT_CONTRACTS_DIR)
    }

    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(exts) if !exts.is_empty() => exts.clone(),
            _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Worker threads for case synthesis (default: available CPUs)
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub parallelism: Option<usize>,
}

impl GenerationConfig {
    pub fn parallelism(&self) -> usize {
        self.parallelism
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(usize::from))
            .unwrap_or(1)
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfig {
    /// Producer base URL, e.g. <http://127.0.0.1:8080>
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl VerifyConfig {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing `accord.toml`.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

/// Parses and schema-checks a TOML document. All schema violations are reported together.
pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("invalid config {}", path.display()))
}

/// Loads `path` when given (or `accord.toml` when present), then applies env overrides.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    let mut cfg = match path {
        Some(path) => load_config(path)?,
        None if Path::new("accord.toml").is_file() => load_config(Path::new("accord.toml"))?,
        None => Config::default(),
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Applies `ACCORD_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(host) = lookup("ACCORD_HOST").filter(|v| !v.trim().is_empty()) {
        cfg.server.host = Some(host.trim().to_string());
    }
    if let Some(port) = lookup("ACCORD_PORT") {
        let port = port
            .trim()
            .parse::<u16>()
            .with_context(|| format!("ACCORD_PORT `{port}` is not a port"))?;
        cfg.server.port = Some(port);
    }
    if let Some(status) = lookup("ACCORD_UNMATCHED_STATUS") {
        let status = status
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|s| (100..=599).contains(s))
            .with_context(|| format!("ACCORD_UNMATCHED_STATUS `{status}` is not an HTTP status"))?;
        cfg.server.unmatched_status = Some(status);
    }
    if let Some(dir) = lookup("ACCORD_CONTRACTS_DIR").filter(|v| !v.trim().is_empty()) {
        cfg.contracts.dir = Some(dir.trim().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_to_empty_config() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.server.host(), "127.0.0.1");
        assert_eq!(cfg.server.port(), 8090);
        assert_eq!(cfg.server.unmatched_status(), 404);
        assert_eq!(cfg.contracts.dir(), "contracts");
        assert_eq!(cfg.contracts.extensions(), ["json", "yaml", "yml"]);
        assert_eq!(cfg.verify.timeout_ms(), 5000);
        assert!(cfg.generation.parallelism() >= 1);
    }

    #[test]
    fn schema_rejects_wrong_types_and_unknown_keys() {
        let err = parse_config("[server]\nport = \"eighty\"\n").unwrap_err();
        assert!(err.to_string().contains("eighty"), "{err}");
        assert!(parse_config("[server]\nbogus = 1\n").is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = parse_config("[server]\nport = 9000\n[contracts]\ndir = \"c\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("ACCORD_PORT", "9100"),
            ("ACCORD_CONTRACTS_DIR", "/srv/contracts"),
            ("ACCORD_UNMATCHED_STATUS", "418"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut cfg, |key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.server.port(), 9100);
        assert_eq!(cfg.contracts.dir(), "/srv/contracts");
        assert_eq!(cfg.server.unmatched_status(), 418);

        let bad = apply_env_overrides(&mut cfg, |key| {
            (key == "ACCORD_UNMATCHED_STATUS").then(|| "42".to_string())
        });
        assert!(bad.is_err());
    }
}
