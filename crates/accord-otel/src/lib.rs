use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

/// Rolling access-log sink for `http.access` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLog {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: Rotation,
}

impl AccessLog {
    /// Reads `ACCORD_ACCESS_LOG_*` through `lookup`; `None` unless `ACCORD_ACCESS_LOG_ROLL=1`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if lookup("ACCORD_ACCESS_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        let dir = lookup("ACCORD_ACCESS_LOG_DIR").unwrap_or_else(|| "logs".to_string());
        let prefix = lookup("ACCORD_ACCESS_LOG_PREFIX").unwrap_or_else(|| "http-access".into());
        let rotation = match lookup("ACCORD_ACCESS_LOG_ROTATION")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        };
        Some(Self {
            dir: PathBuf::from(dir),
            prefix,
            rotation,
        })
    }

    fn appender(&self) -> tracing_appender::rolling::RollingFileAppender {
        match self.rotation {
            Rotation::Hourly => tracing_appender::rolling::hourly(&self.dir, &self.prefix),
            Rotation::Minutely => tracing_appender::rolling::minutely(&self.dir, &self.prefix),
            Rotation::Daily => tracing_appender::rolling::daily(&self.dir, &self.prefix),
        }
    }
}

/// Console tracing filtered by `RUST_LOG` (default `info`), plus the access log when enabled.
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`] with a caller-chosen fallback directive for when `RUST_LOG` is unset.
pub fn init_with_default(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let access = AccessLog::from_lookup(|key| std::env::var(key).ok());
    install(filter, access);
}

fn install(filter: EnvFilter, access: Option<AccessLog>) {
    let fmt_layer = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(filter));
    let Some(access) = access else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&access.dir).is_err() {
        eprintln!(
            "failed to create access log directory {}",
            access.dir.display()
        );
    }
    let (nb, guard) = tracing_appender::non_blocking(access.appender());
    let _ = ACCESS_GUARD.set(guard);
    let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(targets);
    let _ = registry.with(access_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| env.get(key).cloned()
    }

    #[test]
    fn access_log_is_opt_in() {
        assert!(AccessLog::from_lookup(lookup(&[])).is_none());
        assert!(AccessLog::from_lookup(lookup(&[("ACCORD_ACCESS_LOG_ROLL", "0")])).is_none());
    }

    #[test]
    fn access_log_reads_directory_and_rotation() {
        let access = AccessLog::from_lookup(lookup(&[
            ("ACCORD_ACCESS_LOG_ROLL", "1"),
            ("ACCORD_ACCESS_LOG_DIR", "/var/log/accord"),
            ("ACCORD_ACCESS_LOG_ROTATION", "Hourly"),
        ]))
        .unwrap();
        assert_eq!(access.dir, PathBuf::from("/var/log/accord"));
        assert_eq!(access.prefix, "http-access");
        assert_eq!(access.rotation, Rotation::Hourly);
    }
}
