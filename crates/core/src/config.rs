use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MeshflowError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Jaeger,
    Tempo,
}

impl FromStr for BackendKind {
    type Err = MeshflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jaeger" => Ok(Self::Jaeger),
            "tempo" | "otlp" => Ok(Self::Tempo),
            _ => Err(MeshflowError::Parse(format!("unknown tracing backend: {s}"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jaeger => write!(f, "jaeger"),
            Self::Tempo => write!(f, "tempo"),
        }
    }
}

/// Maps services whose name contains `pattern` to `namespace` when a span
/// carries no namespace attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceRule {
    pub pattern: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub collector_enabled: bool,
    pub backend: BackendKind,
    pub backend_url: String,
    pub collect_interval: Duration,
    pub lookback: Duration,
    pub trace_limit: usize,
    pub request_timeout: Duration,
    pub namespaces: Vec<String>,
    pub namespace_rules: Vec<NamespaceRule>,
    pub max_flows: usize,
    pub retention_ttl: Duration,
    pub query_tcp_addr: String,
    pub query_http_addr: String,
    pub uds_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let xdg_runtime = env::var("XDG_RUNTIME_DIR").ok();

        let uds_path = xdg_runtime
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home).join(".local/share/meshflow"))
            .join("meshflow.sock");

        Self {
            collector_enabled: true,
            backend: BackendKind::Jaeger,
            backend_url: "http://127.0.0.1:16686".to_string(),
            collect_interval: Duration::from_secs(30),
            lookback: Duration::from_secs(5 * 60),
            trace_limit: 50,
            request_timeout: Duration::from_secs(10),
            namespaces: Vec::new(),
            namespace_rules: Vec::new(),
            max_flows: 5_000,
            retention_ttl: Duration::from_secs(60 * 60 * 24),
            query_tcp_addr: "127.0.0.1:1787".to_string(),
            query_http_addr: "127.0.0.1:1788".to_string(),
            uds_path,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    collector_enabled: Option<bool>,
    backend: Option<String>,
    backend_url: Option<String>,
    collect_interval: Option<String>,
    lookback: Option<String>,
    trace_limit: Option<usize>,
    request_timeout: Option<String>,
    namespaces: Option<String>,
    namespace_rules: Option<String>,
    max_flows: Option<usize>,
    retention_ttl: Option<String>,
    query_tcp_addr: Option<String>,
    query_http_addr: Option<String>,
    uds_path: Option<PathBuf>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("MESHFLOW_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("meshflow/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| MeshflowError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| MeshflowError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        collector_enabled: parse_env("MESHFLOW_COLLECTOR_ENABLED")?,
        backend: env::var("MESHFLOW_BACKEND").ok(),
        backend_url: env::var("MESHFLOW_BACKEND_URL").ok(),
        collect_interval: env::var("MESHFLOW_COLLECT_INTERVAL").ok(),
        lookback: env::var("MESHFLOW_LOOKBACK").ok(),
        trace_limit: parse_env("MESHFLOW_TRACE_LIMIT")?,
        request_timeout: env::var("MESHFLOW_REQUEST_TIMEOUT").ok(),
        namespaces: env::var("MESHFLOW_NAMESPACES").ok(),
        namespace_rules: env::var("MESHFLOW_NAMESPACE_RULES").ok(),
        max_flows: parse_env("MESHFLOW_MAX_FLOWS")?,
        retention_ttl: env::var("MESHFLOW_RETENTION_TTL").ok(),
        query_tcp_addr: env::var("MESHFLOW_QUERY_TCP_ADDR").ok(),
        query_http_addr: env::var("MESHFLOW_QUERY_HTTP_ADDR").ok(),
        uds_path: env::var("MESHFLOW_QUERY_UDS_PATH").ok().map(PathBuf::from),
    })
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| MeshflowError::Config(format!("bad {key} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.collector_enabled {
        cfg.collector_enabled = v;
    }
    if let Some(v) = overrides.backend {
        cfg.backend = v.parse().map_err(|e| {
            MeshflowError::Config(format!("bad backend in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.backend_url {
        cfg.backend_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.collect_interval {
        cfg.collect_interval = parse_duration_field(&v, "collect_interval", source)?;
    }
    if let Some(v) = overrides.lookback {
        cfg.lookback = parse_duration_field(&v, "lookback", source)?;
    }
    if let Some(v) = overrides.trace_limit {
        cfg.trace_limit = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = parse_duration_field(&v, "request_timeout", source)?;
    }
    if let Some(v) = overrides.namespaces {
        cfg.namespaces = parse_list(&v);
    }
    if let Some(v) = overrides.namespace_rules {
        cfg.namespace_rules = parse_namespace_rules(&v).map_err(|e| {
            MeshflowError::Config(format!(
                "bad namespace_rules in {source}: {e} (value={v})"
            ))
        })?;
    }
    if let Some(v) = overrides.max_flows {
        cfg.max_flows = v;
    }
    if let Some(v) = overrides.retention_ttl {
        cfg.retention_ttl = parse_duration_field(&v, "retention_ttl", source)?;
    }
    if let Some(v) = overrides.query_tcp_addr {
        cfg.query_tcp_addr = v;
    }
    if let Some(v) = overrides.query_http_addr {
        cfg.query_http_addr = v;
    }
    if let Some(v) = overrides.uds_path {
        cfg.uds_path = v;
    }
    Ok(())
}

fn parse_duration_field(raw: &str, field: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(raw).map_err(|e| {
        MeshflowError::Config(format!("bad {field} in {source}: {e} (value={raw})"))
    })
}

pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `pattern=namespace` pairs separated by commas, preserving order.
pub fn parse_namespace_rules(raw: &str) -> Result<Vec<NamespaceRule>> {
    let mut out = Vec::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((pattern, namespace)) = trimmed.split_once('=') else {
            return Err(MeshflowError::Config(
                "namespace rules must use pattern=namespace syntax".to_string(),
            ));
        };
        let pattern = pattern.trim();
        let namespace = namespace.trim();
        if pattern.is_empty() || namespace.is_empty() {
            return Err(MeshflowError::Config(
                "namespace rule pattern and namespace cannot be empty".to_string(),
            ));
        }
        out.push(NamespaceRule {
            pattern: pattern.to_string(),
            namespace: namespace.to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_expected_collector_settings() {
        let cfg = Config::default();
        assert!(cfg.collector_enabled);
        assert_eq!(cfg.backend, BackendKind::Jaeger);
        assert_eq!(cfg.lookback, Duration::from_secs(300));
        assert_eq!(cfg.query_tcp_addr, "127.0.0.1:1787");
        assert!(cfg.namespaces.is_empty());
    }

    #[test]
    fn default_has_retention() {
        let cfg = Config::default();
        assert_eq!(cfg.retention_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.max_flows, 5_000);
    }

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("Jaeger".parse::<BackendKind>().unwrap(), BackendKind::Jaeger);
        assert_eq!("otlp".parse::<BackendKind>().unwrap(), BackendKind::Tempo);
        assert!("zipkin".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Tempo.to_string(), "tempo");
    }

    #[test]
    fn parse_namespace_rules_accepts_list() {
        let rules = parse_namespace_rules("ccs-=ccs, pg=dbaas").unwrap();
        assert_eq!(
            rules,
            vec![
                NamespaceRule {
                    pattern: "ccs-".into(),
                    namespace: "ccs".into()
                },
                NamespaceRule {
                    pattern: "pg".into(),
                    namespace: "dbaas".into()
                },
            ]
        );
    }

    #[test]
    fn parse_namespace_rules_rejects_bad_entries() {
        assert!(parse_namespace_rules("ccs").is_err());
        assert!(parse_namespace_rules("=ccs").is_err());
        assert!(parse_namespace_rules("ccs=").is_err());
    }

    #[test]
    fn apply_file_overrides_updates_collector_fields() {
        let mut cfg = Config::default();
        let file = ConfigOverrides {
            backend: Some("tempo".to_string()),
            backend_url: Some("http://tempo:3200/".to_string()),
            collect_interval: Some("15s".to_string()),
            namespaces: Some("ccs, dbaas,".to_string()),
            namespace_rules: Some("ccs-=ccs".to_string()),
            max_flows: Some(10),
            ..ConfigOverrides::default()
        };

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.backend, BackendKind::Tempo);
        assert_eq!(cfg.backend_url, "http://tempo:3200");
        assert_eq!(cfg.collect_interval, Duration::from_secs(15));
        assert_eq!(cfg.namespaces, vec!["ccs".to_string(), "dbaas".to_string()]);
        assert_eq!(cfg.namespace_rules.len(), 1);
        assert_eq!(cfg.max_flows, 10);
    }

    #[test]
    fn apply_overrides_reports_bad_durations() {
        let mut cfg = Config::default();
        let err = apply_overrides(
            &mut cfg,
            ConfigOverrides {
                lookback: Some("soon".to_string()),
                ..ConfigOverrides::default()
            },
            "environment",
        )
        .unwrap_err();
        assert!(err.to_string().contains("lookback"));
    }
}
