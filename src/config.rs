use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server settings, read once from `COACHBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub accounts_file: Option<PathBuf>,
    pub public_login: String,
    pub public_password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub reconcile_interval: Duration,
    pub reconcile_repair: bool,
    pub min_lead: chrono::Duration,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            accounts_file: None,
            public_login: "public".into(),
            public_password: "public".into(),
            max_connections: 256,
            compact_threshold: 1000,
            reconcile_interval: Duration::from_secs(300),
            reconcile_repair: false,
            min_lead: chrono::Duration::zero(),
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let text = |var: &str| lookup(var).filter(|v| !v.is_empty());

        Ok(Self {
            port: parsed(&lookup, "COACHBOOK_PORT")?.unwrap_or(d.port),
            bind: text("COACHBOOK_BIND").unwrap_or(d.bind),
            data_dir: text("COACHBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            accounts_file: text("COACHBOOK_ACCOUNTS").map(PathBuf::from),
            public_login: text("COACHBOOK_PUBLIC_LOGIN").unwrap_or(d.public_login),
            public_password: text("COACHBOOK_PUBLIC_PASSWORD").unwrap_or(d.public_password),
            max_connections: parsed(&lookup, "COACHBOOK_MAX_CONNECTIONS")?.unwrap_or(d.max_connections),
            compact_threshold: parsed(&lookup, "COACHBOOK_COMPACT_THRESHOLD")?.unwrap_or(d.compact_threshold),
            reconcile_interval: parsed(&lookup, "COACHBOOK_RECONCILE_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.reconcile_interval),
            reconcile_repair: parsed(&lookup, "COACHBOOK_RECONCILE_REPAIR")?.unwrap_or(d.reconcile_repair),
            min_lead: match parsed::<i64>(&lookup, "COACHBOOK_MIN_LEAD_MINUTES")? {
                None => d.min_lead,
                Some(minutes) => chrono::Duration::try_minutes(minutes).ok_or_else(|| ConfigError::Invalid {
                    var: "COACHBOOK_MIN_LEAD_MINUTES",
                    value: minutes.to_string(),
                })?,
            },
            tls_cert: text("COACHBOOK_TLS_CERT"),
            tls_key: text("COACHBOOK_TLS_KEY"),
            metrics_port: parsed(&lookup, "COACHBOOK_METRICS_PORT")?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("coachbook.wal")
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.port, 5433);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5433");
        assert_eq!(cfg.public_login, "public");
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.reconcile_interval, Duration::from_secs(300));
        assert!(!cfg.reconcile_repair);
        assert!(cfg.accounts_file.is_none());
        assert!(cfg.metrics_port.is_none());
        assert_eq!(cfg.wal_path(), PathBuf::from("./data").join("coachbook.wal"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from_pairs(&[
            ("COACHBOOK_PORT", "6000"),
            ("COACHBOOK_DATA_DIR", "/var/lib/coachbook"),
            ("COACHBOOK_ACCOUNTS", "/etc/coachbook/accounts.json"),
            ("COACHBOOK_RECONCILE_REPAIR", "true"),
            ("COACHBOOK_MIN_LEAD_MINUTES", "90"),
            ("COACHBOOK_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/coachbook"));
        assert_eq!(cfg.accounts_file, Some(PathBuf::from("/etc/coachbook/accounts.json")));
        assert!(cfg.reconcile_repair);
        assert_eq!(cfg.min_lead, chrono::Duration::minutes(90));
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = from_pairs(&[("COACHBOOK_PORT", ""), ("COACHBOOK_BIND", "")]).unwrap();
        assert_eq!(cfg.port, 5433);
        assert_eq!(cfg.bind, "0.0.0.0");
    }

    #[test]
    fn garbage_is_an_error() {
        let err = from_pairs(&[("COACHBOOK_MAX_CONNECTIONS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("COACHBOOK_MAX_CONNECTIONS"));
    }

    #[test]
    fn out_of_range_min_lead_is_an_error() {
        let huge = i64::MAX.to_string();
        let err = from_pairs(&[("COACHBOOK_MIN_LEAD_MINUTES", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("COACHBOOK_MIN_LEAD_MINUTES"));
    }
}
