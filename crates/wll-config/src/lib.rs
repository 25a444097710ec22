use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "WLL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "wll.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// WLL hostname or IP, optionally `host:port`
    pub host: String,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default = "default_true")]
    pub polling_enabled: bool,
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout: u64,
    #[serde(default = "default_max_no_data_iterations")]
    pub max_no_data_iterations: u32,
    /// Explicit mapping definitions; take precedence over `[sensors]`
    #[serde(default)]
    pub mapping: Option<Vec<String>>,
    #[serde(default = "default_decode_failure")]
    pub decode_failure: String,
    #[serde(default)]
    pub log_success: bool,
    #[serde(default = "default_true")]
    pub log_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive period length in seconds
    #[serde(default = "default_archive_interval")]
    pub interval: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            interval: default_archive_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SinkConfig {
    /// JSON-lines output directory; records are only logged when unset
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub driver: DriverConfig,
    /// Transmitter id -> sensor keys
    #[serde(default)]
    pub sensors: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_polling_interval() -> u64 {
    10
}

fn default_socket_timeout() -> u64 {
    20
}

fn default_max_no_data_iterations() -> u32 {
    5
}

fn default_decode_failure() -> String {
    "terminate".to_string()
}

fn default_archive_interval() -> i64 {
    300
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load from the path in `WLL_CONFIG`, defaulting to `wll.toml`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg = toml::from_str::<AppConfig>(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let driver = &self.driver;
        if driver.host.trim().is_empty() {
            return Err(ConfigError::Invalid("driver.host must not be empty".into()));
        }
        if !(10..=300).contains(&driver.polling_interval) {
            return Err(ConfigError::Invalid(format!(
                "driver.polling_interval must be between 10 and 300 seconds, got {}",
                driver.polling_interval
            )));
        }
        if driver.socket_timeout == 0 {
            return Err(ConfigError::Invalid("driver.socket_timeout must be positive".into()));
        }
        if driver.max_no_data_iterations < 1 {
            return Err(ConfigError::Invalid(
                "driver.max_no_data_iterations must be at least 1".into(),
            ));
        }
        if !matches!(driver.decode_failure.as_str(), "terminate" | "skip") {
            return Err(ConfigError::Invalid(format!(
                "driver.decode_failure must be \"terminate\" or \"skip\", got {:?}",
                driver.decode_failure
            )));
        }
        if matches!(&driver.mapping, Some(m) if m.is_empty()) {
            return Err(ConfigError::Invalid("driver.mapping must not be empty".into()));
        }
        if self.archive.interval <= 0 {
            return Err(ConfigError::Invalid(format!(
                "archive.interval must be positive, got {}",
                self.archive.interval
            )));
        }
        self.sensor_keys()?;
        Ok(())
    }

    /// `[sensors]` with transmitter ids parsed
    pub fn sensor_keys(&self) -> Result<BTreeMap<u8, Vec<String>>, ConfigError> {
        self.sensors
            .iter()
            .map(|(tx, keys)| {
                let id = tx
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|id| (1..=8).contains(id))
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "sensors: transmitter id must be 1..=8, got {tx:?}"
                        ))
                    })?;
                Ok((id, keys.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
[driver]
host = "192.168.1.50"
polling_interval = 30
mapping = ["th:1", "wind:1", "rain:1", "th_indoor", "baro"]
decode_failure = "skip"
log_success = true

[sensors]
1 = ["th", "wind"]

[archive]
interval = 600

[sink]
dir = "/var/lib/wll"
"#;

    #[test]
    fn parses_full_file() {
        let cfg = AppConfig::from_toml_str(FULL).unwrap();
        assert_eq!(cfg.driver.host, "192.168.1.50");
        assert_eq!(cfg.driver.polling_interval, 30);
        assert_eq!(cfg.driver.mapping.as_ref().unwrap().len(), 5);
        assert_eq!(cfg.driver.decode_failure, "skip");
        assert!(cfg.driver.log_success);
        assert!(cfg.driver.log_failure);
        assert_eq!(cfg.archive.interval, 600);
        assert_eq!(cfg.sink.dir, Some(PathBuf::from("/var/lib/wll")));
        assert_eq!(
            cfg.sensor_keys().unwrap(),
            BTreeMap::from([(1u8, vec!["th".to_string(), "wind".to_string()])])
        );
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_toml_str("[driver]\nhost = \"wll.local\"\n").unwrap();
        assert_eq!(cfg.driver.polling_interval, 10);
        assert!(cfg.driver.polling_enabled);
        assert_eq!(cfg.driver.socket_timeout, 20);
        assert_eq!(cfg.driver.max_no_data_iterations, 5);
        assert_eq!(cfg.driver.decode_failure, "terminate");
        assert!(cfg.driver.mapping.is_none());
        assert!(!cfg.driver.log_success);
        assert_eq!(cfg.archive.interval, 300);
        assert!(cfg.sink.dir.is_none());
        assert!(cfg.sensors.is_empty());
    }

    #[test]
    fn rejects_invalid_values() {
        for body in [
            "[driver]\nhost = \"\"\n",
            "[driver]\nhost = \"h\"\npolling_interval = 5\n",
            "[driver]\nhost = \"h\"\npolling_interval = 301\n",
            "[driver]\nhost = \"h\"\nmax_no_data_iterations = 0\n",
            "[driver]\nhost = \"h\"\ndecode_failure = \"ignore\"\n",
            "[driver]\nhost = \"h\"\nmapping = []\n",
            "[driver]\nhost = \"h\"\n[archive]\ninterval = 0\n",
            "[driver]\nhost = \"h\"\n[sensors]\n9 = [\"th\"]\n",
        ] {
            assert!(
                matches!(AppConfig::from_toml_str(body), Err(ConfigError::Invalid(_))),
                "accepted {body:?}"
            );
        }
    }

    #[test]
    fn missing_host_is_a_toml_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[driver]\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let cfg = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.driver.polling_interval, 30);

        let missing = AppConfig::load_from(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
