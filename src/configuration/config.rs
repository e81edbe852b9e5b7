use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use super::types::*;
use crate::error_handling::types::ConfigError;
use crate::network::address_range::AddressRange;

/// Application configuration loaded from a TOML file.
///
/// # Fields Overview
///
/// - `api`: listening address, origins trusted for deletion, request body limit
/// - `database`: backend selection and SQLite tuning
/// - `machines`: the sensors allowed to authenticate, with their bearer tokens
///
/// Every section is optional and falls back to its defaults, except that the SQLite backend
/// needs a `database.path` (directly or through the command line).
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub machines: Vec<MachineCredential>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Checks the cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api
            .listen_address
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::BadIPFormatting(self.api.listen_address.clone()))?;

        for entry in &self.api.trusted_ips {
            AddressRange::encode(entry).map_err(|e| ConfigError::BadIPFormatting(e.to_string()))?;
        }

        if !(1..=1000).contains(&self.database.bulk_size) {
            return Err(ConfigError::NotInRange(format!(
                "database.bulk_size must be within 1..=1000, got {}",
                self.database.bulk_size
            )));
        }
        if !(1..=64).contains(&self.database.max_connections) {
            return Err(ConfigError::NotInRange(format!(
                "database.max_connections must be within 1..=64, got {}",
                self.database.max_connections
            )));
        }
        if self.database.backend == DatabaseBackend::Sqlite && self.database.path.is_none() {
            return Err(ConfigError::MissingValue(
                "database.path is required by the sqlite backend".into(),
            ));
        }

        let mut seen = HashSet::new();
        for machine in &self.machines {
            if machine.machine_id.trim().is_empty() {
                return Err(ConfigError::MissingValue("machines.machine_id".into()));
            }
            if machine.token.is_empty() {
                return Err(ConfigError::MissingValue(format!(
                    "machines.token for '{}'",
                    machine.machine_id
                )));
            }
            if !seen.insert(machine.machine_id.as_str()) {
                return Err(ConfigError::DuplicateMachine(machine.machine_id.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"
[api]
listen_address = "0.0.0.0:8080"
trusted_ips = ["127.0.0.1", "10.0.0.0/8"]

[database]
backend = "sqlite"
path = "/tmp/decisiond.sqlite3"
bulk_size = 50

[[machines]]
machine_id = "sensor-1"
token = "s3cr3t"

[[machines]]
machine_id = "sensor-2"
token = "other"
validated = false
"#;

    #[test]
    fn test_from_str_with_defaults() {
        let config = Config::from_str(SAMPLE).unwrap();
        assert_eq!(config.api.listen_address, "0.0.0.0:8080");
        assert_eq!(config.api.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(
            config.database.path,
            Some(PathBuf::from("/tmp/decisiond.sqlite3"))
        );
        assert_eq!(config.database.bulk_size, 50);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.machines[0].validated);
        assert!(!config.machines[1].validated);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_file_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.api.trusted_ips, vec!["127.0.0.1", "::1"]);
        assert_eq!(config.database.bulk_size, 20);
        assert!(config.machines.is_empty());
        // sqlite is the default backend and has no path yet
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingValue(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[database]\nbackend = \"memory\"\n").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        config.validate().unwrap();

        assert!(matches!(
            Config::from_file("/nonexistent/decisiond.toml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::from_str(SAMPLE).unwrap();
        config.api.trusted_ips.push("not-an-ip".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadIPFormatting(_))
        ));

        let mut config = Config::from_str(SAMPLE).unwrap();
        config.database.bulk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));

        let mut config = Config::from_str(SAMPLE).unwrap();
        config.api.listen_address = "localhost".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadIPFormatting(_))
        ));

        let mut config = Config::from_str(SAMPLE).unwrap();
        config.machines[1].machine_id = "sensor-1".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateMachine(_))
        ));

        assert!(matches!(
            Config::from_str("[database]\nbackend = \"postgres\"\n"),
            Err(ConfigError::TomlError(_))
        ));
    }
}
