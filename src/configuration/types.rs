use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Addresses or CIDR blocks allowed to delete alerts.
    #[serde(default = "default_trusted_ips")]
    pub trusted_ips: Vec<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            trusted_ips: default_trusted_ips(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Decision rows per bulk insert statement.
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            path: None,
            max_connections: default_max_connections(),
            bulk_size: default_bulk_size(),
        }
    }
}

/// A sensor allowed to talk to the API.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct MachineCredential {
    pub machine_id: String,
    pub token: String,
    #[serde(default = "default_validated")]
    pub validated: bool,
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_trusted_ips() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

fn default_max_body_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    5
}

fn default_bulk_size() -> usize {
    20
}

fn default_validated() -> bool {
    true
}
