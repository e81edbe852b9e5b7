//! Storage subsystem
//!
//! This module provides abstractions and implementations for persisting alerts and their
//! decisions.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform async API.
//! - `types`: stored alert/decision views and validated insert records.
//! - `alert_filter`: the closed set of query predicates and their in-memory evaluation.
//! - `database_storage`: SQLite implementation using SeaORM.
//! - `memory_storage`: in-process implementation for tests and ephemeral runs.
//! - `db_entities`: SeaORM entity models for the database backend.

pub mod alert_filter;
pub mod database_storage;
pub mod db_entities;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

use std::sync::Arc;

use log::info;

use crate::configuration::types::{DatabaseBackend, DatabaseConfig};
use crate::error_handling::types::StorageError;
use database_storage::DatabaseStorage;
use memory_storage::MemoryStorage;
use storage_trait::Storage;

/// Opens the backend selected by the configuration.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Storage>, StorageError> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            let path = config.path.as_ref().ok_or_else(|| {
                StorageError::ConnectionFailed("sqlite backend requires a database path".into())
            })?;
            let storage =
                DatabaseStorage::new_file(path, config.max_connections, config.bulk_size).await?;
            Ok(Arc::new(storage))
        }
        DatabaseBackend::Memory => {
            info!("using in-memory alert storage, alerts are lost on exit");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use chrono::{DateTime, TimeDelta, Utc};
    use uuid::Uuid;

    use crate::network::address_range::AddressRange;
    use crate::storage::types::{NewAlert, NewDecision, Source};

    /// A ban on `value`; literals containing `/` get `Range` scope.
    pub fn new_decision(value: &str, simulated: bool, until: DateTime<Utc>) -> NewDecision {
        let scope = if value.contains('/') { "Range" } else { "Ip" };
        NewDecision {
            origin: "test".into(),
            scenario: "crowdsecurity/ssh-bf".into(),
            scope: scope.into(),
            decision_type: "ban".into(),
            value: value.into(),
            until,
            range: Some(AddressRange::encode(value).unwrap()),
            simulated,
        }
    }

    /// An alert on `value` carrying one four hour ban.
    pub fn new_alert(scenario: &str, value: &str, simulated: bool, now: DateTime<Utc>) -> NewAlert {
        let decision = new_decision(value, simulated, now + TimeDelta::hours(4));
        NewAlert {
            uuid: Uuid::new_v4(),
            machine_id: "test".into(),
            scenario: scenario.into(),
            scenario_hash: "hash".into(),
            scenario_version: "0.1".into(),
            message: format!("{} {} performed '{}'", decision.scope, value, scenario),
            events_count: 6,
            capacity: 5,
            leakspeed: "10s".into(),
            start_at: now,
            stop_at: now,
            simulated,
            source: Source {
                scope: decision.scope.clone(),
                value: value.into(),
                ..Default::default()
            },
            events: vec![],
            created_at: now,
            decisions: vec![decision],
        }
    }
}
