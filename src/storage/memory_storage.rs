//! In-process alert store.
//!
//! Keeps validated alerts in a `BTreeMap` keyed by identifier and evaluates filters in Rust
//! with [`AlertFilter::matches`]. Used for tests and ephemeral runs; nothing survives a restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error_handling::types::StorageError;
use crate::storage::alert_filter::AlertFilter;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{Alert, NewAlert};

struct StoredAlert {
    id: i64,
    decision_ids: Vec<i64>,
    alert: NewAlert,
}

impl StoredAlert {
    fn materialize(&self, now: DateTime<Utc>) -> Alert {
        let a = &self.alert;
        Alert {
            capacity: a.capacity,
            created_at: a.created_at,
            decisions: a
                .decisions
                .iter()
                .zip(&self.decision_ids)
                .map(|(d, id)| d.to_decision(*id, now))
                .collect(),
            events: a.events.clone(),
            events_count: a.events_count,
            id: self.id,
            leakspeed: a.leakspeed.clone(),
            machine_id: a.machine_id.clone(),
            message: a.message.clone(),
            scenario: a.scenario.clone(),
            scenario_hash: a.scenario_hash.clone(),
            scenario_version: a.scenario_version.clone(),
            simulated: a.simulated,
            source: a.source.clone(),
            start_at: a.start_at,
            stop_at: a.stop_at,
            uuid: a.uuid,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    last_alert_id: i64,
    last_decision_id: i64,
    alerts: BTreeMap<i64, StoredAlert>,
}

#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<i64>, StorageError> {
        let mut state = self.state.write().await;
        let mut ids = Vec::with_capacity(alerts.len());
        for alert in alerts {
            state.last_alert_id += 1;
            let id = state.last_alert_id;
            let first = state.last_decision_id + 1;
            state.last_decision_id += alert.decisions.len() as i64;
            let decision_ids = (first..=state.last_decision_id).collect();
            state.alerts.insert(
                id,
                StoredAlert {
                    id,
                    decision_ids,
                    alert,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn list_alerts(
        &self,
        filter: &AlertFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StorageError> {
        let include_simulated = filter.include_simulated(false);
        let state = self.state.read().await;
        Ok(state
            .alerts
            .values()
            .rev()
            .map(|stored| stored.materialize(now))
            .filter(|alert| filter.matches(alert, include_simulated, now))
            .map(|mut alert| {
                alert
                    .decisions
                    .retain(|d| include_simulated || !d.simulated);
                alert
            })
            .collect())
    }

    async fn get_alert(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Alert>, StorageError> {
        let state = self.state.read().await;
        Ok(state.alerts.get(&id).map(|stored| stored.materialize(now)))
    }

    async fn delete_alerts(
        &self,
        filter: &AlertFilter,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let include_simulated = filter.include_simulated(true);
        let mut state = self.state.write().await;
        let before = state.alerts.len();
        state
            .alerts
            .retain(|_, stored| !filter.matches(&stored.materialize(now), include_simulated, now));
        Ok((before - state.alerts.len()) as u64)
    }
}
