//! Storage Trait
//!
//! This module defines the `Storage` trait, the interface every alert backend implements.
//!
//! Implementors of this trait are responsible for:
//! - Persisting alert batches atomically and assigning their identifiers
//! - Evaluating an [`AlertFilter`] and returning the matching alerts
//! - Deleting alerts together with their decisions
//!
//! All methods return a `Result` to handle potential storage errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::types::StorageError;
use crate::storage::alert_filter::AlertFilter;
use crate::storage::types::{Alert, NewAlert};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists a batch in one transaction.
    ///
    /// Returns the assigned identifiers in input order. Either every alert and decision of the
    /// batch is stored or none is.
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<i64>, StorageError>;

    /// Alerts matching `filter`, most recent first.
    ///
    /// Each alert carries only the decisions visible under the filter's simulation policy.
    async fn list_alerts(
        &self,
        filter: &AlertFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StorageError>;

    /// A single alert with all of its decisions.
    async fn get_alert(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Alert>, StorageError>;

    /// Deletes the matching alerts and their decisions, returning the number of alerts removed.
    ///
    /// An absent `simulated` predicate includes simulated alerts.
    async fn delete_alerts(
        &self,
        filter: &AlertFilter,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}
