use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::error_handling::types::{FilterError, StorageError};
use crate::storage::alert_filter::AlertFilter;
use crate::storage::storage_trait::Storage;
use crate::storage::types::Alert;

/// Read side of the alert API.
pub struct AlertQuery {
    storage: Arc<dyn Storage>,
}

impl AlertQuery {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn build_filter<I, K, V>(pairs: I) -> Result<AlertFilter, FilterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        AlertFilter::from_query(pairs)
    }

    /// Matching alerts, most recent first. `None` means nothing matched.
    pub async fn apply(&self, filter: &AlertFilter) -> Result<Option<Vec<Alert>>, StorageError> {
        let alerts = self.storage.list_alerts(filter, Utc::now()).await?;
        debug!("alert query matched {} alerts", alerts.len());
        if alerts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(alerts))
        }
    }

    pub async fn find(&self, id: i64) -> Result<Option<Alert>, StorageError> {
        self.storage.get_alert(id, Utc::now()).await
    }
}
