use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::error_handling::types::StorageError;
use crate::storage::alert_filter::AlertFilter;
use crate::storage::storage_trait::Storage;

/// Deletes alerts together with the decisions they own.
pub struct LifecycleManager {
    storage: Arc<dyn Storage>,
}

impl LifecycleManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Removes every alert, simulated ones included.
    pub async fn delete_all(&self) -> Result<u64, StorageError> {
        self.delete_matching(&AlertFilter::default()).await
    }

    pub async fn delete_matching(&self, filter: &AlertFilter) -> Result<u64, StorageError> {
        let deleted = self.storage.delete_alerts(filter, Utc::now()).await?;
        info!("deleted {} alerts", deleted);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_storage::MemoryStorage;
    use crate::storage::test_fixtures::new_alert;

    #[tokio::test]
    async fn test_delete_all_and_matching() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = LifecycleManager::new(storage.clone());
        let now = Utc::now();
        storage
            .insert_alerts(vec![
                new_alert("crowdsecurity/ssh-bf", "1.2.3.4", false, now),
                new_alert("crowdsecurity/ssh-bf", "1.2.3.5", true, now),
                new_alert("crowdsecurity/http-probing", "1.2.3.6", false, now),
            ])
            .await
            .unwrap();

        let filter = AlertFilter::from_query([("ip", "1.2.3.6")]).unwrap();
        assert_eq!(manager.delete_matching(&filter).await.unwrap(), 1);
        assert_eq!(manager.delete_all().await.unwrap(), 2);
        assert_eq!(manager.delete_all().await.unwrap(), 0);
    }
}
