use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use super::types::AlertInput;
use crate::authorization::Machine;
use crate::error_handling::types::IngestError;
use crate::storage::storage_trait::Storage;

/// Turns submitted alert batches into stored alerts.
///
/// A batch is validated in full before anything is written, and then written in one storage
/// transaction: a single bad alert rejects the whole batch.
pub struct IngestionPipeline {
    storage: Arc<dyn Storage>,
}

impl IngestionPipeline {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Parses a JSON array body and ingests it.
    pub async fn create(&self, machine: &Machine, body: &[u8]) -> Result<Vec<String>, IngestError> {
        let inputs: Vec<AlertInput> = serde_json::from_slice(body).map_err(|e| {
            warn!("malformed alert batch from '{}': {}", machine.machine_id, e);
            IngestError::MalformedInput(e.to_string())
        })?;
        self.create_batch(machine, inputs).await
    }

    /// Returns the assigned identifiers as strings, in input order.
    pub async fn create_batch(
        &self,
        machine: &Machine,
        inputs: Vec<AlertInput>,
    ) -> Result<Vec<String>, IngestError> {
        if inputs.is_empty() {
            return Err(IngestError::EmptyBatch);
        }

        let now = Utc::now();
        let count = inputs.len();
        let alerts = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                input
                    .into_new_alert(&machine.machine_id, now)
                    .map_err(|e| {
                        warn!(
                            "rejected batch of {} alerts from '{}' at alert {}: {}",
                            count, machine.machine_id, index, e
                        );
                        if count > 1 {
                            locate(e, index)
                        } else {
                            e
                        }
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ids = self.storage.insert_alerts(alerts).await?;
        info!(
            "machine '{}' pushed {} alerts, ids {:?}",
            machine.machine_id,
            ids.len(),
            ids
        );
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }
}

/// Prefixes field paths with the position of the failing alert in its batch.
fn locate(err: IngestError, index: usize) -> IngestError {
    match err {
        IngestError::MissingRequiredField(fields) => IngestError::MissingRequiredField(
            fields
                .into_iter()
                .map(|field| format!("{}.{}", index, field))
                .collect(),
        ),
        IngestError::InvalidField(reason) => {
            IngestError::InvalidField(format!("{}.{}", index, reason))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::alert_filter::AlertFilter;
    use crate::storage::memory_storage::MemoryStorage;

    const ALERT: &str = r#"{
        "scenario": "crowdsecurity/ssh-bf",
        "scenario_hash": "hash",
        "scenario_version": "0.1",
        "simulated": false,
        "events_count": 6,
        "source": {"scope": "Ip", "value": "91.121.79.195"},
        "decisions": [{"duration": "4h", "scope": "Ip", "type": "ban", "value": "91.121.79.195"}]
    }"#;

    fn machine() -> Machine {
        Machine {
            machine_id: "sensor-1".into(),
        }
    }

    fn setup() -> (Arc<MemoryStorage>, IngestionPipeline) {
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = IngestionPipeline::new(storage.clone());
        (storage, pipeline)
    }

    #[tokio::test]
    async fn test_create_returns_ids() {
        let (_storage, pipeline) = setup();
        let body = format!("[{},{}]", ALERT, ALERT);
        let ids = pipeline.create(&machine(), body.as_bytes()).await.unwrap();
        assert_eq!(ids, vec!["1", "2"]);

        let body = format!("[{}]", ALERT);
        let ids = pipeline.create(&machine(), body.as_bytes()).await.unwrap();
        assert_eq!(ids, vec!["3"]);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (_storage, pipeline) = setup();
        assert!(matches!(
            pipeline.create(&machine(), b"[{").await,
            Err(IngestError::MalformedInput(_))
        ));
        assert!(matches!(
            pipeline.create(&machine(), ALERT.as_bytes()).await,
            Err(IngestError::MalformedInput(_))
        ));
        assert!(matches!(
            pipeline.create(&machine(), b"[]").await,
            Err(IngestError::EmptyBatch)
        ));
    }

    #[tokio::test]
    async fn test_invalid_alert_rejects_whole_batch() {
        let (storage, pipeline) = setup();
        let body = format!("[{},{{}}]", ALERT);
        let err = pipeline.create(&machine(), body.as_bytes()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failure list:\n1.scenario in body is required\n1.scenario_hash in body is required\n1.scenario_version in body is required\n1.simulated in body is required\n1.source in body is required"
        );

        let stored = storage
            .list_alerts(&AlertFilter::default(), Utc::now())
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_batch_errors_name_the_failing_alert() {
        let (_storage, pipeline) = setup();
        let bad_time = ALERT.replace(
            "\"events_count\"",
            "\"start_at\": \"yesterday\", \"events_count\"",
        );
        let body = format!("[{},{},{}]", ALERT, ALERT, bad_time);
        match pipeline.create(&machine(), body.as_bytes()).await {
            Err(IngestError::InvalidField(reason)) => {
                assert!(
                    reason.starts_with("2.start_at in body must be of type date-time"),
                    "{}",
                    reason
                )
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // a single alert keeps bare field paths
        let body = format!("[{}]", bad_time);
        match pipeline.create(&machine(), body.as_bytes()).await {
            Err(IngestError::InvalidField(reason)) => {
                assert!(reason.starts_with("start_at in body"), "{}", reason)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_owner_is_authenticated_machine() {
        let (storage, pipeline) = setup();
        let spoofed = ALERT.replace("\"simulated\"", "\"machine_id\": \"spoofed\", \"simulated\"");
        let body = format!("[{}]", spoofed);
        pipeline.create(&machine(), body.as_bytes()).await.unwrap();

        let alert = storage.get_alert(1, Utc::now()).await.unwrap().unwrap();
        assert_eq!(alert.machine_id, "sensor-1");
        assert_eq!(alert.decisions[0].origin, "sensor-1");
    }
}
