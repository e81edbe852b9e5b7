//! Alert management
//!
//! Application services sitting between the HTTP layer and storage:
//! - `ingestion`: validation and atomic persistence of alert batches
//! - `alert_query`: filtered listing and single alert lookup
//! - `lifecycle`: deletion with cascading decision removal
//! - `types`: inbound payloads and their validation

pub mod alert_query;
pub mod ingestion;
pub mod lifecycle;
pub mod types;

pub use alert_query::AlertQuery;
pub use ingestion::IngestionPipeline;
pub use lifecycle::LifecycleManager;
