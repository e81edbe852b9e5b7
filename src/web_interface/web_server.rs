use std::net::SocketAddr;
use std::sync::Arc;

use log::info;

use super::routes::alert_routes;
use crate::alert_management::{AlertQuery, IngestionPipeline, LifecycleManager};
use crate::authorization::{CredentialValidator, OriginPolicy};
use crate::error_handling::types::WebError;
use crate::storage::storage_trait::Storage;

/// Shared state handed to every request handler.
pub struct ApiContext {
    pub credentials: Arc<dyn CredentialValidator>,
    pub origin_policy: OriginPolicy,
    pub ingestion: IngestionPipeline,
    pub query: AlertQuery,
    pub lifecycle: LifecycleManager,
    pub max_body_bytes: u64,
}

impl ApiContext {
    pub fn new(
        storage: Arc<dyn Storage>,
        credentials: Arc<dyn CredentialValidator>,
        origin_policy: OriginPolicy,
        max_body_bytes: u64,
    ) -> Self {
        Self {
            credentials,
            origin_policy,
            ingestion: IngestionPipeline::new(storage.clone()),
            query: AlertQuery::new(storage.clone()),
            lifecycle: LifecycleManager::new(storage),
            max_body_bytes,
        }
    }
}

/// HTTP API server
pub struct WebServer {
    ctx: Arc<ApiContext>,
}

impl WebServer {
    pub fn new(ctx: Arc<ApiContext>) -> Self {
        Self { ctx }
    }

    /// Serve the API on `listen_address` until Ctrl-C.
    pub async fn start(&self, listen_address: &str) -> Result<(), WebError> {
        let addr: SocketAddr = listen_address.parse().map_err(|_| {
            WebError::BindFailed(format!("invalid listen address '{}'", listen_address))
        })?;

        let routes = alert_routes(self.ctx.clone());
        info!("decisiond API listening on {}", addr);

        tokio::select! {
            _ = warp::serve(routes).run(addr) => {
                Err(WebError::ServerFailed("server stopped unexpectedly".into()))
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| WebError::ServerFailed(e.to_string()))?;
                info!("shutdown requested, stopping API");
                Ok(())
            }
        }
    }
}
