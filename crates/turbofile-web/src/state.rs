use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use turbofile_core::dto::ActiveTransferInfo;
use turbofile_core::ServerEvent;

use crate::backend::{Backend, Backends};
use crate::client_paths::ClientPathStore;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::listing::ListingCache;

/// A transfer the engine is currently running.
pub struct ActiveTransfer {
    pub info: ActiveTransferInfo,
    pub cancel: CancellationToken,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub backends: Arc<Backends>,
    pub listings: Arc<ListingCache>,
    pub transfers: Arc<DashMap<String, ActiveTransfer>>,
    /// Cancellation handles of running scripts by `run_id`.
    pub runs: Arc<DashMap<String, CancellationToken>>,
    /// `run_output` events, fanned out to every WebSocket connection.
    pub run_events: broadcast::Sender<ServerEvent>,
    pub client_paths: Arc<ClientPathStore>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let backends = Backends::from_config(&config);
        let listings = ListingCache::new(config.browse.cache_ttl());
        let client_paths = match &config.client_paths {
            Some(file) => ClientPathStore::load(file.clone()),
            None => ClientPathStore::in_memory(),
        };
        let (run_events, _) = broadcast::channel(256);
        Self {
            config: Arc::new(config),
            backends: Arc::new(backends),
            listings: Arc::new(listings),
            transfers: Arc::new(DashMap::new()),
            runs: Arc::new(DashMap::new()),
            run_events,
            client_paths: Arc::new(client_paths),
        }
    }

    pub fn backend(&self, server: &str) -> Result<Arc<dyn Backend>, AppError> {
        self.backends
            .get(server)
            .ok_or_else(|| AppError::NotFound(format!("unknown server: {server}")))
    }
}
