use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::store::InMemoryIssueStore;
use intake::{IngestionPipeline, IntakeConfig};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// The ingestion pipeline (shared across requests)
    pub pipeline: Arc<IngestionPipeline>,

    /// Issue store backing both the dedup feed and the accept-path writes
    pub store: Arc<InMemoryIssueStore>,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let intake_config = match config.pipeline_config.as_deref() {
            Some(path) => IntakeConfig::from_file(path)?,
            None => IntakeConfig::default(),
        };

        let store = Arc::new(InMemoryIssueStore::new());
        let pipeline = Arc::new(IngestionPipeline::new(intake_config, store.clone())?);

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            store,
        })
    }
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
