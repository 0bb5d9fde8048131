//! Application state management
//!
//! Contains shared state accessible across all handlers.
//! DATABASE-ONLY: proposal state is backed by PostgreSQL; the in-memory
//! repository exists for tests, never for the running server.

use crate::directory::{OrgDirectory, PostgresDirectory};
use crate::engine::config::{ConfigStore, EngineConfig};
use crate::engine::service::EscalationService;
use crate::notify::{LoggingDispatcher, NotificationDispatcher};
use crate::repository::{PostgresRepository, Repository};
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Database connection pool (required)
    pub db_pool: Pool,

    /// Escalation engine orchestrator
    pub service: EscalationService,

    /// Versioned engine configuration (thresholds, weight tables)
    pub engine_config: Arc<ConfigStore>,
}

impl AppState {
    /// Create new application state over a database pool
    pub fn new(pool: Pool, engine_config: EngineConfig) -> Self {
        let repository: Arc<dyn Repository> = Arc::new(PostgresRepository::new(pool.clone()));
        let directory: Arc<dyn OrgDirectory> = Arc::new(PostgresDirectory::new(pool.clone()));
        let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(LoggingDispatcher::new());
        let config_store = Arc::new(ConfigStore::new(engine_config));

        let service = EscalationService::new(
            repository,
            directory,
            dispatcher,
            config_store.clone(),
        );

        Self {
            db_pool: pool,
            service,
            engine_config: config_store,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
