pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod mock;
pub mod models;
pub mod repositories;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use mock::{AgentRegistry, RegistryConfig, SharedRegistry};
use repositories::{AgentRepository, SqliteAgentRepository};
use services::AgentService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub agent_service: Arc<AgentService>,
    pub agent_repository: Arc<dyn AgentRepository>,
    pub agent_registry: SharedRegistry,
    pub pool: sqlx::SqlitePool,
}

impl AppState {
    /// Wires the SQLite repository, service and registry around one pool.
    pub fn new(pool: sqlx::SqlitePool, registry_config: RegistryConfig) -> Self {
        let agent_repository: Arc<dyn AgentRepository> =
            Arc::new(SqliteAgentRepository::new(pool.clone()));
        let agent_service = Arc::new(AgentService::new(agent_repository.clone()));
        let agent_registry = Arc::new(AgentRegistry::with_config(
            agent_repository.clone(),
            registry_config,
        ));

        Self {
            agent_service,
            agent_repository,
            agent_registry,
            pool,
        }
    }
}
