//! Mock server lifecycle management
//!
//! Each agent stored in the database can be brought up as a throwaway HTTP
//! server on its own port, serving its configured paths with fixed bodies.
//!
//! # Architecture
//!
//! - [`AgentRegistry`] - Supervisor of the running-set; start, stop, shutdown
//! - [`MockServerInstance`] - Handle to one bound, serving mock server
//! - [`RouteTable`] - Path → response table served by an instance
//! - `server` - Accept loop whose connections can be aborted on forced close
//!
//! # Example
//!
//! ```rust,no_run
//! use mi6::mock::{AgentRegistry, RegistryConfig};
//! use mi6::repositories::SqliteAgentRepository;
//! use sqlx::SqlitePool;
//! use std::sync::Arc;
//!
//! # async fn example(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! let repository = Arc::new(SqliteAgentRepository::new(pool));
//! let registry = Arc::new(AgentRegistry::with_config(repository, RegistryConfig::default()));
//!
//! registry.start_agent_server(1).await?;
//! assert!(registry.is_running(1));
//!
//! // On process exit
//! registry.shutdown_all().await;
//! # Ok(())
//! # }
//! ```

pub mod instance;
pub mod registry;
pub mod route_table;
mod server;

pub use instance::{MockServerInstance, RunningAgent};
pub use registry::{
    AgentRegistry, RegistryConfig, RegistryError, SharedRegistry, ShutdownSummary,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use route_table::RouteTable;
