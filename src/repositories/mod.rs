pub mod agent_repository;

pub use agent_repository::{
    AgentRepository, RepositoryError, RepositoryResult, SqliteAgentRepository,
};
