use crate::models::{Agent, AgentPath, AgentStatus, NewAgentPath};
use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Agent not found")]
    NotFound,
    #[error("Agent already exists: {0}")]
    AlreadyExists(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait AgentRepository: Send + Sync {
    async fn get_agent_by_id(&self, id: i64) -> RepositoryResult<Option<Agent>>;
    async fn list_agents(&self) -> RepositoryResult<Vec<Agent>>;
    /// Inserts the agent row and all of its paths in one transaction.
    async fn create_agent(
        &self,
        name: &str,
        port: &str,
        paths: &[NewAgentPath],
    ) -> RepositoryResult<i64>;
    async fn update_agent_status(&self, id: i64, status: AgentStatus) -> RepositoryResult<()>;
    async fn get_agent_paths(&self, agent_id: i64) -> RepositoryResult<Vec<AgentPath>>;
    /// Marks every agent `stopped`, returning how many rows changed.
    async fn reset_agent_statuses(&self) -> RepositoryResult<u64>;
}

pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_write_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::AlreadyExists(db_err.message().to_string())
        }
        _ => RepositoryError::Database(e),
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn get_agent_by_id(&self, id: i64) -> RepositoryResult<Option<Agent>> {
        let agent = sqlx::query_as::<_, Agent>(
            "SELECT id, name, port, status, created_at FROM agents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn list_agents(&self) -> RepositoryResult<Vec<Agent>> {
        let agents = sqlx::query_as::<_, Agent>(
            "SELECT id, name, port, status, created_at FROM agents ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(agents)
    }

    async fn create_agent(
        &self,
        name: &str,
        port: &str,
        paths: &[NewAgentPath],
    ) -> RepositoryResult<i64> {
        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;

        let agent_id = sqlx::query("INSERT INTO agents (name, port, status) VALUES (?, ?, ?)")
            .bind(name)
            .bind(port)
            .bind(AgentStatus::Stopped)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?
            .last_insert_rowid();

        for path in paths {
            sqlx::query("INSERT INTO agent_paths (agent_id, path, response) VALUES (?, ?, ?)")
                .bind(agent_id)
                .bind(&path.path)
                .bind(&path.response)
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
        }

        tx.commit().await?;

        Ok(agent_id)
    }

    async fn update_agent_status(&self, id: i64, status: AgentStatus) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE agents SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn get_agent_paths(&self, agent_id: i64) -> RepositoryResult<Vec<AgentPath>> {
        let paths = sqlx::query_as::<_, AgentPath>(
            "SELECT id, agent_id, path, response FROM agent_paths WHERE agent_id = ? ORDER BY id",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(paths)
    }

    async fn reset_agent_statuses(&self) -> RepositoryResult<u64> {
        let result = sqlx::query("UPDATE agents SET status = ? WHERE status <> ?")
            .bind(AgentStatus::Stopped)
            .bind(AgentStatus::Stopped)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_pool;

    #[tokio::test]
    async fn test_agent_crud() {
        let pool = create_test_pool().await;
        let repo = SqliteAgentRepository::new(pool);

        // Create
        let paths = vec![
            NewAgentPath::new("/health", "ok"),
            NewAgentPath::new("/v1/users", "[]"),
        ];
        let agent_id = repo.create_agent("svc1", "9001", &paths).await.unwrap();
        assert!(agent_id > 0);

        // Read
        let agent = repo.get_agent_by_id(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.name, "svc1");
        assert_eq!(agent.port, "9001");
        assert_eq!(agent.status, AgentStatus::Stopped);

        let stored = repo.get_agent_paths(agent_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].path, "/health");
        assert_eq!(stored[0].response, "ok");
        assert_eq!(stored[1].path, "/v1/users");

        // Update
        repo.update_agent_status(agent_id, AgentStatus::Active)
            .await
            .unwrap();
        let agent = repo.get_agent_by_id(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Active);

        // List
        let agents = repo.list_agents().await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, agent_id);
    }

    #[tokio::test]
    async fn test_get_missing_agent_returns_none() {
        let pool = create_test_pool().await;
        let repo = SqliteAgentRepository::new(pool);

        assert!(repo.get_agent_by_id(42).await.unwrap().is_none());
        assert!(matches!(
            repo.update_agent_status(42, AgentStatus::Active).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
