pub mod test_helpers {
    use crate::models::{AgentStatus, NewAgentPath};
    use crate::repositories::{AgentRepository, SqliteAgentRepository};
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Create a temporary file-based SQLite database for testing
    /// Useful when several connections must see the same data
    pub async fn create_test_db_file() -> Result<(SqlitePool, NamedTempFile), sqlx::Error> {
        let temp_file = NamedTempFile::new().map_err(sqlx::Error::Io)?;
        let db_path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| sqlx::Error::Configuration("Invalid database path".into()))?;
        let database_url = format!("sqlite://{}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok((pool, temp_file))
    }

    /// Create a test agent with the given `(path, response)` pairs
    pub async fn create_test_agent(
        pool: &SqlitePool,
        name: &str,
        port: &str,
        paths: &[(&str, &str)],
    ) -> Result<i64, crate::repositories::RepositoryError> {
        let paths: Vec<NewAgentPath> = paths
            .iter()
            .map(|(path, response)| NewAgentPath::new(*path, *response))
            .collect();

        SqliteAgentRepository::new(pool.clone())
            .create_agent(name, port, &paths)
            .await
    }

    /// Read the persisted status of an agent
    pub async fn agent_status(pool: &SqlitePool, agent_id: i64) -> Option<AgentStatus> {
        SqliteAgentRepository::new(pool.clone())
            .get_agent_by_id(agent_id)
            .await
            .ok()
            .flatten()
            .map(|agent| agent.status)
    }

    /// Poll until the persisted status matches, since status writes are asynchronous
    pub async fn wait_for_status(
        pool: &SqlitePool,
        agent_id: i64,
        expected: AgentStatus,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if agent_status(pool, agent_id).await == Some(expected) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Reserve a free localhost port by binding to port 0 and releasing it
    pub fn free_port() -> std::io::Result<u16> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        Ok(listener.local_addr()?.port())
    }
}

// Re-export commonly used test functions at module level for convenience
// Note: This is test-only code. Panic on error is acceptable in tests.
#[cfg(test)]
pub async fn create_test_pool() -> sqlx::SqlitePool {
    match test_helpers::create_test_db().await {
        Ok(pool) => pool,
        Err(e) => panic!("Failed to create test pool: {}", e),
    }
}

#[cfg(test)]
pub use test_helpers::{create_test_agent, free_port};
