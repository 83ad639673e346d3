use crate::error::{AppError, Result};
use crate::models::{Agent, AgentDetail, AgentPath, AgentView, CreateAgentRequest};
use crate::mock::AgentRegistry;
use crate::repositories::AgentRepository;
use std::collections::HashSet;
use std::sync::Arc;

pub struct AgentService {
    repository: Arc<dyn AgentRepository>,
}

impl AgentService {
    pub fn new(repository: Arc<dyn AgentRepository>) -> Self {
        Self { repository }
    }

    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<i64> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }

        if name.len() > 100 {
            return Err(AppError::Validation(
                "Name must be 100 characters or less".to_string(),
            ));
        }

        let port = request.port.trim();
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => {
                return Err(AppError::Validation(
                    "Port must be a number between 1 and 65535".to_string(),
                ))
            }
        }

        let mut seen = HashSet::new();
        for path in &request.paths {
            if !path.path.starts_with('/') {
                return Err(AppError::Validation(format!(
                    "Path '{}' must start with '/'",
                    path.path
                )));
            }
            if !seen.insert(path.path.as_str()) {
                return Err(AppError::Validation(format!(
                    "Path '{}' is defined more than once",
                    path.path
                )));
            }
        }

        let id = self
            .repository
            .create_agent(name, port, &request.paths)
            .await?;

        tracing::info!(agent_id = id, name, port, paths = request.paths.len(), "agent created");
        Ok(id)
    }

    pub async fn get_agent(&self, id: i64) -> Result<Agent> {
        self.repository
            .get_agent_by_id(id)
            .await?
            .ok_or(AppError::AgentNotFound(id))
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.repository.list_agents().await?)
    }

    /// Stored agents with the registry's live view of which are running
    pub async fn list_agent_views(&self, registry: &AgentRegistry) -> Result<Vec<AgentView>> {
        let agents = self.list_agents().await?;

        Ok(agents
            .into_iter()
            .map(|agent| {
                let running = registry.is_running(agent.id);
                AgentView::new(agent, running)
            })
            .collect())
    }

    pub async fn agent_paths(&self, agent_id: i64) -> Result<Vec<AgentPath>> {
        Ok(self.repository.get_agent_paths(agent_id).await?)
    }

    pub async fn agent_detail(&self, agent: Agent, registry: &AgentRegistry) -> Result<AgentDetail> {
        let paths = self.agent_paths(agent.id).await?;
        let running = registry.is_running(agent.id);

        Ok(AgentDetail {
            agent,
            running,
            paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAgentPath;
    use crate::repositories::agent_repository::MockAgentRepository;
    use mockall::predicate::*;

    fn request(name: &str, port: &str, paths: &[(&str, &str)]) -> CreateAgentRequest {
        CreateAgentRequest {
            name: name.to_string(),
            port: port.to_string(),
            paths: paths
                .iter()
                .map(|(path, response)| NewAgentPath::new(*path, *response))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_agent_success_trims_input() {
        let mut mock_repo = MockAgentRepository::new();
        mock_repo
            .expect_create_agent()
            .with(eq("svc1"), eq("9001"), always())
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(1) }));

        let service = AgentService::new(Arc::new(mock_repo));

        let id = service
            .create_agent(request("  svc1 ", " 9001", &[("/health", "ok")]))
            .await
            .expect("Expected Ok result");
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_create_agent_rejects_bad_port() {
        let service = AgentService::new(Arc::new(MockAgentRepository::new()));

        for port in ["", "abc", "0", "70000", "-1"] {
            let result = service.create_agent(request("svc1", port, &[])).await;
            assert!(
                matches!(result, Err(AppError::Validation(_))),
                "port {:?} should be rejected",
                port
            );
        }
    }

    #[tokio::test]
    async fn test_create_agent_rejects_empty_name() {
        let service = AgentService::new(Arc::new(MockAgentRepository::new()));

        let result = service.create_agent(request("   ", "9001", &[])).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_agent_rejects_relative_and_duplicate_paths() {
        let service = AgentService::new(Arc::new(MockAgentRepository::new()));

        let result = service
            .create_agent(request("svc1", "9001", &[("health", "ok")]))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = service
            .create_agent(request("svc1", "9001", &[("/a", "1"), ("/a", "2")]))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_missing_agent_is_not_found() {
        let mut mock_repo = MockAgentRepository::new();
        mock_repo
            .expect_get_agent_by_id()
            .with(eq(12))
            .returning(|_| Box::pin(async { Ok(None) }));

        let service = AgentService::new(Arc::new(mock_repo));
        assert!(matches!(
            service.get_agent(12).await,
            Err(AppError::AgentNotFound(12))
        ));
    }
}
