use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Persisted reflection of whether a mock server is bound for an agent.
///
/// This is a best-effort mirror written by the registry. The in-memory
/// running-set is what decides whether an agent is actually running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AgentStatus {
    Stopped,
    Active,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Stopped => "stopped",
            AgentStatus::Active => "active",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(AgentStatus::Stopped),
            "active" => Ok(AgentStatus::Active),
            other => Err(format!("Unknown agent status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub port: String,
    pub status: AgentStatus,
    pub created_at: i64,
}

impl Agent {
    pub fn created_at_display(&self) -> String {
        chrono::DateTime::from_timestamp(self.created_at, 0)
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AgentPath {
    pub id: i64,
    pub agent_id: i64,
    pub path: String,
    pub response: String,
}

/// Path definition supplied when an agent is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgentPath {
    pub path: String,
    pub response: String,
}

impl NewAgentPath {
    pub fn new(path: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            response: response.into(),
        }
    }
}

// Service request models
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub port: String,
    #[serde(default)]
    pub paths: Vec<NewAgentPath>,
}

/// Agent as shown by the control API, with the registry's live view attached
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub agent: Agent,
    pub running: bool,
}

impl AgentView {
    pub fn new(agent: Agent, running: bool) -> Self {
        Self { agent, running }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentDetail {
    #[serde(flatten)]
    pub agent: Agent,
    pub running: bool,
    pub paths: Vec<AgentPath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("active".parse::<AgentStatus>(), Ok(AgentStatus::Active));
        assert_eq!("stopped".parse::<AgentStatus>(), Ok(AgentStatus::Stopped));
        assert!("running".parse::<AgentStatus>().is_err());
        assert_eq!(AgentStatus::Active.to_string(), "active");
    }

    #[test]
    fn test_agent_view_serializes_flat() {
        let agent = Agent {
            id: 7,
            name: "svc1".to_string(),
            port: "9001".to_string(),
            status: AgentStatus::Stopped,
            created_at: 0,
        };

        let json = serde_json::to_value(AgentView::new(agent, true)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["running"], true);
    }

    #[test]
    fn test_create_request_paths_default_to_empty() {
        let request: CreateAgentRequest =
            serde_json::from_str(r#"{"name":"svc1","port":"9001"}"#).unwrap();
        assert!(request.paths.is_empty());
    }
}
