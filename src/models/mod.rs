pub mod agent;

pub use agent::{
    Agent, AgentDetail, AgentPath, AgentStatus, AgentView, CreateAgentRequest, NewAgentPath,
};
