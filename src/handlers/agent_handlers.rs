use crate::error::Result;
use crate::middleware::ResolvedAgent;
use crate::mock::RunningAgent;
use crate::models::{AgentDetail, AgentStatus, AgentView, CreateAgentRequest};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

// Flattened view of an agent for the dashboard templates
pub struct AgentRow {
    pub id: i64,
    pub name: String,
    pub port: String,
    pub status: String,
    pub created_at: String,
    pub running: bool,
}

impl From<AgentView> for AgentRow {
    fn from(view: AgentView) -> Self {
        AgentRow {
            created_at: view.agent.created_at_display(),
            status: view.agent.status.to_string(),
            id: view.agent.id,
            name: view.agent.name,
            port: view.agent.port,
            running: view.running,
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "agents/row.html")]
struct AgentRowTemplate {
    row: AgentRow,
}

/// Requests issued by htmx carry `HX-Request: true` and want an HTML fragment back.
fn wants_fragment(headers: &HeaderMap) -> bool {
    headers
        .get("HX-Request")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Renders the agent's row from the registry's live state.
///
/// The persisted status trails start/stop because it is written in the
/// background, so the displayed status follows `is_running` like the button.
async fn render_row(state: &AppState, agent_id: i64) -> Result<Response> {
    let mut agent = state.agent_service.get_agent(agent_id).await?;
    let running = state.agent_registry.is_running(agent_id);
    agent.status = if running {
        AgentStatus::Active
    } else {
        AgentStatus::Stopped
    };

    let template = AgentRowTemplate {
        row: AgentView::new(agent, running).into(),
    };
    Ok(template.into_response())
}

/// GET /agents
pub async fn list_agents_handler(State(state): State<AppState>) -> Result<Json<Vec<AgentView>>> {
    let agents = state
        .agent_service
        .list_agent_views(&state.agent_registry)
        .await?;
    Ok(Json(agents))
}

/// POST /agents
pub async fn create_agent_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<Response> {
    let id = state.agent_service.create_agent(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "status": "created",
            "message": format!("Agent {} created successfully", id),
        })),
    )
        .into_response())
}

/// GET /agents/running
pub async fn running_agents_handler(State(state): State<AppState>) -> Json<Vec<RunningAgent>> {
    Json(state.agent_registry.running_agents())
}

/// GET /agents/{id}
pub async fn get_agent_handler(
    State(state): State<AppState>,
    ResolvedAgent(agent): ResolvedAgent,
) -> Result<Json<AgentDetail>> {
    let detail = state
        .agent_service
        .agent_detail(agent, &state.agent_registry)
        .await?;
    Ok(Json(detail))
}

/// POST /agents/{id}/start
pub async fn start_agent_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ResolvedAgent(agent): ResolvedAgent,
) -> Result<Response> {
    let running = state.agent_registry.start_agent_server(agent.id).await?;

    if wants_fragment(&headers) {
        return render_row(&state, agent.id).await;
    }

    Ok(Json(json!({
        "message": format!("Agent {} started on port {}", agent.id, agent.port),
        "agent": running,
    }))
    .into_response())
}

/// POST /agents/{id}/stop
pub async fn stop_agent_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ResolvedAgent(agent): ResolvedAgent,
) -> Result<Response> {
    state.agent_registry.stop_agent_server(agent.id).await?;

    if wants_fragment(&headers) {
        return render_row(&state, agent.id).await;
    }

    Ok(Json(json!({
        "message": format!("Agent {} stopped", agent.id),
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wants_fragment_reads_htmx_header() {
        let mut headers = HeaderMap::new();
        assert!(!wants_fragment(&headers));

        headers.insert("HX-Request", "true".parse().unwrap());
        assert!(wants_fragment(&headers));

        headers.insert("HX-Request", "false".parse().unwrap());
        assert!(!wants_fragment(&headers));
    }
}
