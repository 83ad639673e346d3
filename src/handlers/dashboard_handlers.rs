use crate::error::Result;
use crate::handlers::agent_handlers::AgentRow;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};

#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    rows: Vec<AgentRow>,
    running_count: usize,
}

#[derive(Template, WebTemplate)]
#[template(path = "agents/table.html")]
struct AgentTableTemplate {
    rows: Vec<AgentRow>,
}

async fn load_rows(state: &AppState) -> Result<Vec<AgentRow>> {
    let views = state
        .agent_service
        .list_agent_views(&state.agent_registry)
        .await?;
    Ok(views.into_iter().map(AgentRow::from).collect())
}

/// GET / - Agent dashboard
pub async fn dashboard_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let rows = load_rows(&state).await?;
    let running_count = rows.iter().filter(|r| r.running).count();

    let template = DashboardTemplate {
        rows,
        running_count,
    };

    Ok(template.into_response())
}

/// GET /ui/agents - Table fragment polled by the dashboard
pub async fn agent_table_handler(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let template = AgentTableTemplate {
        rows: load_rows(&state).await?,
    };

    Ok(template.into_response())
}
