use crate::error::AppError;
use crate::models::Agent;
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

/// The agent named by the `{id}` path segment, loaded before the handler runs.
///
/// Handlers that take a `ResolvedAgent` never see a request for an id that is
/// malformed (400) or unknown (404); both are rejected here.
#[derive(Debug, Clone)]
pub struct ResolvedAgent(pub Agent);

impl FromRequestParts<AppState> for ResolvedAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(raw_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Validation("Invalid agent ID".to_string()))?;

        let id = raw_id
            .parse::<i64>()
            .map_err(|_| AppError::Validation(format!("Invalid agent ID: {}", raw_id)))?;

        let agent = state.agent_service.get_agent(id).await?;
        Ok(ResolvedAgent(agent))
    }
}
