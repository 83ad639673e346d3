use crate::{handlers, middleware::add_security_headers, AppState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Control API and dashboard routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Dashboard
        .route("/", get(handlers::dashboard_handler))
        .route("/ui/agents", get(handlers::agent_table_handler))
        // Agent routes
        .route(
            "/agents",
            get(handlers::list_agents_handler).post(handlers::create_agent_handler),
        )
        .route("/agents/running", get(handlers::running_agents_handler))
        .route("/agents/{id}", get(handlers::get_agent_handler))
        .route("/agents/{id}/start", post(handlers::start_agent_handler))
        .route("/agents/{id}/stop", post(handlers::stop_agent_handler))
        // Static files
        .nest_service("/static", ServeDir::new("static"))
        // Layers
        .layer(middleware::from_fn(add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
