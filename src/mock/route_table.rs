//! Static path table served by a mock server instance
//!
//! Paths use the same syntax as axum routes, matched by `matchit`. Literal
//! paths win over patterns. `{name}` matches exactly one non-empty segment
//! and `{*rest}` matches the remainder of the path. A chi-style `/*` is not a
//! wildcard here: `/files/*` only matches that exact string.

use crate::models::AgentPath;
use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Compiled path → response table for one agent
///
/// Registering a path that is already present replaces the earlier response.
/// Storage enforces one row per `(agent_id, path)`, so a duplicate here points
/// at a bug upstream and is logged as a warning rather than rejected.
#[derive(Clone, Default)]
pub struct RouteTable {
    router: matchit::Router<usize>,
    responses: Vec<Arc<str>>,
    index: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths(agent_id: i64, paths: &[AgentPath]) -> Self {
        let mut table = Self::new();
        for path in paths {
            match table.insert(&path.path, &path.response) {
                Ok(false) => {}
                Ok(true) => tracing::warn!(
                    agent_id,
                    path = %path.path,
                    "duplicate mock path, later response overrides the earlier one"
                ),
                Err(e) => tracing::warn!(
                    agent_id,
                    path = %path.path,
                    "skipping mock path: {}",
                    e
                ),
            }
        }
        table
    }

    /// Adds a route, returning `Ok(true)` when it replaced an existing one.
    ///
    /// Fails when the pattern is malformed or conflicts with a registered
    /// pattern (for example `/users/{id}` next to `/users/{name}`).
    pub fn insert(&mut self, path: &str, response: &str) -> Result<bool, matchit::InsertError> {
        if let Some(&slot) = self.index.get(path) {
            self.responses[slot] = Arc::from(response);
            return Ok(true);
        }

        let slot = self.responses.len();
        self.router.insert(path, slot)?;
        self.responses.push(Arc::from(response));
        self.index.insert(path.to_string(), slot);
        Ok(false)
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<str>> {
        self.router
            .at(path)
            .ok()
            .map(|matched| Arc::clone(&self.responses[*matched.value]))
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Builds the axum router that serves this table
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(serve_mock_path)
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }
}

async fn serve_mock_path(
    State(table): State<Arc<RouteTable>>,
    method: Method,
    uri: Uri,
) -> Response {
    match table.lookup(uri.path()) {
        Some(body) if method == Method::GET || method == Method::HEAD => {
            (StatusCode::OK, body.to_string()).into_response()
        }
        Some(_) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn agent_path(id: i64, path: &str, response: &str) -> AgentPath {
        AgentPath {
            id,
            agent_id: 1,
            path: path.to_string(),
            response: response.to_string(),
        }
    }

    #[test]
    fn test_literal_lookup() {
        let table = RouteTable::from_paths(
            1,
            &[agent_path(1, "/health", "ok"), agent_path(2, "/ready", "yes")],
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("/health").as_deref(), Some("ok"));
        assert_eq!(table.lookup("/ready").as_deref(), Some("yes"));
        assert!(table.lookup("/missing").is_none());
        assert!(table.lookup("/health/extra").is_none());
    }

    #[test]
    fn test_duplicate_path_later_registration_wins() {
        let table = RouteTable::from_paths(
            1,
            &[
                agent_path(1, "/health", "first"),
                agent_path(2, "/other", "x"),
                agent_path(3, "/health", "second"),
            ],
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("/health").as_deref(), Some("second"));
    }

    #[test]
    fn test_insert_reports_replacement() {
        let mut table = RouteTable::new();
        assert!(!table.insert("/a", "1").unwrap());
        assert!(table.insert("/a", "2").unwrap());
        assert_eq!(table.lookup("/a").as_deref(), Some("2"));
    }

    #[test]
    fn test_param_and_catch_all_patterns() {
        let table = RouteTable::from_paths(
            1,
            &[
                agent_path(1, "/users/{id}", "user"),
                agent_path(2, "/files/{*rest}", "file"),
                agent_path(3, "/users/me", "me"),
            ],
        );

        assert_eq!(table.lookup("/users/42").as_deref(), Some("user"));
        assert_eq!(table.lookup("/users/me").as_deref(), Some("me"));
        assert!(table.lookup("/users/").is_none());
        assert!(table.lookup("/users/42/posts").is_none());
        assert_eq!(table.lookup("/files/a/b/c.txt").as_deref(), Some("file"));
    }

    #[test]
    fn test_conflicting_pattern_is_skipped() {
        let table = RouteTable::from_paths(
            1,
            &[
                agent_path(1, "/users/{id}", "by id"),
                agent_path(2, "/users/{name}", "by name"),
                agent_path(3, "/a/{*rest}/b", "bad catch-all"),
                agent_path(4, "/health", "ok"),
            ],
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("/users/7").as_deref(), Some("by id"));
        assert_eq!(table.lookup("/health").as_deref(), Some("ok"));
    }

    #[test]
    fn test_star_suffix_is_literal() {
        let table = RouteTable::from_paths(1, &[agent_path(1, "/files/*", "star")]);

        assert_eq!(table.lookup("/files/*").as_deref(), Some("star"));
        assert!(table.lookup("/files/report.txt").is_none());
    }

    #[tokio::test]
    async fn test_router_serves_literal_body() {
        let router = RouteTable::from_paths(1, &[agent_path(1, "/health", "ok")]).into_router();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
