//! Accept loop for one mock server
//!
//! Every accepted connection runs in a task owned by a [`JoinSet`], so a
//! forced close can abort in-flight requests instead of only dropping the
//! listener.

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How the serve loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServeOutcome {
    /// Every open connection finished after `shutdown`
    Drained,
    /// `force` fired and the remaining connections were aborted
    Forced,
}

/// Serves `router` on `listener` until `shutdown`, then drains.
///
/// The listener is closed as soon as `shutdown` fires. Open connections are
/// asked to finish their current request; if `force` fires first they are
/// aborted and their sockets closed.
pub(crate) async fn serve_connections(
    agent_id: i64,
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    force: CancellationToken,
) -> ServeOutcome {
    let builder = Builder::new(TokioExecutor::new());
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    tracing::trace!(agent_id, %remote, "connection accepted");
                    let builder = builder.clone();
                    let service = TowerToHyperService::new(router.clone());
                    let shutdown = shutdown.clone();

                    connections.spawn(async move {
                        let conn = builder.serve_connection(TokioIo::new(stream), service);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            result = conn.as_mut() => result,
                            _ = shutdown.cancelled() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = result {
                            tracing::debug!(agent_id, %remote, "connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    // Usually fd exhaustion, retrying immediately would spin
                    tracing::warn!(agent_id, "accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);

    loop {
        tokio::select! {
            next = connections.join_next() => {
                if next.is_none() {
                    return ServeOutcome::Drained;
                }
            }
            _ = force.cancelled() => {
                tracing::warn!(
                    agent_id,
                    open = connections.len(),
                    "aborting open connections"
                );
                connections.shutdown().await;
                return ServeOutcome::Forced;
            }
        }
    }
}
