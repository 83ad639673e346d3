//! Mock server instance management
//!
//! Each [`MockServerInstance`] is the handle of one bound, serving mock
//! server. The serve loop itself runs in a task owned by the registry; the
//! handle only carries the signals used to stop it and to observe that it
//! has stopped.

use crate::mock::registry::RegistryError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Point-in-time description of a running agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningAgent {
    pub agent_id: i64,
    pub name: String,
    pub port: String,
    pub address: SocketAddr,
    pub started_at: DateTime<Utc>,
}

/// Handle to a running mock server
///
/// # Fields
///
/// * `agent_id` - Database ID of the agent
/// * `agent_name` - Agent name, for logs and views
/// * `port` - Configured port as stored on the agent
/// * `local_addr` - Address the listener is actually bound to
/// * `shutdown` - Asks the serve loop to stop gracefully
/// * `force` - Aborts every open connection and ends the serve loop
/// * `stopped` - Cancelled once the serve loop is gone and the running-set
///   entry has been removed
pub struct MockServerInstance {
    pub agent_id: i64,
    pub agent_name: String,
    pub port: String,
    pub local_addr: SocketAddr,
    pub started_at: DateTime<Utc>,
    shutdown: CancellationToken,
    force: CancellationToken,
    stopped: CancellationToken,
}

impl MockServerInstance {
    pub(crate) fn new(
        agent_id: i64,
        agent_name: String,
        port: String,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            agent_id,
            agent_name,
            port,
            local_addr,
            started_at: Utc::now(),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            stopped: CancellationToken::new(),
        }
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn force_token(&self) -> CancellationToken {
        self.force.clone()
    }

    pub(crate) fn stopped_token(&self) -> CancellationToken {
        self.stopped.clone()
    }

    /// Gracefully stops the instance, forcing it closed after `timeout`
    ///
    /// Returns once the serve loop has ended. On timeout every open
    /// connection is aborted and [`RegistryError::ShutdownTimeout`] is
    /// returned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RegistryError> {
        self.shutdown.cancel();

        if tokio::time::timeout(timeout, self.stopped.cancelled())
            .await
            .is_ok()
        {
            return Ok(());
        }

        tracing::warn!(
            agent_id = self.agent_id,
            timeout_ms = timeout.as_millis() as u64,
            "agent did not stop in time, forcing close"
        );
        self.force.cancel();
        self.stopped.cancelled().await;

        Err(RegistryError::ShutdownTimeout {
            agent_id: self.agent_id,
            timeout,
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Waits until the serve loop has ended
    pub async fn stopped(&self) {
        self.stopped.cancelled().await
    }

    pub fn snapshot(&self) -> RunningAgent {
        RunningAgent {
            agent_id: self.agent_id,
            name: self.agent_name.clone(),
            port: self.port.clone(),
            address: self.local_addr,
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> MockServerInstance {
        MockServerInstance::new(
            3,
            "svc".to_string(),
            "9003".to_string(),
            "127.0.0.1:9003".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_shutdown_returns_once_stopped() {
        let instance = instance();
        let shutdown = instance.shutdown_token();
        let stopped = instance.stopped_token();

        // Stand-in for the serve loop: stop as soon as asked
        tokio::spawn(async move {
            shutdown.cancelled().await;
            stopped.cancel();
        });

        instance
            .shutdown(Duration::from_secs(5))
            .await
            .expect("graceful shutdown should succeed");
        assert!(instance.is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_forces_close_after_timeout() {
        let instance = instance();
        let force = instance.force_token();
        let stopped = instance.stopped_token();

        // Ignores the graceful signal and only yields to the force signal
        tokio::spawn(async move {
            force.cancelled().await;
            stopped.cancel();
        });

        let result = instance.shutdown(Duration::from_millis(50)).await;
        match result {
            Err(RegistryError::ShutdownTimeout { agent_id, .. }) => assert_eq!(agent_id, 3),
            other => panic!("Expected ShutdownTimeout, got: {:?}", other),
        }
        assert!(instance.is_stopped());
    }

    #[test]
    fn test_snapshot_copies_identity() {
        let snapshot = instance().snapshot();
        assert_eq!(snapshot.agent_id, 3);
        assert_eq!(snapshot.name, "svc");
        assert_eq!(snapshot.port, "9003");
        assert_eq!(snapshot.address.port(), 9003);
    }
}
