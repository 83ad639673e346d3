//! Thread-safe registry of running mock servers
//!
//! The registry owns the running-set: the map from agent id to the handle of
//! its live mock server. It is the only authority on whether an agent is
//! running in this process. The `status` column in storage is a mirror that
//! the registry updates in the background.
//!
//! All access to the running-set goes through one mutex whose critical
//! sections never perform I/O. Network binds, shutdown waits and repository
//! calls all happen with the lock released.

use crate::mock::instance::{MockServerInstance, RunningAgent};
use crate::mock::route_table::RouteTable;
use crate::mock::server::{serve_connections, ServeOutcome};
use crate::models::{Agent, AgentStatus};
use crate::repositories::{AgentRepository, RepositoryError};
use axum::Router;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Agent {0} is already running")]
    AlreadyRunning(i64),

    #[error("Agent {0} is not running")]
    NotRunning(i64),

    #[error("Agent not found: {0}")]
    NotFound(i64),

    #[error("Failed to load agent {agent_id}: {source}")]
    LoadFailed {
        agent_id: i64,
        source: RepositoryError,
    },

    #[error("Failed to bind port {port}: {source}")]
    BindFailed { port: String, source: io::Error },

    #[error("Agent {agent_id} did not stop within {timeout:?}")]
    ShutdownTimeout { agent_id: i64, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interface mock servers bind on
    pub bind_host: IpAddr,
    /// Bound on every graceful shutdown before the instance is forced closed
    pub shutdown_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Outcome of [`AgentRegistry::shutdown_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownSummary {
    /// Agents that stopped within the timeout
    pub stopped: Vec<i64>,
    /// Agents that had to be force-closed
    pub forced: Vec<i64>,
}

impl ShutdownSummary {
    pub fn total(&self) -> usize {
        self.stopped.len() + self.forced.len()
    }
}

enum Slot {
    /// A start is in flight and has not bound its listener yet
    Starting,
    Running(Arc<MockServerInstance>),
}

#[derive(Clone, Default)]
struct RunningSet(Arc<Mutex<HashMap<i64, Slot>>>);

impl RunningSet {
    fn lock(&self) -> MutexGuard<'_, HashMap<i64, Slot>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, agent_id: i64) -> Result<Reservation, RegistryError> {
        let mut running = self.lock();
        if running.contains_key(&agent_id) {
            return Err(RegistryError::AlreadyRunning(agent_id));
        }
        running.insert(agent_id, Slot::Starting);

        Ok(Reservation {
            running: self.clone(),
            agent_id,
            armed: true,
        })
    }

    fn instance(&self, agent_id: i64) -> Option<Arc<MockServerInstance>> {
        match self.lock().get(&agent_id) {
            Some(Slot::Running(instance)) => Some(Arc::clone(instance)),
            _ => None,
        }
    }

    fn instances(&self) -> Vec<Arc<MockServerInstance>> {
        let mut instances: Vec<_> = self
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Running(instance) => Some(Arc::clone(instance)),
                Slot::Starting => None,
            })
            .collect();
        instances.sort_by_key(|instance| instance.agent_id);
        instances
    }

    /// Removes the entry only if it still belongs to `instance`
    fn remove_instance(&self, instance: &Arc<MockServerInstance>) {
        let mut running = self.lock();
        let owned = matches!(
            running.get(&instance.agent_id),
            Some(Slot::Running(current)) if Arc::ptr_eq(current, instance)
        );
        if owned {
            running.remove(&instance.agent_id);
        }
    }
}

/// Start reservation for one agent id
///
/// Dropping an unfulfilled reservation frees the slot, so every failed or
/// cancelled start leaves the running-set as it found it.
struct Reservation {
    running: RunningSet,
    agent_id: i64,
    armed: bool,
}

impl Reservation {
    fn fulfil(mut self, instance: Arc<MockServerInstance>) {
        self.running
            .lock()
            .insert(self.agent_id, Slot::Running(instance));
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut running = self.running.lock();
        if matches!(running.get(&self.agent_id), Some(Slot::Starting)) {
            running.remove(&self.agent_id);
        }
    }
}

/// Supervisor of all mock servers started by this process
///
/// Construct one per process and share it behind an `Arc`. Every method is
/// safe to call concurrently.
///
/// # Examples
///
/// ```rust,no_run
/// use mi6::mock::AgentRegistry;
/// use mi6::repositories::SqliteAgentRepository;
/// use sqlx::SqlitePool;
/// use std::sync::Arc;
///
/// # async fn example(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
/// let registry = AgentRegistry::new(Arc::new(SqliteAgentRepository::new(pool)));
/// let running = registry.start_agent_server(1).await?;
/// println!("agent {} listening on {}", running.agent_id, running.address);
/// registry.stop_agent_server(1).await?;
/// # Ok(())
/// # }
/// ```
pub struct AgentRegistry {
    running: RunningSet,
    repository: Arc<dyn AgentRepository>,
    config: RegistryConfig,
}

pub type SharedRegistry = Arc<AgentRegistry>;

impl AgentRegistry {
    pub fn new(repository: Arc<dyn AgentRepository>) -> Self {
        Self::with_config(repository, RegistryConfig::default())
    }

    pub fn with_config(repository: Arc<dyn AgentRepository>, config: RegistryConfig) -> Self {
        Self {
            running: RunningSet::default(),
            repository,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Loads an agent, binds its port and starts serving its paths
    ///
    /// # Returns
    ///
    /// * `Ok(RunningAgent)` - The agent is bound and its serve loop spawned
    /// * `Err(RegistryError::AlreadyRunning)` - Another start holds this id
    /// * `Err(RegistryError::NotFound)` - No agent with this id
    /// * `Err(RegistryError::LoadFailed)` - The repository could not be read
    /// * `Err(RegistryError::BindFailed)` - The port is invalid or taken
    pub async fn start_agent_server(&self, agent_id: i64) -> Result<RunningAgent, RegistryError> {
        let reservation = self.running.reserve(agent_id)?;

        let agent = self
            .repository
            .get_agent_by_id(agent_id)
            .await
            .map_err(|source| RegistryError::LoadFailed { agent_id, source })?
            .ok_or(RegistryError::NotFound(agent_id))?;

        let paths = self
            .repository
            .get_agent_paths(agent_id)
            .await
            .map_err(|source| RegistryError::LoadFailed { agent_id, source })?;

        let table = RouteTable::from_paths(agent_id, &paths);
        if table.is_empty() {
            tracing::warn!(agent_id, "agent has no paths configured, every request will 404");
        }

        let listener = self.bind(&agent).await?;
        let instance = self.launch(reservation, &agent, listener, table.into_router())?;

        Ok(instance.snapshot())
    }

    /// Gracefully stops a running agent
    ///
    /// Returns once the serve loop has ended and the agent is no longer in
    /// the running-set. The `stopped` status is persisted afterwards in the
    /// background.
    pub async fn stop_agent_server(&self, agent_id: i64) -> Result<(), RegistryError> {
        let instance = self
            .running
            .instance(agent_id)
            .ok_or(RegistryError::NotRunning(agent_id))?;

        tracing::info!(agent_id, "stopping agent");
        instance.shutdown(self.config.shutdown_timeout).await
    }

    /// Stops every running agent concurrently
    ///
    /// Intended for process exit. A start that races with this call may
    /// leave one more agent running after it returns.
    pub async fn shutdown_all(&self) -> ShutdownSummary {
        let instances = self.running.instances();

        if instances.is_empty() {
            tracing::info!("No agents were running to shut down.");
            return ShutdownSummary::default();
        }

        tracing::info!("Shutting down {} active agents...", instances.len());

        let timeout = self.config.shutdown_timeout;
        let results = join_all(instances.iter().map(|instance| async move {
            (instance.agent_id, instance.shutdown(timeout).await)
        }))
        .await;

        let mut summary = ShutdownSummary::default();
        for (agent_id, result) in results {
            match result {
                Ok(()) => summary.stopped.push(agent_id),
                Err(e) => {
                    tracing::warn!("Agent {} forced shutdown: {}", agent_id, e);
                    summary.forced.push(agent_id);
                }
            }
        }

        tracing::info!(
            stopped = summary.stopped.len(),
            forced = summary.forced.len(),
            "All agents stopped."
        );
        summary
    }

    pub fn is_running(&self, agent_id: i64) -> bool {
        self.running.instance(agent_id).is_some()
    }

    /// Snapshots of every running agent, ordered by id
    pub fn running_agents(&self) -> Vec<RunningAgent> {
        self.running
            .instances()
            .iter()
            .map(|instance| instance.snapshot())
            .collect()
    }

    /// Persists `stopped` for every agent left `active` by a previous run
    ///
    /// Call once at startup, before any agent is started.
    pub async fn reconcile_statuses(&self) -> Result<u64, RepositoryError> {
        let reset = self.repository.reset_agent_statuses().await?;
        if reset > 0 {
            tracing::info!("Reset status of {} agents left active by a previous run", reset);
        }
        Ok(reset)
    }

    async fn bind(&self, agent: &Agent) -> Result<TcpListener, RegistryError> {
        let bind_failed = |source| RegistryError::BindFailed {
            port: agent.port.clone(),
            source,
        };

        let port: u16 = agent.port.trim().parse().map_err(|e| {
            bind_failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid port {:?}: {}", agent.port, e),
            ))
        })?;

        TcpListener::bind(SocketAddr::new(self.config.bind_host, port))
            .await
            .map_err(bind_failed)
    }

    /// Registers the instance and spawns its supervising task
    fn launch(
        &self,
        reservation: Reservation,
        agent: &Agent,
        listener: TcpListener,
        router: Router,
    ) -> Result<Arc<MockServerInstance>, RegistryError> {
        let local_addr = listener
            .local_addr()
            .map_err(|source| RegistryError::BindFailed {
                port: agent.port.clone(),
                source,
            })?;

        let instance = Arc::new(MockServerInstance::new(
            agent.id,
            agent.name.clone(),
            agent.port.clone(),
            local_addr,
        ));

        // Visible to other callers before the serve loop starts
        reservation.fulfil(Arc::clone(&instance));

        tokio::spawn(supervise(
            Arc::clone(&instance),
            listener,
            router,
            self.running.clone(),
            Arc::clone(&self.repository),
        ));

        Ok(instance)
    }
}

/// Runs one instance's serve loop and cleans up after it, exactly once
async fn supervise(
    instance: Arc<MockServerInstance>,
    listener: TcpListener,
    router: Router,
    running: RunningSet,
    repository: Arc<dyn AgentRepository>,
) {
    let agent_id = instance.agent_id;
    tracing::info!(
        "Agent {} ({}) starting on {}",
        agent_id,
        instance.agent_name,
        instance.local_addr
    );

    let mark_active = tokio::spawn(persist_status(
        Arc::clone(&repository),
        agent_id,
        AgentStatus::Active,
    ));

    let outcome = serve_connections(
        agent_id,
        listener,
        router,
        instance.shutdown_token(),
        instance.force_token(),
    )
    .await;
    match outcome {
        ServeOutcome::Drained => tracing::debug!(agent_id, "serve loop ended"),
        ServeOutcome::Forced => tracing::warn!(agent_id, "serve loop force-closed"),
    }

    running.remove_instance(&instance);
    instance.stopped_token().cancel();

    // Keep the persisted order active -> stopped
    if let Err(e) = mark_active.await {
        tracing::warn!(agent_id, "status task failed: {}", e);
    }
    persist_status(repository, agent_id, AgentStatus::Stopped).await;

    tracing::info!("Agent {} stopped.", agent_id);
}

async fn persist_status(repository: Arc<dyn AgentRepository>, agent_id: i64, status: AgentStatus) {
    if let Err(e) = repository.update_agent_status(agent_id, status).await {
        tracing::warn!(
            agent_id,
            status = %status,
            "Failed to persist agent status: {}",
            e
        );
    }
}
