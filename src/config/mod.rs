use crate::mock::RegistryConfig;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Settings for the control API process.
///
/// Every flag can also be supplied through the environment (and therefore a
/// `.env` file loaded by `dotenvy`). Flags win over environment values.
#[derive(Debug, Clone, Parser)]
#[command(name = "mi6")]
#[command(about = "Control console for throwaway HTTP mock agents", long_about = None)]
pub struct ServerConfig {
    /// Address the control API listens on
    #[arg(long, env = "MI6_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port the control API listens on
    #[arg(short, long, env = "PORT", default_value_t = 6969)]
    pub port: u16,

    /// SQLite database holding agents and their paths
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://agents.db")]
    pub database_url: String,

    /// Interface mock agents bind to
    #[arg(long = "agent-host", env = "AGENT_BIND_HOST", default_value = "0.0.0.0")]
    pub agent_bind_host: IpAddr,

    /// Seconds a stopping agent gets to drain before it is force-closed
    #[arg(
        long = "agent-shutdown-timeout",
        env = "AGENT_SHUTDOWN_TIMEOUT_SECS",
        default_value_t = 10
    )]
    pub agent_shutdown_timeout_secs: u64,

    /// Seconds the control API gets to drain on SIGINT/SIGTERM
    #[arg(
        long = "shutdown-timeout",
        env = "SHUTDOWN_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            bind_host: self.agent_bind_host,
            shutdown_timeout: Duration::from_secs(self.agent_shutdown_timeout_secs),
        }
    }
}
