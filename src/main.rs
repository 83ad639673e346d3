use clap::Parser;
use mi6::{app, config::ServerConfig, db, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mi6=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();

    // Database connection
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    db::run_migrations(&pool).await?;

    let state = AppState::new(pool, config.registry_config());
    let registry = state.agent_registry.clone();

    // Nothing is running yet, so any "active" row is left over from a crash
    if let Err(e) = registry.reconcile_statuses().await {
        tracing::warn!("Failed to reconcile agent statuses: {}", e);
    }

    let app = app::build_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MI6 control API running on http://{}", addr);

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    let exit: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutting down MI6 control API...");
            shutdown.cancel();

            match tokio::time::timeout(config.shutdown_timeout(), &mut server).await {
                Ok(Ok(Ok(()))) => tracing::info!("Control API stopped"),
                Ok(Ok(Err(e))) => tracing::error!("Control API error during shutdown: {}", e),
                Ok(Err(e)) => tracing::error!("Control API task failed: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "Control API did not drain within {:?}, closing remaining connections",
                        config.shutdown_timeout()
                    );
                    server.abort();
                }
            }
            Ok(())
        }
        result = &mut server => {
            tracing::error!("Control API exited unexpectedly: {:?}", result);
            unexpected_exit(result)
        }
    };

    let summary = registry.shutdown_all().await;
    tracing::info!(
        stopped = summary.stopped.len(),
        forced = summary.forced.len(),
        "All mock agents shut down"
    );

    exit
}

/// Any exit of the control API that was not asked for is a failure.
fn unexpected_exit(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(Ok(())) => Err("control API stopped without a shutdown signal".into()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_exit_is_an_error() {
        assert!(unexpected_exit(Ok(Ok(()))).is_err());

        let err = unexpected_exit(Ok(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "listener closed",
        ))))
        .unwrap_err();
        assert!(err.to_string().contains("listener closed"));
    }

    #[tokio::test]
    async fn test_cancelled_server_task_is_an_error() {
        let handle = tokio::spawn(std::future::pending::<std::io::Result<()>>());
        handle.abort();
        assert!(unexpected_exit(handle.await).is_err());
    }
}
