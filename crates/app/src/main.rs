//! Application entry point.

use app::{App, AppError, Config};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn run<S>(store: S, config: &Config) -> Result<(), AppError>
where
    S: EventStore + Clone + 'static,
{
    let app = App::start(store, config).await;

    match app.run_sample_scenario().await {
        Ok(stock) => tracing::info!(stock, "sample scenario completed"),
        Err(error) => tracing::error!(%error, "sample scenario failed"),
    }

    shutdown_signal().await;
    app.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus exporter
    if let Some(addr) = config.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "metrics exporter listening");
    }

    // 3. Pick the event store and run
    match &config.database_url {
        Some(url) => {
            let store = PostgresEventStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL event store");
            run(store, &config).await?;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory event store");
            run(InMemoryEventStore::new(), &config).await?;
        }
    }

    tracing::info!("shut down gracefully");
    Ok(())
}
