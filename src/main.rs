use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use dropin_sync::config::Config;
use dropin_sync::db::SqliteQueueStore;
use dropin_sync::operations::HandlerRegistry;
use dropin_sync::operations::remote::RemoteHandler;
use dropin_sync::probe::ConnectivityProbe;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting dropin-sync");

    let store = SqliteQueueStore::connect(&config.database_url)
        .await
        .expect("Failed to open queue database");

    tracing::info!("Queue database ready");

    let client = RemoteHandler::client(REMOTE_TIMEOUT).expect("Failed to build HTTP client");
    let handlers = HandlerRegistry::remote_defaults(
        client.clone(),
        &config.remote.base_url,
        config.remote.token.clone(),
    );
    tracing::info!(
        "Remote handlers registered for: {}",
        handlers.operation_types().join(", ")
    );
    let probe = ConnectivityProbe::new(client, &config.remote.base_url, config.probe_interval);

    let addr = SocketAddr::new(config.host, config.port);
    let state = dropin_sync::build_state(Arc::new(store), handlers, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = dropin_sync::spawn_background(&state, Some(probe), shutdown_rx);

    let app = dropin_sync::build_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in background {
        let _ = handle.await;
    }

    tracing::info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
