//! GradeBench - Application Entry Point
//!
//! This is the main entry point for the GradeBench server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gradebench::{config::CONFIG, handlers, harness::CleanupQueue, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| CONFIG.server.rust_log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting GradeBench server...");

    // Prepare the workspace root and reclaim anything a previous run left behind
    let root = &CONFIG.storage.workspace_root;
    tokio::fs::create_dir_all(root).await?;
    tracing::info!("Workspace root: {}", root.display());

    let cleanup = Arc::new(CleanupQueue::new());
    cleanup.enqueue_leftovers(root);
    let sweeper = cleanup.spawn_sweeper(CONFIG.cleanup.sweep_interval());

    tracing::info!(
        "Toolchain: {} (edition {}, opt-level {})",
        CONFIG.toolchain.compiler.display(),
        CONFIG.toolchain.edition,
        CONFIG.toolchain.opt_level
    );

    // Create application state and router
    let state = AppState::new(CONFIG.clone(), Arc::clone(&cleanup));
    let app = handlers::app(state);

    // Start the server
    let addr = SocketAddr::new(CONFIG.server.host.parse()?, CONFIG.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final reclamation pass before exit
    sweeper.abort();
    let stats = cleanup.sweep().await;
    tracing::info!(
        "Shutdown sweep: removed={}, retained={}",
        stats.removed,
        stats.retained
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
