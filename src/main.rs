//! kpi-dashboard-server - REST backend for the KPI dashboard.
//!
//! Configuration is read from the environment (and `.env`); see
//! `kpi_dashboard::config` for the full list of variables.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kpi_dashboard::api::{build_router, AppState};
use kpi_dashboard::config::AppConfig;
use kpi_dashboard::database::DatabaseManager;
use kpi_dashboard::hierarchy::Hierarchy;
use kpi_dashboard::kpi::KpiCatalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kpi_dashboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let manager = DatabaseManager::open(&config.database)
        .await
        .context("failed to open database pools")?;

    let hierarchy = Hierarchy::of_kind(config.hierarchy);
    info!(hierarchy = %hierarchy.kind(), "Geographic hierarchy configured");

    let state = AppState::new(
        hierarchy,
        KpiCatalog::standard(),
        manager.primary(),
        manager.kpi(),
    );
    let app = build_router(state);

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    info!("kpi-dashboard-server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received");
}
