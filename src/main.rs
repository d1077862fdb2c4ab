use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use roster_api::config;
use roster_api::database::postgres::PgDocumentStore;
use roster_api::handlers::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, PORT, etc.
    let _ = dotenvy::dotenv();

    let config = config::config();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster_api=info,tower_http=info".into()),
        )
        .init();

    info!("starting roster-api in {:?} mode", config.environment);

    // The store handle is constructed here and injected into everything
    // that needs it; no module-level connection state exists.
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout))
        .connect_lazy(&database_url()?)?;

    let store = PgDocumentStore::new(pool.clone());

    // Connections are lazy, so the store may be unreachable at startup.
    // Bootstrap in the background rather than gating the listener on it;
    // until it lands, the health endpoint reports the outage and requests
    // surface store errors.
    tokio::spawn({
        let store = store.clone();
        async move {
            if let Err(e) = store.ensure_schema().await {
                warn!("schema bootstrap failed, continuing degraded: {e}");
            }
        }
    });

    let state = AppState::new(Arc::new(store));
    let router = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("ROSTER_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(config.api.default_port);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("roster-api listening on http://{bind_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("store connections closed");
    Ok(())
}

fn database_url() -> anyhow::Result<String> {
    match std::env::var("DATABASE_URL") {
        Ok(raw) => {
            url::Url::parse(&raw).map_err(|e| anyhow::anyhow!("invalid DATABASE_URL: {e}"))?;
            Ok(raw)
        }
        Err(_) => {
            let fallback = "postgres://postgres@localhost:5432/roster_api".to_string();
            warn!("DATABASE_URL not set, falling back to {fallback}");
            Ok(fallback)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
