//! Attendance Guard server binary

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendance_guard::{
    config::Config,
    create_router,
    db,
    face::build_chain,
    store::{AttendanceStore, MemoryStore, PgStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "attendance_guard=debug,tower_http=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Attendance Guard starting ({})...", config.environment);

    if config.uses_dev_secret() {
        if config.is_production() {
            anyhow::bail!("JWT_SECRET must be set in production");
        }
        tracing::warn!("JWT_SECRET not set, using the development secret");
    }

    let (store, store_kind): (Arc<dyn AttendanceStore>, &'static str) = match &config.database_url {
        Some(url) => {
            tracing::info!("Database: {}", url.split('@').last().unwrap_or("***"));

            let pool = db::create_pool(url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;

            let store: Arc<dyn AttendanceStore> = Arc::new(PgStore::new(pool));
            (store, "postgres")
        }
        None => {
            if config.is_production() {
                anyhow::bail!("DATABASE_URL must be set in production");
            }
            tracing::warn!("DATABASE_URL not set, records are kept in memory only");
            let store: Arc<dyn AttendanceStore> = Arc::new(MemoryStore::new());
            (store, "memory")
        }
    };

    let chain = build_chain(&config.face);
    if chain.is_empty() {
        tracing::warn!("No face providers configured, face verification will fail closed");
    } else {
        tracing::info!("Face providers: {}", chain.provider_names().join(" -> "));
    }

    // Build application state
    let state = AppState::new(config.clone(), store, store_kind, chain);

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
