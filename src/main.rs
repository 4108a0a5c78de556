//! Campuslib Server - University library management
//!
//! REST API for the catalog, loans, equipment, attendance and QR tickets.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use campuslib_server::{
    api,
    config::{AppConfig, LoggingConfig},
    qr::{QrRenderer, RemoteQrRenderer},
    repository::Repository,
    services::{redis::RedisService, Services},
    AppState,
};

/// Console output, plus a daily rolling JSON file when a directory is configured
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("campuslib_server={},tower_http=debug", config.level).into());

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if config.format == "json" {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    });

    let guard = config.directory.as_ref().map(|directory| {
        let appender = tracing_appender::rolling::daily(directory, "campuslib-server.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
        guard
    });

    tracing_subscriber::registry().with(layers).with(filter).init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Campuslib Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let redis_service = RedisService::new(&config.redis.url)?;
    redis_service.ping().await.context("Failed to connect to Redis")?;

    tracing::info!("Connected to Redis");

    let qr: Arc<dyn QrRenderer> = Arc::new(RemoteQrRenderer::from_config(&config.tickets)?);

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config, redis_service, qr);

    if let Some(admin) = services.auth.bootstrap_admin().await? {
        tracing::warn!(login = %admin.login, "Created initial administrator account");
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
