use hourz_server::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired blacklist rows, sessions and rate-limit buckets are cleaned up.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// main
///
/// The asynchronous entry point: Configuration, Logging, Database, Storage, background
/// maintenance, and the HTTP Server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise verbose for this crate, info for the HTTP stack.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hourz_server=debug,tower_http=info,axum=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON lines for log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("{} starting in {:?} mode", config.project_name, config.env);

    // 4. Database Initialization (Postgres + PostGIS) and schema migrations
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .migrate()
        .await
        .expect("FATAL: Database migrations failed.");
    let repo = Arc::new(postgres) as RepositoryState;

    // 5. Storage Initialization (S3/MinIO)
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    )
    .await;

    // LOCAL-ONLY: Ensure the MinIO bucket exists for the Dockerized setup.
    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }
    let storage = Arc::new(s3_client) as StorageState;

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let docs_enabled = config.docs_enabled();
    let app_state = AppState::new(repo, storage, config);

    // 7. Background maintenance: token blacklist, stale sessions, refresh limiter buckets.
    spawn_purge_task(app_state.clone());

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Could not bind {bind_addr}: {e}"));

    tracing::info!("Listening on {bind_addr}");
    if docs_enabled {
        tracing::info!("API Documentation (Swagger UI) available at /docs");
    }

    // ConnectInfo feeds the client IP used by sessions and the refresh rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("FATAL: HTTP server terminated unexpectedly.");
}

fn spawn_purge_task(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match state.repo.purge_expired_tokens().await {
                Ok(removed) => tracing::debug!(removed, "expired tokens purged"),
                Err(e) => tracing::warn!(error = %e, "token purge failed"),
            }
            state.refresh_limiter.prune();
        }
    });
}
