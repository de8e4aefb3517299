//! Newsdesk - admin panel backend for a multilingual news site

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::{
    api::{self, AppState},
    config::Config,
    db,
    services::{create_mailer, IdentityEvent},
    storage::create_storage,
};

/// How often expired sessions and sign-in codes are purged
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting newsdesk...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let storage = create_storage(&config.storage);
    let mailer = create_mailer(&config.mail)?;
    let state = AppState::new(&config, pool, storage, mailer);

    // Seed the configured admin
    match config.auth.admin_email.as_deref() {
        Some(email) => {
            let admin = state.identity_service.ensure_admin(email).await?;
            tracing::info!(email = %admin.email, "Admin identity ready");
        }
        None => tracing::warn!("No auth.admin_email configured; nobody can invite staff"),
    }

    // Purge expired sessions, codes and sign-in attempt counters
    {
        let identity_service = state.identity_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match identity_service.cleanup_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Expired sessions and codes purged"),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
                identity_service.limiter().cleanup().await;
            }
        });
    }

    // Retry removals that failed during requests
    state
        .orphan_sweeper
        .clone()
        .spawn(Duration::from_secs(config.storage.sweep_interval_seconds));

    // Audit sign-ins and sign-outs
    {
        let mut events = state.identity_service.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(IdentityEvent::SignedIn(identity)) => {
                        tracing::info!(identity_id = identity.id, email = %identity.email, "Identity signed in");
                    }
                    Ok(IdentityEvent::SignedOut { identity_id }) => {
                        tracing::info!(identity_id, "Identity signed out");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Identity event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
