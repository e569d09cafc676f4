use anyhow::{Context, Result};
use lerndeutsch::{config::Config, db::Database, server};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lerndeutsch=info".parse()?),
        )
        .init();

    info!("Starting lerndeutsch");

    let config = Config::from_env()?;

    if config.deepl_api_key.is_none() {
        warn!("DEEPL_API_KEY not set, /api/translate will fail");
    }
    if config.groq_api_key.is_none() {
        warn!("GROQ_API_KEY not set, /api/analyze will fail");
    }

    // The feedback table is created again on first save if this fails
    let db = Database::connect_lazy(&config.database_url)?;
    if let Err(e) = db.ensure_schema().await {
        warn!("Database not ready at startup: {:#}", e);
    } else if let Ok(count) = db.feedback_count().await {
        info!("{} feedback entries stored", count);
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    let state = server::AppState::new(config, db)?;
    server::serve(listener, state).await
}
