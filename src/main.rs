use std::sync::Arc;
use tracing::{error, info};
use voicechat::{api, chat::ChatService, config::Config, db::Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,voicechat=debug".into()),
        )
        .with_target(false)
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    if config.gemini_api_key.is_none() {
        info!("No GEMINI_API_KEY set; waiting for a key via /api/validate-key");
    }

    let db = Database::new(&config)?;
    db.execute_init()?;

    let bind_addr = config.bind_addr.clone();
    let service = Arc::new(ChatService::new(config, db)?);
    let app = api::router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("voicechat running on http://{}", bind_addr);
    if let Err(why) = axum::serve(listener, app).await {
        error!("Server error: {:?}", why);
    }

    Ok(())
}
