use anyhow::Context;
use chat_relay::api::{build_router, AppState};
use chat_relay::context::TokenCounter;
use chat_relay::registry::ModelRegistry;
use chat_relay::relay::{Relay, RequestDispatcher};
use chat_relay::Settings;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings);

    let mut counter = TokenCounter::new().context("failed to initialize tokenizer")?;
    for family in settings.families.iter().cloned() {
        counter
            .register_family(family)
            .context("invalid model family in settings")?;
    }
    let counter = Arc::new(counter);

    let registry = ModelRegistry::load(&settings.models.dir, Arc::clone(&counter))
        .with_context(|| format!("failed to load models from {}", settings.models.dir.display()))?;
    info!("Serving models: {:?}", registry.list_models());

    let dispatcher = RequestDispatcher::new(settings.dispatcher_config())?;
    let relay = Arc::new(Relay::new(Arc::new(registry), counter, dispatcher));
    let app = build_router(AppState { relay }, settings.server.max_body_bytes);

    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("chat-relay listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chat-relay stopped");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    if settings.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
