//! AudioGuide - shopping assistant API for the Hifiisti store
//!
//! Loads a product catalog from Shopify, grounds a Gemini chat session on it
//! and streams replies to the web front end.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod config;
mod conversation;
mod core;
mod providers;
mod render;
mod routes;
#[cfg(test)]
mod testing;

use catalog::ShopifyGateway;
use config::Config;
use core::ShopAssistant;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Mutex<ShopAssistant>>,
}

impl AppState {
    pub fn new(assistant: ShopAssistant) -> Self {
        Self {
            assistant: Arc::new(Mutex::new(assistant)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audioguide=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let catalog = Arc::new(ShopifyGateway::new(
        config.catalog_access(),
        &config.settings.catalog,
    ));
    let service = providers::from_config(&config)?;
    match &service {
        Some(service) => tracing::info!(
            "🎧 Using {} ({})",
            service.name(),
            config.settings.assistant.model
        ),
        None => tracing::warn!("No assistant API key set; chat will be unavailable"),
    }

    let mut assistant = ShopAssistant::new(config, catalog, service);
    let status = assistant.initialize().await;
    tracing::info!("Initialization finished: {}", status.as_str());

    let state = AppState::new(assistant);

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🔥 AudioGuide API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
