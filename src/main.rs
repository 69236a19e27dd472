mod api;
mod bootstrap;
mod config;
mod error;
mod middleware;
mod notifications;
mod score_feed;
mod server;
mod settlement;
mod store;
#[cfg(test)]
mod testing;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::middleware::{create_cors_layer, RateLimitLayer};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,survivor_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    dotenv::dotenv().ok();

    // Initialize tracing
    init_tracing();

    info!("🚀 Starting Survivor Pool Settlement Backend");

    let config = config::Config::from_env().map_err(error::AppError::from)?;

    let state = bootstrap::initialize_app_state(&config).await?;

    // Create HTTP server
    let app = server::create_app(
        state,
        RateLimitLayer::per_minute(config.rate_limit_per_minute),
        create_cors_layer(&config.cors_allowed_origins),
    )
    .await;

    // Run the Server
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
