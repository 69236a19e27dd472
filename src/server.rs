use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::handler::{get_week_status, health_check, list_members, poll_live_scores, settle_league, AppState},
    middleware::{rate_limit_middleware, RateLimitLayer},
};

pub async fn create_app(state: AppState, rate_limit: RateLimitLayer, cors: CorsLayer) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    // Settlement and polling hit the score feed and write; reads stay unthrottled.
    let mutating = Router::new()
        .route("/leagues/:league_id/settle", post(settle_league))
        .route("/seasons/:season/live-scores/poll", post(poll_live_scores))
        .route_layer(from_fn_with_state(rate_limit, rate_limit_middleware));

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/leagues/:league_id/weeks/:week/status", get(get_week_status))
                .route("/leagues/:league_id/members", get(list_members))
                .merge(mutating),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
