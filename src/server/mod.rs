pub mod handlers;
pub mod state;
pub mod url_validation;

use crate::config::Config;
use crate::error::Result;
use axum::{
    Router,
    routing::{any, get},
};
use state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Build the application router with all routes and middleware
pub fn build_router(config: Config) -> Result<Router> {
    let state = AppState::new(config)?;

    // Preflights are answered here; proxied responses get their CORS
    // headers from the interceptor.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Ok(Router::new()
        .route("/", any(handlers::proxy::serve_proxy))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::serve_metrics))
        .layer(cors)
        .with_state(state))
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);

    let app = build_router(config)?;

    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("Relay listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
