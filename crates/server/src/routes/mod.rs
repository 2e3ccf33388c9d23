//! HTTP route handlers for the bridge.
//!
//! # Route Structure
//!
//! ```text
//! GET  /healthz                - Health check
//! GET  /health                 - Health check (alias)
//!
//! # Shopify webhooks (HMAC-verified, ack-first)
//! POST /webhooks/draft-orders  - Draft order -> Cin7 Omni quote
//! POST /webhooks/orders        - Order -> Cin7 Omni sales order
//! POST /webhooks/core/orders   - Order -> Cin7 Core sale
//!
//! # Storefront quote API (CORS, blocking)
//! POST /api/quotes             - Quote request -> Shopify draft order + Omni quote
//! ```
//!
//! Webhook routes are mounted only for the configured back ends; the quote
//! API requires Omni.

pub mod quotes;
pub mod webhooks;

use axum::http::{HeaderValue, Method};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::BridgeConfig;
use crate::state::AppState;

/// Assemble the router for the configured back ends.
#[must_use]
pub fn router(state: &AppState) -> Router<AppState> {
    let mut router = Router::new()
        .route("/healthz", get(health))
        .route("/health", get(health));

    if state.has_omni() {
        router = router
            .route("/webhooks/draft-orders", post(webhooks::draft_order))
            .route("/webhooks/orders", post(webhooks::order))
            .route(
                "/api/quotes",
                post(quotes::create_quote).layer(cors_layer(state.config())),
            );
    }

    if state.has_core() {
        router = router.route("/webhooks/core/orders", post(webhooks::core_order));
    }

    router
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// CORS for the storefront-facing quote API.
fn cors_layer(config: &BridgeConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.cors_origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}
