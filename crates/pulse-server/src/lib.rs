//! Pulse server library logic.

pub mod api;
pub mod config;
pub mod pipeline;
pub mod relay;

use api::QueryGateway;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    Extension, Router,
};
use relay::Relay;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay driven by webhook notifications.
    pub relay: Relay,
    /// Handler for query (`GET`) requests.
    pub gateway: Arc<dyn QueryGateway>,
}

/// Builds the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .fallback(api::dispatch_handler)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(api::ALLOWED_METHODS),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
