//! Inbound HTTP surface.
//!
//! Every path is served by one method dispatcher: `GET` goes to the query
//! gateway, `POST` carries webhook notifications, `OPTIONS` answers CORS
//! preflight, anything else is `405`.

use crate::AppState;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::Extension,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use pulse_types::Notification;
use std::sync::Arc;

/// Methods advertised to cross-origin callers.
pub const ALLOWED_METHODS: &str = "OPTIONS, GET";

/// Answers `GET` requests. Query handling lives outside the relay.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    async fn query(&self, uri: &Uri, headers: &HeaderMap) -> Response;
}

/// Gateway used when no query handler is installed: `200` with an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyGateway;

#[async_trait]
impl QueryGateway for EmptyGateway {
    async fn query(&self, _uri: &Uri, _headers: &HeaderMap) -> Response {
        StatusCode::OK.into_response()
    }
}

/// Handler for every method on every path.
pub async fn dispatch_handler(
    Extension(state): Extension<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match method {
        Method::GET => {
            tracing::debug!(path = uri.path(), "query request received");
            state.gateway.query(&uri, &headers).await
        }
        Method::POST => notification(&state, &body),
        Method::OPTIONS => preflight(),
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::CONTENT_TYPE, "text/plain")],
        )
            .into_response(),
    }
}

/// Accepts a webhook notification and relays it in the background.
///
/// The delivery is always acknowledged with `200`, whatever the relay
/// outcome; a body that is not a notification is logged and dropped.
fn notification(state: &AppState, body: &[u8]) -> Response {
    match serde_json::from_slice::<Notification>(body) {
        Ok(notification) => {
            tracing::debug!(
                kind = ?notification.kind,
                notification_target = %notification.target,
                "webhook notification received"
            );
            let relay = state.relay.clone();
            tokio::spawn(async move { relay.process(notification).await });
        }
        Err(e) => {
            tracing::warn!("malformed webhook notification dropped: {}", e);
        }
    }
    StatusCode::OK.into_response()
}

fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (header::CONTENT_LENGTH, "0"),
        ],
    )
        .into_response()
}
