//! Notification relay: re-fetches changed resources and forwards them onto
//! the event bus.
//!
//! Per "Add" notification the relay performs at most one credential refresh,
//! at most two outbound fetches and at most one bus publish, in that order.

use crate::config::RelayConfig;
use pulse_auth::{AuthError, TokenCache};
use pulse_bus::EventBus;
use pulse_types::{path_segments, Credential, Notification};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::sync::Arc;
use thiserror::Error;

/// Why a notification was not relayed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed notification target: {0}")]
    MalformedTarget(String),

    #[error("authorization refresh failed: {0}")]
    Authorization(#[from] AuthError),

    #[error("fetch of {uri} failed: {reason}")]
    Fetch { uri: String, reason: String },
}

/// What the relay did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Not an "Add" notification.
    Ignored,
    /// No credential was cached for the derived target.
    NoCredential { uri: String },
    /// The fetched content went out on the bus.
    Published {
        topic: String,
        attempts: u8,
        refreshed: bool,
        subscribers: usize,
    },
}

/// The log a notification belongs to: `target` with a trailing numeric
/// segment removed, e.g. `https://ex/alice/acc-x/17/` → `https://ex/alice/acc-x/`.
pub fn log_key(target: &str) -> String {
    if let Some(trimmed) = target.strip_suffix('/') {
        if let Some(slash) = trimmed.rfind('/') {
            let segment = &trimmed[slash + 1..];
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                return target[..=slash].to_string();
            }
        }
    }
    target.to_string()
}

/// Maps a URI to its derived resource: the last path segment moves under a
/// `derived` container of the remaining path.
///
/// `https://ex/alice/acc-x/` → `https://ex/alice/derived/acc-x`.
pub fn derive_target(uri: &str) -> Result<String, RelayError> {
    let malformed = || RelayError::MalformedTarget(uri.to_string());
    let mut url = url::Url::parse(uri).map_err(|_| malformed())?;
    let mut segments = path_segments(uri).ok_or_else(malformed)?;
    let last = segments.pop().ok_or_else(malformed)?;

    let path = if segments.is_empty() {
        format!("/derived/{last}")
    } else {
        format!("/{}/derived/{last}", segments.join("/"))
    };
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Splits a notification target into the log topic and the derived resource
/// to fetch.
///
/// The derived resource comes from the log key. A key with no path segment of
/// its own (`https://ex/17/`) falls back to the raw target.
pub fn resolve(target: &str) -> Result<(String, String), RelayError> {
    let topic = log_key(target);
    let uri = derive_target(&topic).or_else(|_| derive_target(target))?;
    Ok((topic, uri))
}

/// Relays "Add" notifications.
#[derive(Clone)]
pub struct Relay {
    cache: Arc<TokenCache>,
    bus: EventBus,
    client: reqwest::Client,
    success_statuses: Vec<u16>,
    accept: String,
}

impl Relay {
    pub fn new(
        cache: Arc<TokenCache>,
        bus: EventBus,
        client: reqwest::Client,
        config: &RelayConfig,
    ) -> Self {
        Self {
            cache,
            bus,
            client,
            success_statuses: config.success_statuses.clone(),
            accept: config.accept.clone(),
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Runs one notification through the relay.
    pub async fn handle(&self, notification: &Notification) -> Result<RelayOutcome, RelayError> {
        if !notification.is_add() {
            return Ok(RelayOutcome::Ignored);
        }

        let (topic, uri) = resolve(&notification.target)?;

        let Some(credential) = self.cache.get(&uri) else {
            return Ok(RelayOutcome::NoCredential { uri });
        };

        let (body, attempts, refreshed) = match self.fetch(&uri, &credential).await {
            Ok(body) => (body, 1, false),
            Err(reason) => {
                tracing::info!(uri = %uri, "fetch rejected ({}), refreshing credential", reason);
                let credential = self.cache.refresh(&uri).await?;
                let body = self
                    .fetch(&uri, &credential)
                    .await
                    .map_err(|reason| RelayError::Fetch {
                        uri: uri.clone(),
                        reason,
                    })?;
                (body, 2, true)
            }
        };

        let subscribers = self.bus.publish(&topic, body);
        Ok(RelayOutcome::Published {
            topic,
            attempts,
            refreshed,
            subscribers,
        })
    }

    /// Handles a notification and logs the result. Never fails.
    pub async fn process(&self, notification: Notification) {
        match self.handle(&notification).await {
            Ok(RelayOutcome::Ignored) => {
                tracing::debug!(kind = ?notification.kind, "notification ignored");
            }
            Ok(RelayOutcome::NoCredential { uri }) => {
                tracing::warn!(uri = %uri, "no credential cached, notification dropped");
            }
            Ok(RelayOutcome::Published {
                topic,
                attempts,
                refreshed,
                subscribers,
            }) => {
                tracing::info!(
                    topic = %topic,
                    attempts,
                    refreshed,
                    subscribers,
                    "resource relayed"
                );
            }
            Err(e @ RelayError::MalformedTarget(_)) => {
                tracing::warn!(notification_target = %notification.target, "{}", e);
            }
            Err(e) => {
                tracing::error!(notification_target = %notification.target, "relay failed: {}", e);
            }
        }
    }

    /// One authorized GET. Returns the body, or why the attempt failed.
    async fn fetch(&self, uri: &str, credential: &Credential) -> Result<String, String> {
        let response = self
            .client
            .get(uri)
            .header(AUTHORIZATION, credential.authorization_header())
            .header(ACCEPT, &self.accept)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        if !self.success_statuses.contains(&status) {
            return Err(format!("status {status}"));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_key_strips_trailing_numeric_segment() {
        assert_eq!(log_key("https://ex/alice/acc-x/17/"), "https://ex/alice/acc-x/");
        assert_eq!(log_key("https://ex/alice/acc-x/"), "https://ex/alice/acc-x/");
        assert_eq!(log_key("https://ex/alice/acc-x/17"), "https://ex/alice/acc-x/17");
        assert_eq!(log_key("https://ex/alice/v2/"), "https://ex/alice/v2/");
    }

    #[test]
    fn derived_target_moves_last_segment_under_derived() {
        assert_eq!(
            derive_target("https://ex/alice/acc-x/").unwrap(),
            "https://ex/alice/derived/acc-x"
        );
        assert_eq!(
            derive_target("http://127.0.0.1:3000/a/b/c?x=1").unwrap(),
            "http://127.0.0.1:3000/a/b/derived/c"
        );
        assert_eq!(derive_target("https://ex/only").unwrap(), "https://ex/derived/only");
    }

    #[test]
    fn derived_target_requires_a_path_segment() {
        assert!(matches!(
            derive_target("https://ex/"),
            Err(RelayError::MalformedTarget(_))
        ));
        assert!(matches!(
            derive_target("not a uri"),
            Err(RelayError::MalformedTarget(_))
        ));
    }

    #[test]
    fn end_to_end_mapping() {
        let topic = log_key("https://ex/alice/acc-x/17/");
        assert_eq!(topic, "https://ex/alice/acc-x/");
        assert_eq!(derive_target(&topic).unwrap(), "https://ex/alice/derived/acc-x");
    }

    #[test]
    fn numeric_target_at_host_root_derives_from_raw_target() {
        let (topic, uri) = resolve("https://ex/17/").unwrap();
        assert_eq!(topic, "https://ex/");
        assert_eq!(uri, "https://ex/derived/17");

        assert!(matches!(
            resolve("https://ex/"),
            Err(RelayError::MalformedTarget(t)) if t == "https://ex/"
        ));
    }
}
