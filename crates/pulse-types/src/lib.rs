//! Shared types for the Pulse relay.
//!
//! This crate provides the data model used across all Pulse crates: the
//! inbound webhook notification, the access credential held by the token
//! cache, and the timestamped resource that flows into the fragmented log.
//!
//! No crate in the workspace depends on anything *except* `pulse-types` for
//! cross-cutting type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification activity types delivered by a resource server webhook.
///
/// Only `Add` drives the relay. Everything else is accepted and ignored so
/// that new activity types never break the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A member was added to the watched container.
    Add,
    /// A resource was updated in place.
    Update,
    /// A resource was removed.
    Remove,
    /// Any activity type this relay does not know about.
    #[serde(other)]
    Other,
}

/// A "resource changed" webhook body: `{"type": "Add", "target": "<uri>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// The activity type.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Where the change happened, e.g. `https://pod/alice/acc-x/17/`.
    pub target: String,
}

impl Notification {
    /// Returns `true` when this notification should be relayed.
    pub fn is_add(&self) -> bool {
        self.kind == NotificationKind::Add
    }
}

/// An access credential for one resource scope.
///
/// Credentials are replaced wholesale on refresh and never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The resource (or resource prefix) this credential authorizes.
    pub resource_scope: String,
    /// Token type, e.g. `Bearer`.
    pub token_type: String,
    /// The opaque access token.
    pub access_token: String,
    /// When the credential stops being valid, if known.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        resource_scope: impl Into<String>,
        token_type: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            resource_scope: resource_scope.into(),
            token_type: token_type.into(),
            access_token: access_token.into(),
            expiry: None,
        }
    }

    /// Sets the expiry of this credential.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns `true` when the expiry is known and lies at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Value for the `Authorization` request header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("resource_scope", &self.resource_scope)
            .field("token_type", &self.token_type)
            .field("access_token", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// An immutable serialized event plus its logical timestamp.
///
/// The timestamp is milliseconds since the Unix epoch, the same unit used in
/// fragment identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Serialized content (Turtle / N-Triples), treated as opaque.
    pub body: String,
    /// Logical timestamp in epoch milliseconds.
    pub timestamp: i64,
}

impl Resource {
    pub fn new(body: impl Into<String>, timestamp: i64) -> Self {
        Self {
            body: body.into(),
            timestamp,
        }
    }

    /// The timestamp as a UTC date, if it is in chrono's representable range.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Splits the path of `uri` into its non-empty segments.
///
/// Returns `None` when `uri` is not an absolute URL.
pub fn path_segments(uri: &str) -> Option<Vec<String>> {
    let parsed = url::Url::parse(uri).ok()?;
    Some(
        parsed
            .path()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
