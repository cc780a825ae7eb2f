//! Client-side credential cache for the Pulse relay.
//!
//! Holds per-resource access credentials and refreshes them through an
//! external authorization exchange when they are stale or rejected. This is
//! not an authorization server: credentials are issued elsewhere and only
//! cached and re-derived here.
//!
//! # Lifecycle
//!
//! One [`TokenCache`] is constructed at process start and shared by handle
//! (`Arc<TokenCache>`) with every component that needs it. Refreshes are
//! last-write-wins; a reader always sees either the previous credential or
//! the new one, never a partially written entry.

mod cache;
mod error;
mod uma;

pub use cache::{Authorizer, TokenCache};
pub use error::AuthError;
pub use uma::{UmaAuthorizer, UmaChallenge, DEFAULT_CLAIM_FORMAT, UMA_TICKET_GRANT};
