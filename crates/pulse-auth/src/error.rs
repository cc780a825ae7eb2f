//! Error types for the credential layer.

/// Errors raised by an authorization exchange.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The resource answered without an authorization challenge.
    #[error("resource {0} did not issue an authorization challenge")]
    NoChallenge(String),

    /// The `WWW-Authenticate` header could not be understood.
    #[error("malformed authorization challenge: {0}")]
    MalformedChallenge(String),

    /// The authorization server refused to issue a token.
    #[error("authorization server rejected the exchange with status {0}")]
    Rejected(u16),

    /// Transport failure while talking to the resource or authorization server.
    #[error("authorization transport error: {0}")]
    Network(#[from] reqwest::Error),
}
