//! Error types for the fragmented log.

/// N-Triples syntax errors.
#[derive(Debug, thiserror::Error)]
pub enum RdfError {
    #[error("n-triples syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Errors returned by a [`LogStore`](crate::LogStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport failure talking to the log store.
    #[error("log store network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The log store answered with a non-success status.
    #[error("log store returned status {status} for {uri}")]
    Status { uri: String, status: u16 },

    /// The addressed resource does not exist.
    #[error("log store resource not found: {0}")]
    NotFound(String),

    /// The metadata document could not be parsed.
    #[error("log metadata is not valid n-triples: {0}")]
    Rdf(#[from] RdfError),
}

/// Errors that abort a whole publish.
///
/// Fragment materialization and metadata patch failures do not abort a
/// publish; they are logged and reported in the
/// [`PublishReport`](crate::PublishReport).
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A publish needs at least one resource.
    #[error("cannot publish an empty batch")]
    EmptyBatch,

    /// The log metadata could not be read.
    #[error("failed to read log metadata: {0}")]
    Store(#[from] StoreError),
}
