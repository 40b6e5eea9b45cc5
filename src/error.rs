//! Error handling.

use thiserror::Error;

use crate::graph_store::GraphKind;

/// Graph engine error type
///
/// This type encapsulates the various errors that may occur. Missing or empty measurements are
/// not errors: they surface as graphs without traces.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Error sending a request to the measurements endpoint
    #[error("error requesting measurements")]
    Http(#[from] reqwest::Error),

    /// Unexpected status from the measurements endpoint
    #[error("measurements request failed with status {status}")]
    FetchStatus { status: u16 },

    /// Measurement payload failed validation
    #[error("measurement payload is not valid")]
    InvalidPayload(#[from] validator::ValidationErrors),

    /// Query or modifiers failed validation
    #[error("query is not valid")]
    InvalidQuery(#[source] validator::ValidationErrors),

    /// No graph registered under the id
    #[error("unknown graph {id}")]
    UnknownGraph { id: String },

    /// Graph registered with a different kind
    #[error("graph {id} is not a {expected} graph")]
    GraphKindMismatch { id: String, expected: GraphKind },

    /// Error (de)serialising JSON
    #[error("failed to (de)serialise JSON")]
    Json(#[from] serde_json::Error),

    /// Error reading or writing a file
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Error parsing a URL
    #[error("invalid URL")]
    Url(#[from] url::ParseError),

    /// Error registering or gathering metrics
    #[error("metrics error")]
    Metrics(#[from] prometheus::Error),
}

/// Log an error and all of its causes.
pub fn log_error<E>(error: &E)
where
    E: std::error::Error,
{
    tracing::error!("{}", error);
    let mut current = error.source();
    let mut previous = error.to_string();
    while let Some(source) = current {
        // Transparent wrappers repeat the message of their source.
        let message = source.to_string();
        if message != previous {
            tracing::error!("Caused by: {}", message);
        }
        previous = message;
        current = source.source();
    }
}
