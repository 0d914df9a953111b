//! Error types for schema compilation

use thiserror::Error;

/// Result type for schema compilation
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Compile-time schema errors.
///
/// Validation-time violations are never represented here; they accumulate
/// in [`crate::Validation`] and validation always runs to completion.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Malformed schema: {0}")]
    Malformed(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("Invalid URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to fetch schema {uri}: {source}")]
    Fetch {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
