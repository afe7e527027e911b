//! Error types for sbae.
//!
//! Grouped by origin:
//! - Input errors: caught locally, before any backend call
//! - Backend errors: a remote evaluation failed, fatal for the whole batch
//! - Statistics errors: numeric policy violations during aggregation
//! - Internal errors: invariant violations (bugs)

use crate::models::CategoryKey;
use thiserror::Error;

/// Top-level error type for sbae.
#[derive(Debug, Error)]
pub enum SbaeError {
    // ═══════════════════════════════════════════════════════════════════
    // INPUT — rejected locally, no backend call was made
    // ═══════════════════════════════════════════════════════════════════

    #[error("No AOI: the area of interest is missing or empty")]
    NoAoi,

    #[error("Unsupported grid shape: '{0}' (only 'square' is implemented)")]
    UnsupportedShape(String),

    #[error("Unsupported sampling method: '{0}' (expected 'systematic' or 'random')")]
    UnsupportedMethod(String),

    #[error("Missing parameter: '{0}' must be set before building a design")]
    MissingParameter(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    // ═══════════════════════════════════════════════════════════════════
    // BACKEND — a remote evaluation failed; no retry, no partial results
    // ═══════════════════════════════════════════════════════════════════

    #[error("Backend fetch error: {0}")]
    BackendFetch(#[from] BackendError),

    // ═══════════════════════════════════════════════════════════════════
    // STATISTICS — explicit numeric policy violations
    // ═══════════════════════════════════════════════════════════════════

    #[error("Undefined error ratio: category '{category}' has zero real area")]
    UndefinedErrorRatio { category: CategoryKey },

    // ═══════════════════════════════════════════════════════════════════
    // INTERNAL — invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the geospatial compute backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Rate limited by backend: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<f64>,
    },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),
}

impl SbaeError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the error was raised before any backend call.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::NoAoi
                | Self::UnsupportedShape(_)
                | Self::UnsupportedMethod(_)
                | Self::MissingParameter(_)
                | Self::InvalidInput(_)
                | Self::Config(_)
        )
    }
}

/// Result type alias for sbae.
pub type Result<T> = std::result::Result<T, SbaeError>;
