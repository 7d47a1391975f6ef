//! Error types for Greylit.
//!
//! Library crates use [`GreylitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::Priority;

/// Top-level error type for all Greylit operations.
#[derive(Debug, thiserror::Error)]
pub enum GreylitError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Every credential in the pool reported a quota error during this run.
    #[error(
        "rate limit exhausted on all {keys} search API keys \
         (website {website}, tier {tier}, page {page}); \
         wait for the quota to reset, add more keys, or upgrade the quota tier"
    )]
    RateLimitExhausted {
        website: String,
        tier: Priority,
        page: u32,
        keys: usize,
    },

    /// A single page request failed for a non-quota reason.
    #[error("page fetch failed (website {website}, tier {tier}, page {page}): {message}")]
    PageFetch {
        website: String,
        tier: Priority,
        page: u32,
        message: String,
    },

    /// Network/HTTP error outside of a search page request.
    #[error("network error: {0}")]
    Network(String),

    /// Records-store (Airtable) error.
    #[error("records store error: {0}")]
    Records(String),

    /// CSV export error.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed plan, bad priority, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GreylitError>;

impl GreylitError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GreylitError::config("missing search engine id");
        assert_eq!(err.to_string(), "config error: missing search engine id");

        let err = GreylitError::validation("priority 7 not supported");
        assert!(err.to_string().contains("priority 7"));
    }

    #[test]
    fn rate_limit_message_carries_context_and_instruction() {
        let err = GreylitError::RateLimitExhausted {
            website: "example.com".into(),
            tier: Priority::Second,
            page: 3,
            keys: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("example.com"));
        assert!(msg.contains("tier 2"));
        assert!(msg.contains("page 3"));
        assert!(msg.contains("add more keys"));
    }

    #[test]
    fn page_fetch_names_the_website() {
        let err = GreylitError::PageFetch {
            website: "badsite.org".into(),
            tier: Priority::First,
            page: 2,
            message: "HTTP 500".into(),
        };
        assert!(err.to_string().contains("badsite.org"));
    }
}
