//! Error types for rendering engines and extraction attempts.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a rendering engine capability.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No element matched the locator.
    #[error("no element matches {0}")]
    NotFound(String),

    /// Network, DNS, TLS or HTTP-level navigation failure.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// An engine operation did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The engine cannot perform this operation at all.
    #[error("{0} not supported by this engine")]
    Unsupported(&'static str),

    /// Session-level failure (crashed browser, broken connection, bad config).
    #[error("rendering engine failure: {0}")]
    Engine(String),
}

/// Why a single extraction attempt failed.
///
/// Every variant is recoverable at the attempt level: the retrying extractor
/// turns it into another attempt or, once attempts run out, into
/// "price unavailable".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("navigation error: {0}")]
    NavigationError(String),

    #[error("no price in {0:?}")]
    ParseFailure(String),

    #[error("engine failure: {0}")]
    EngineFailure(String),
}

impl From<EngineError> for ExtractionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(locator) => ExtractionError::ElementNotFound(locator),
            EngineError::Navigation(msg) => ExtractionError::NavigationError(msg),
            EngineError::Timeout(after) => ExtractionError::Timeout(format!("after {after:?}")),
            err @ (EngineError::Unsupported(_) | EngineError::Engine(_)) => {
                ExtractionError::EngineFailure(err.to_string())
            }
        }
    }
}
