//! Error types for the two fallible per-item operations of the pipeline.
//!
//! Feed fetches and redirect resolutions fail one item at a time and never
//! abort their siblings, so each gets its own error enum that callers can
//! count and log. Orchestration code above them uses `Box<dyn Error>`.

use thiserror::Error;

/// Failure to download a feed or page body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("empty body from {0}")]
    EmptyBody(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
}

/// Failure to turn a redirect link into a publisher URL.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("browser unavailable: {0}")]
    Browser(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("still on redirect domain: {0}")]
    Unresolved(String),
}

impl From<chromiumoxide::error::CdpError> for ResolveError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ResolveError::Navigation(e.to_string())
    }
}
