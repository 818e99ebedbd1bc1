//! Error types for the feed SDK

pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors surfaced to SDK consumers. Connection failures are not among
/// them: the subscriber retries those internally and reports them through
/// its state instead.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}
