use thiserror::Error;

/// Failures surfaced on the feed connection. The `Display` text is what ends
/// up in `ConnectionState::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("Select at least one feed")]
    NoTopicsSelected,
    #[error("API key + secret required")]
    MissingCredentials,
    #[error("invalid feed url: {0}")]
    InvalidUrl(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("transport is closed")]
    TransportClosed,
    #[error("{0}")]
    Transport(String),
}
