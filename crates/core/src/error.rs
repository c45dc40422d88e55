//! Unified error types for the platypus cache engine.
//!
//! Every message is prefixed with a stable code so the CLI and logs can be
//! grepped by failure class.

use tokio_rusqlite::rusqlite;

/// Unified error type for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty namespace name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// The request never produced a response (offline, DNS, reset).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// HTTP client failure unrelated to connectivity.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A manifest resource could not be precached.
    #[error("INSTALL_FAILED: {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    /// Lifecycle transition requested from the wrong state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),
}

impl Error {
    /// The stable code prefix of this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptEntry(_) => "CACHE_ERROR",
            Error::Network(_) => "NETWORK_ERROR",
            Error::HttpError(_) => "HTTP_ERROR",
            Error::FetchTimeout(_) => "FETCH_TIMEOUT",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
            Error::InstallFailed { .. } => "INSTALL_FAILED",
            Error::InvalidState(_) => "INVALID_STATE",
        }
    }

    /// Whether the failure means the network could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
