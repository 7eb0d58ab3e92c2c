use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while scraping a single input or the run as a whole
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Unsupported URL kind: {0}")]
    UnsupportedUrlKind(String),

    #[error("Invalid limit for {name}: {value} (must be a positive integer)")]
    InvalidLimit { name: &'static str, value: i64 },

    #[error("Fetching page {page} of {resource} failed: {source}")]
    PageFetchFailed {
        resource: String,
        page: u32,
        #[source]
        source: FetchError,
    },

    #[error("Malformed {kind} record: {reason}")]
    MalformedRecord { kind: &'static str, reason: String },

    #[error("No data collected: all {attempted} input URL(s) failed")]
    NoDataCollected { attempted: usize },

    #[error("Scrape cancelled")]
    Cancelled,
}

impl ScrapeError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            kind,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedUrlKind(_) => ErrorKind::UnsupportedUrlKind,
            Self::InvalidLimit { .. } => ErrorKind::InvalidLimit,
            Self::PageFetchFailed { .. } => ErrorKind::PageFetchFailed,
            Self::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Self::NoDataCollected { .. } => ErrorKind::NoDataCollected,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Serializable error tag used in the per-URL status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedUrlKind,
    InvalidLimit,
    PageFetchFailed,
    MalformedRecord,
    NoDataCollected,
    Cancelled,
}

/// Transport-level failures of a single API request
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Client id unavailable: {0}")]
    ClientId(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Timeouts, dropped connections and 5xx responses are worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Timeout | Self::Connection(_) => true,
            _ => false,
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Self::Connection(err.to_string())
        }
    }
}
