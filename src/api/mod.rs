pub mod client;
pub mod client_id;
pub mod retry;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::FetchError;
use crate::scraper::task::SearchScope;

// Re-export common types
pub use client::SoundCloudClient;
pub use retry::RetryPolicy;

/// A paginated (or single-object) API collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEndpoint {
    /// Resolve a web permalink to its API object; always a single page
    Resolve { url: String },

    /// Search results for a query
    Search { scope: SearchScope, query: String },

    /// Comment stream of one track
    Comments { track_id: u64 },
}

impl fmt::Display for PageEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve { url } => write!(f, "resolve {}", url),
            Self::Search { scope, query } => write!(f, "{} q={:?}", scope.api_path(), query),
            Self::Comments { track_id } => write!(f, "tracks/{}/comments", track_id),
        }
    }
}

/// Where the next page request starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorPosition {
    /// Numeric offset into the collection
    Offset(u32),

    /// Opaque continuation (the API's `next_href`)
    Token(String),
}

/// One page of raw API objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiPage {
    pub collection: Vec<Value>,
    pub next_href: Option<String>,
}

/// Upstream API surface the scraper depends on
#[async_trait]
pub trait SoundCloudApi: Send + Sync {
    /// Fetch one page of an endpoint starting at `position`
    async fn fetch_page(
        &self,
        endpoint: &PageEndpoint,
        position: &CursorPosition,
        limit: u32,
    ) -> Result<ApiPage, FetchError>;

    /// Follow exactly one redirect hop of a short link
    async fn expand_short_link(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch full track objects by id
    async fn fetch_tracks(&self, ids: &[u64]) -> Result<Vec<Value>, FetchError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;

    mockall::mock! {
        pub Api {}

        #[async_trait]
        impl SoundCloudApi for Api {
            async fn fetch_page(
                &self,
                endpoint: &PageEndpoint,
                position: &CursorPosition,
                limit: u32,
            ) -> Result<ApiPage, FetchError>;
            async fn expand_short_link(&self, url: &str) -> Result<String, FetchError>;
            async fn fetch_tracks(&self, ids: &[u64]) -> Result<Vec<Value>, FetchError>;
        }
    }
}
