use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::api::PageEndpoint;
use crate::error::{ErrorKind, ScrapeError};

/// Entity kind an input URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Track,
    Playlist,
    Album,
    User,
    Search,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Track => "track",
            Self::Playlist => "playlist",
            Self::Album => "album",
            Self::User => "user",
            Self::Search => "search",
        };
        f.write_str(name)
    }
}

/// Which result collection a search URL targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    All,
    Tracks,
    Users,
    Playlists,
    Albums,
}

impl SearchScope {
    /// Path segment of the API search endpoint
    pub fn api_path(&self) -> &'static str {
        match self {
            Self::All => "search",
            Self::Tracks => "search/tracks",
            Self::Users => "search/users",
            Self::Playlists => "search/playlists",
            Self::Albums => "search/albums",
        }
    }
}

/// A classified input URL. Immutable once built by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// URL exactly as supplied by the caller
    pub raw_url: String,

    /// Kind determined from the URL shape
    pub resolved_kind: ResourceKind,

    /// Normalized identifier: `user/slug` style path, or the search term
    pub resource_id: String,

    /// Canonical web URL used for API resolution
    pub canonical_url: String,

    /// Only set for search requests
    pub search_scope: Option<SearchScope>,
}

impl ScrapeRequest {
    /// The paginated endpoint that serves this resource
    pub fn endpoint(&self) -> PageEndpoint {
        match (self.resolved_kind, self.search_scope) {
            (ResourceKind::Search, scope) => PageEndpoint::Search {
                scope: scope.unwrap_or(SearchScope::All),
                query: self.resource_id.clone(),
            },
            _ => PageEndpoint::Resolve {
                url: self.canonical_url.clone(),
            },
        }
    }
}

/// Lifecycle of one input URL inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrlState {
    Pending,
    Classified,
    Fetching,
    Parsing,
    Done,
    Failed,
}

impl UrlState {
    fn can_advance_to(self, next: UrlState) -> bool {
        use UrlState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Pending, Classified) => true,
            (Classified, Fetching) => true,
            // Parsing hands back to Fetching for the next page
            (Fetching, Parsing) | (Parsing, Fetching) => true,
            (Fetching, Done) | (Parsing, Done) => true,
            _ => false,
        }
    }
}

/// Per-input status reported alongside the dataset
#[derive(Debug, Clone, Serialize)]
pub struct UrlStatus {
    pub input: String,
    pub kind: Option<ResourceKind>,
    pub resource_id: Option<String>,
    pub state: UrlState,
    pub records: usize,
    pub skipped_items: usize,
    pub duplicates: usize,
    pub pages_fetched: u32,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
    pub warnings: Vec<String>,
}

impl UrlStatus {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            kind: None,
            resource_id: None,
            state: UrlState::Pending,
            records: 0,
            skipped_items: 0,
            duplicates: 0,
            pages_fetched: 0,
            error: None,
            message: None,
            warnings: Vec::new(),
        }
    }

    /// Move to the next state; illegal transitions are ignored
    pub fn advance(&mut self, next: UrlState) {
        if self.state == next {
            return;
        }
        if self.state.can_advance_to(next) {
            debug!("{}: {:?} -> {:?}", self.input, self.state, next);
            self.state = next;
        } else {
            debug!("{}: ignoring transition {:?} -> {:?}", self.input, self.state, next);
        }
    }

    pub fn classified(&mut self, request: &ScrapeRequest) {
        self.kind = Some(request.resolved_kind);
        self.resource_id = Some(request.resource_id.clone());
        self.advance(UrlState::Classified);
    }

    pub fn fail(&mut self, err: &ScrapeError) {
        self.error = Some(err.kind());
        self.message = Some(err.to_string());
        self.advance(UrlState::Failed);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_failed(&self) -> bool {
        self.state == UrlState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_happy_path() {
        let mut status = UrlStatus::new("https://soundcloud.com/a/b");
        status.advance(UrlState::Classified);
        status.advance(UrlState::Fetching);
        status.advance(UrlState::Parsing);
        status.advance(UrlState::Fetching);
        status.advance(UrlState::Done);
        assert_eq!(status.state, UrlState::Done);

        // Terminal states stay put
        status.advance(UrlState::Failed);
        assert_eq!(status.state, UrlState::Done);
    }

    #[test]
    fn test_fail_from_pending_records_kind() {
        let mut status = UrlStatus::new("ftp://nowhere");
        status.fail(&ScrapeError::UnsupportedUrlKind("ftp://nowhere".into()));

        assert!(status.is_failed());
        assert_eq!(status.error, Some(ErrorKind::UnsupportedUrlKind));
        assert!(status.message.as_deref().unwrap().contains("ftp://nowhere"));
    }

    #[test]
    fn test_cannot_skip_classification() {
        let mut status = UrlStatus::new("x");
        status.advance(UrlState::Fetching);
        assert_eq!(status.state, UrlState::Pending);
    }

    #[test]
    fn test_endpoint_for_search_and_permalink() {
        let search = ScrapeRequest {
            raw_url: "https://soundcloud.com/search/people?q=dnb".into(),
            resolved_kind: ResourceKind::Search,
            resource_id: "dnb".into(),
            canonical_url: "https://soundcloud.com/search/people?q=dnb".into(),
            search_scope: Some(SearchScope::Users),
        };
        assert_eq!(
            search.endpoint(),
            PageEndpoint::Search { scope: SearchScope::Users, query: "dnb".into() }
        );

        let track = ScrapeRequest {
            raw_url: "https://m.soundcloud.com/a/b?si=1".into(),
            resolved_kind: ResourceKind::Track,
            resource_id: "a/b".into(),
            canonical_url: "https://soundcloud.com/a/b".into(),
            search_scope: None,
        };
        assert_eq!(
            track.endpoint(),
            PageEndpoint::Resolve { url: "https://soundcloud.com/a/b".into() }
        );
    }
}
