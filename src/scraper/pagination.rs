use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{CursorPosition, PageEndpoint, RetryPolicy, SoundCloudApi};
use crate::error::{FetchError, ScrapeError};

/// Caller supplied bounds for one paginated walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Last page number (1-based) that may be fetched
    pub end_page: Option<u32>,

    /// Total items that may be produced
    pub max_items: Option<usize>,
}

impl Limits {
    pub const UNLIMITED: Limits = Limits {
        end_page: None,
        max_items: None,
    };

    /// Validate raw limits; zero and negative values are rejected
    pub fn new(end_page: Option<i64>, max_items: Option<i64>) -> Result<Self, ScrapeError> {
        Ok(Self {
            end_page: positive("endPage", end_page)?.map(|n| n.min(u32::MAX as u64) as u32),
            max_items: positive("maxItems", max_items)?.map(|n| n as usize),
        })
    }
}

/// Accept only strictly positive values
pub fn positive(name: &'static str, value: Option<i64>) -> Result<Option<u64>, ScrapeError> {
    match value {
        None => Ok(None),
        Some(v) if v > 0 => Ok(Some(v as u64)),
        Some(v) => Err(ScrapeError::InvalidLimit { name, value: v }),
    }
}

/// Position of a walk: where the next page starts and how many pages are behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub position: CursorPosition,
    /// Pages fetched so far
    pub page_number: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            position: CursorPosition::Offset(0),
            page_number: 0,
        }
    }
}

/// Lazily walks the pages of one endpoint.
///
/// Stops on the first empty page, when the API returns no continuation, when
/// `end_page` pages have been fetched, or once `max_items` items have been
/// produced. A failed fetch is terminal; items already returned stay valid.
pub struct Paginator {
    api: Arc<dyn SoundCloudApi>,
    endpoint: PageEndpoint,
    cursor: PageCursor,
    limits: Limits,
    page_size: u32,
    retry: RetryPolicy,
    cancel: CancellationToken,
    produced: usize,
    finished: bool,
}

impl Paginator {
    pub fn new(
        api: Arc<dyn SoundCloudApi>,
        endpoint: PageEndpoint,
        limits: Limits,
        page_size: u32,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            endpoint,
            cursor: PageCursor::default(),
            limits,
            page_size: page_size.max(1),
            retry,
            cancel,
            produced: 0,
            finished: false,
        }
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    fn remaining(&self) -> Option<usize> {
        self.limits.max_items.map(|max| max.saturating_sub(self.produced))
    }

    /// Fetch the next page. `Ok(None)` once the walk is over.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, ScrapeError> {
        if self.finished {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Err(ScrapeError::Cancelled);
        }
        if let Some(end) = self.limits.end_page {
            if self.cursor.page_number >= end {
                debug!("{}: reached end page {}", self.endpoint, end);
                self.finished = true;
                return Ok(None);
            }
        }
        let limit = match self.remaining() {
            Some(0) => {
                debug!("{}: item limit reached", self.endpoint);
                self.finished = true;
                return Ok(None);
            }
            Some(remaining) => self.page_size.min(remaining.min(u32::MAX as usize) as u32),
            None => self.page_size,
        };

        let page_number = self.cursor.page_number + 1;
        let label = format!("{} page {}", self.endpoint, page_number);
        let api = &self.api;
        let endpoint = &self.endpoint;
        let position = self.cursor.position.clone();

        let result = self
            .retry
            .run(&label, &self.cancel, || api.fetch_page(endpoint, &position, limit))
            .await;

        let page = match result {
            Ok(page) => page,
            Err(FetchError::Cancelled) => {
                self.finished = true;
                return Err(ScrapeError::Cancelled);
            }
            Err(source) => {
                self.finished = true;
                return Err(ScrapeError::PageFetchFailed {
                    resource: self.endpoint.to_string(),
                    page: page_number,
                    source,
                });
            }
        };

        self.cursor.page_number = page_number;
        if page.collection.is_empty() {
            debug!("{}: page {} is empty", self.endpoint, page_number);
            self.finished = true;
            return Ok(None);
        }

        let mut items = page.collection;
        if let Some(remaining) = self.remaining() {
            items.truncate(remaining);
        }
        self.produced += items.len();

        match page.next_href {
            Some(href) => self.cursor.position = CursorPosition::Token(href),
            None => self.finished = true,
        }

        debug!("{}: page {} produced {} items", self.endpoint, page_number, items.len());
        Ok(Some(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockApi;
    use crate::api::ApiPage;
    use crate::error::ErrorKind;
    use mockall::predicate::*;
    use serde_json::json;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    fn items(range: std::ops::Range<u64>) -> Vec<Value> {
        range.map(|id| json!({"kind": "track", "id": id})).collect()
    }

    fn endpoint() -> PageEndpoint {
        PageEndpoint::Comments { track_id: 7 }
    }

    fn paginator(api: MockApi, limits: Limits, page_size: u32) -> Paginator {
        Paginator::new(Arc::new(api), endpoint(), limits, page_size, fast_retry(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_end_page_bounds_requests() {
        let mut api = MockApi::new();
        api.expect_fetch_page().times(2).returning(|_, _, _| {
            Ok(ApiPage {
                collection: items(0..3),
                next_href: Some("https://api/next".into()),
            })
        });

        let mut pages = paginator(api, Limits { end_page: Some(2), max_items: None }, 3);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 3);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 3);
        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.cursor().page_number, 2);
    }

    #[tokio::test]
    async fn test_follows_next_href() {
        let mut api = MockApi::new();
        api.expect_fetch_page()
            .with(always(), eq(CursorPosition::Offset(0)), eq(10))
            .times(1)
            .returning(|_, _, _| {
                Ok(ApiPage {
                    collection: items(0..10),
                    next_href: Some("https://api/page2".into()),
                })
            });
        api.expect_fetch_page()
            .with(always(), eq(CursorPosition::Token("https://api/page2".into())), eq(10))
            .times(1)
            .returning(|_, _, _| Ok(ApiPage { collection: items(10..12), next_href: None }));

        let mut pages = paginator(api, Limits::UNLIMITED, 10);
        let mut sizes = Vec::new();
        while let Some(page) = pages.next_page().await.unwrap() {
            sizes.push(page.len());
        }
        assert_eq!(sizes, vec![10, 2]);
        assert_eq!(pages.cursor().page_number, 2);
    }

    #[tokio::test]
    async fn test_max_items_truncates_and_stops() {
        let mut api = MockApi::new();
        api.expect_fetch_page().times(2).returning(|_, _, limit| {
            // the last request asks only for what is still needed
            Ok(ApiPage {
                collection: items(0..limit.max(3) as u64),
                next_href: Some("https://api/more".into()),
            })
        });

        let mut pages = paginator(api, Limits { end_page: None, max_items: Some(5) }, 3);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 3);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 2);
        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.cursor().page_number, 2);
    }

    #[tokio::test]
    async fn test_empty_page_ends_walk() {
        let mut api = MockApi::new();
        api.expect_fetch_page().times(1).returning(|_, _, _| {
            Ok(ApiPage {
                collection: Vec::new(),
                next_href: Some("https://api/ghost".into()),
            })
        });

        let mut pages = paginator(api, Limits::UNLIMITED, 50);
        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.cursor().page_number, 1);

        // The walk stays over; the mock allows a single request
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_reported_with_page_number() {
        let mut api = MockApi::new();
        let mut calls = 0;
        api.expect_fetch_page().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Ok(ApiPage {
                    collection: items(0..2),
                    next_href: Some("https://api/2".into()),
                })
            } else {
                Err(FetchError::Status { status: 404, url: "https://api/2".into() })
            }
        });

        let mut pages = paginator(api, Limits::UNLIMITED, 2);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 2);

        match pages.next_page().await {
            Err(ScrapeError::PageFetchFailed { page, .. }) => assert_eq!(page, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let mut api = MockApi::new();
        let mut calls = 0;
        api.expect_fetch_page().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Err(FetchError::Timeout)
            } else {
                Ok(ApiPage { collection: items(0..1), next_href: None })
            }
        });

        let mut pages = paginator(api, Limits::UNLIMITED, 1);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_walk() {
        let api = MockApi::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut pages =
            Paginator::new(Arc::new(api), endpoint(), Limits::UNLIMITED, 5, fast_retry(), cancel);
        assert_eq!(pages.next_page().await.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_limits_reject_non_positive() {
        assert_eq!(Limits::new(None, None).unwrap(), Limits::UNLIMITED);
        assert_eq!(Limits::new(Some(2), Some(10)).unwrap().max_items, Some(10));
        for (end, max) in [(Some(0), None), (None, Some(-3))] {
            match Limits::new(end, max) {
                Err(ScrapeError::InvalidLimit { .. }) => {}
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
