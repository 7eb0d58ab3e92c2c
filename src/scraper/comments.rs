use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::{PageEndpoint, RetryPolicy, SoundCloudApi};
use crate::error::ScrapeError;
use crate::parser::{parse_comment, CommentRecord};
use crate::scraper::pagination::{Limits, Paginator};

/// Lazily walks the comment stream of one track in API order
pub struct CommentWalker {
    track_id: u64,
    pages: Paginator,
    skipped: usize,
}

/// Everything a finished walk produced
#[derive(Debug, Default)]
pub struct CommentThread {
    pub comments: Vec<CommentRecord>,
    pub skipped: usize,
    /// Set when the walk stopped early; `comments` holds what came before
    pub error: Option<ScrapeError>,
}

/// Start walking the comments of `track_id`. `limits.max_items` caps the
/// number of raw comments fetched.
pub fn walk_comments(
    api: Arc<dyn SoundCloudApi>,
    track_id: u64,
    limits: Limits,
    page_size: u32,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> CommentWalker {
    let endpoint = PageEndpoint::Comments { track_id };
    CommentWalker {
        track_id,
        pages: Paginator::new(api, endpoint, limits, page_size, retry, cancel),
        skipped: 0,
    }
}

impl CommentWalker {
    /// Next batch of parsed comments; malformed ones are skipped
    pub async fn next_batch(&mut self) -> Result<Option<Vec<CommentRecord>>, ScrapeError> {
        let Some(page) = self.pages.next_page().await? else {
            return Ok(None);
        };

        let mut batch = Vec::with_capacity(page.len());
        for raw in &page {
            match parse_comment(raw) {
                Ok(comment) => batch.push(comment),
                Err(e) => {
                    warn!("Skipping comment on track {}: {}", self.track_id, e);
                    self.skipped += 1;
                }
            }
        }
        Ok(Some(batch))
    }

    /// Drain the walk. A failure ends it but keeps the comments read so far.
    pub async fn collect_thread(mut self) -> CommentThread {
        let mut comments = Vec::new();
        let error = loop {
            match self.next_batch().await {
                Ok(Some(batch)) => comments.extend(batch),
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        CommentThread {
            comments,
            skipped: self.skipped,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockApi;
    use crate::api::{ApiPage, CursorPosition};
    use crate::error::{ErrorKind, FetchError};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn comment(id: u64, timestamp: u64) -> Value {
        json!({"kind": "comment", "id": id, "body": format!("c{}", id), "timestamp": timestamp,
               "user": {"id": 100 + id, "username": format!("user{}", id)}})
    }

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_walk_keeps_api_order_and_skips_malformed() {
        let mut api = MockApi::new();
        api.expect_fetch_page()
            .withf(|endpoint, position, _| {
                *endpoint == PageEndpoint::Comments { track_id: 42 } && *position == CursorPosition::Offset(0)
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(ApiPage {
                    collection: vec![comment(1, 500), json!({"id": 2, "body": "no author"}), comment(3, 10)],
                    next_href: Some("https://api/comments?offset=3".into()),
                })
            });
        api.expect_fetch_page()
            .withf(|_, position, _| matches!(position, CursorPosition::Token(_)))
            .times(1)
            .returning(|_, _, _| Ok(ApiPage { collection: vec![comment(4, 0)], next_href: None }));

        let thread = walk_comments(Arc::new(api), 42, Limits::UNLIMITED, 200, retry(), CancellationToken::new())
            .collect_thread()
            .await;

        let ids: Vec<_> = thread.comments.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(thread.skipped, 1);
        assert!(thread.error.is_none());
    }

    #[tokio::test]
    async fn test_max_comments_caps_the_walk() {
        let mut api = MockApi::new();
        api.expect_fetch_page().times(1).returning(|_, _, _| {
            Ok(ApiPage {
                collection: (1..=5).map(|id| comment(id, id * 10)).collect(),
                next_href: Some("https://api/more".into()),
            })
        });

        let limits = Limits { end_page: None, max_items: Some(5) };
        let thread = walk_comments(Arc::new(api), 1, limits, 200, retry(), CancellationToken::new())
            .collect_thread()
            .await;
        assert_eq!(thread.comments.len(), 5);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_thread() {
        let mut api = MockApi::new();
        let mut calls = 0;
        api.expect_fetch_page().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Ok(ApiPage {
                    collection: vec![comment(1, 1)],
                    next_href: Some("https://api/2".into()),
                })
            } else {
                Err(FetchError::Status { status: 403, url: "https://api/2".into() })
            }
        });

        let thread = walk_comments(Arc::new(api), 9, Limits::UNLIMITED, 1, retry(), CancellationToken::new())
            .collect_thread()
            .await;

        assert_eq!(thread.comments.len(), 1);
        assert_eq!(thread.error.map(|e| e.kind()), Some(ErrorKind::PageFetchFailed));
    }
}
