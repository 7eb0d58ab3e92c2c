use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::client::TRACK_BATCH_SIZE;
use crate::api::{RetryPolicy, SoundCloudApi};
use crate::cli::config::{RunInput, ScraperSettings};
use crate::error::{FetchError, ScrapeError};
use crate::parser::{
    parse_item, parse_track_summary, PlaylistRecord, RawItem, Record, RecordKind, TrackRecord,
};
use crate::scraper::classifier;
use crate::scraper::comments::walk_comments;
use crate::scraper::pagination::{positive, Limits, Paginator};
use crate::scraper::scheduler::{Admission, Scheduler};
use crate::scraper::task::{ResourceKind, ScrapeRequest, UrlState, UrlStatus};
use crate::utils::Metrics;

/// Effective options of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// `end_page` bounds every resource; `max_items` bounds the whole run
    pub limits: Limits,
    pub max_comments: Option<usize>,
    pub include_comments: bool,
    pub concurrency: usize,
    pub search_page_size: u32,
    pub comment_page_size: u32,
}

impl RunOptions {
    /// Merge per-run input over the configured defaults and validate limits
    pub fn resolve(settings: &ScraperSettings, input: &RunInput) -> Result<Self, ScrapeError> {
        let limits = Limits::new(
            input.end_page.or(settings.end_page),
            input.max_items.or(settings.max_items),
        )?;
        let max_comments = positive("maxComments", input.max_comments.or(settings.max_comments))?;

        Ok(Self {
            limits,
            max_comments: max_comments.map(|n| n as usize),
            include_comments: input.include_comments.unwrap_or(settings.include_comments),
            concurrency: settings.concurrency.max(1),
            search_page_size: settings.search_page_size.max(1),
            comment_page_size: settings.comment_page_size.max(1),
        })
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limits: Limits::UNLIMITED,
            max_comments: None,
            include_comments: true,
            concurrency: 4,
            search_page_size: 50,
            comment_page_size: 200,
        }
    }
}

/// Status summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_records: usize,
    pub cancelled: bool,
    pub inputs: Vec<UrlStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

/// Dataset and status summary of a run
#[derive(Debug)]
pub struct ScrapeReport {
    pub records: Vec<Record>,
    pub summary: RunSummary,
}

impl ScrapeReport {
    /// Fail the run when every classified input failed without producing data
    pub fn ensure_collected(&self) -> Result<(), ScrapeError> {
        if !self.records.is_empty() {
            return Ok(());
        }
        if self.summary.cancelled {
            return Err(ScrapeError::Cancelled);
        }

        let attempted: Vec<_> = self.summary.inputs.iter().filter(|s| s.kind.is_some()).collect();
        if !attempted.is_empty() && attempted.iter().all(|s| s.is_failed() && s.records == 0) {
            return Err(ScrapeError::NoDataCollected {
                attempted: attempted.len(),
            });
        }
        Ok(())
    }
}

/// Drives every input URL of a run through classify, fetch, parse and dedup
pub struct ScrapeController {
    api: Arc<dyn SoundCloudApi>,
    options: RunOptions,
    retry: RetryPolicy,
}

impl ScrapeController {
    pub fn new(api: Arc<dyn SoundCloudApi>, options: RunOptions, retry: RetryPolicy) -> Self {
        Self { api, options, retry }
    }

    /// Scrape `inputs`. Never fails: per-input errors land in the summary.
    ///
    /// Cancelling `cancel` stops all in-flight work; records accepted before
    /// that are kept.
    pub async fn run(&self, inputs: &[String], cancel: CancellationToken) -> ScrapeReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting run {} with {} input(s)", run_id, inputs.len());

        // Cancelled by the run itself once the item cap is reached
        let run_cancel = cancel.child_token();
        let scheduler = Mutex::new(Scheduler::new(inputs.len(), self.options.limits.max_items));

        let statuses: Vec<UrlStatus> = stream::iter(inputs.iter().enumerate())
            .map(|(slot, input)| {
                self.process_url(slot, input, &scheduler, &run_cancel)
                    .instrument(info_span!("input", slot))
            })
            .buffered(self.options.concurrency)
            .collect()
            .await;

        let records = scheduler.into_inner().into_records();
        let finished_at = Utc::now();
        info!(
            "Run {} finished: {} record(s) in {}ms",
            run_id,
            records.len(),
            (finished_at - started_at).num_milliseconds()
        );

        ScrapeReport {
            summary: RunSummary {
                run_id,
                started_at,
                finished_at,
                total_records: records.len(),
                cancelled: cancel.is_cancelled(),
                inputs: statuses,
                metrics: None,
            },
            records,
        }
    }

    async fn process_url(
        &self,
        slot: usize,
        input: &str,
        scheduler: &Mutex<Scheduler>,
        cancel: &CancellationToken,
    ) -> UrlStatus {
        let mut status = UrlStatus::new(input);

        let result = self.scrape_url(slot, input, scheduler, cancel, &mut status).await;
        let limit_reached = scheduler.lock().await.is_full();

        match result {
            Ok(()) => status.advance(UrlState::Done),
            Err(ScrapeError::Cancelled) if limit_reached => {
                debug!("{}: stopped, item limit reached", input);
                status.warn("stopped early: item limit reached");
                if status.state == UrlState::Pending {
                    status.fail(&ScrapeError::Cancelled);
                } else {
                    status.advance(UrlState::Done);
                }
            }
            Err(e) => {
                error!("Failed to scrape {}: {}", input, e);
                status.fail(&e);
            }
        }

        info!(
            "{}: {:?}, {} record(s), {} skipped, {} duplicate(s)",
            input, status.state, status.records, status.skipped_items, status.duplicates
        );
        status
    }

    async fn scrape_url(
        &self,
        slot: usize,
        input: &str,
        scheduler: &Mutex<Scheduler>,
        cancel: &CancellationToken,
        status: &mut UrlStatus,
    ) -> Result<(), ScrapeError> {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        let request = self.classify(input, cancel).await?;
        status.classified(&request);
        debug!("{} classified as {} {}", input, request.resolved_kind, request.resource_id);

        let limits = Limits {
            end_page: self.options.limits.end_page,
            max_items: scheduler.lock().await.remaining(),
        };
        let page_size = match request.resolved_kind {
            ResourceKind::Search => self.options.search_page_size,
            _ => 1,
        };
        let mut pages = Paginator::new(
            self.api.clone(),
            request.endpoint(),
            limits,
            page_size,
            self.retry.clone(),
            cancel.clone(),
        );

        loop {
            status.advance(UrlState::Fetching);
            let page = pages.next_page().await;
            status.pages_fetched = pages.cursor().page_number;
            let Some(items) = page? else {
                break;
            };

            status.advance(UrlState::Parsing);
            for raw in items {
                let record = match self.build_record(raw, &request, scheduler, cancel, status).await {
                    Ok(record) => record,
                    Err(ScrapeError::Cancelled) => return Err(ScrapeError::Cancelled),
                    Err(e) => {
                        warn!("Skipping item from {}: {}", input, e);
                        status.skipped_items += 1;
                        status.warn(e.to_string());
                        continue;
                    }
                };

                let (admission, full) = {
                    let mut scheduler = scheduler.lock().await;
                    let admission = scheduler.admit(slot, record);
                    (admission, scheduler.is_full())
                };

                match admission {
                    Admission::Accepted => status.records += 1,
                    Admission::Duplicate => status.duplicates += 1,
                    Admission::LimitReached => {
                        cancel.cancel();
                        return Err(ScrapeError::Cancelled);
                    }
                }

                if full {
                    info!("Item limit reached, stopping run");
                    cancel.cancel();
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Classify an input, expanding short links by one redirect hop first
    async fn classify(&self, input: &str, cancel: &CancellationToken) -> Result<ScrapeRequest, ScrapeError> {
        let Some(short) = classifier::short_link(input) else {
            return classifier::classify(input);
        };

        let api = &self.api;
        let target = self
            .retry
            .run("short link", cancel, || api.expand_short_link(short.as_str()))
            .await
            .map_err(|e| match e {
                FetchError::Cancelled => ScrapeError::Cancelled,
                source => ScrapeError::PageFetchFailed {
                    resource: input.to_string(),
                    page: 1,
                    source,
                },
            })?;

        let mut request = classifier::classify(&target)?;
        request.raw_url = input.to_string();
        Ok(request)
    }

    /// Parse one raw item and attach what the record needs from further requests
    async fn build_record(
        &self,
        raw: Value,
        request: &ScrapeRequest,
        scheduler: &Mutex<Scheduler>,
        cancel: &CancellationToken,
        status: &mut UrlStatus,
    ) -> Result<Record, ScrapeError> {
        let item = RawItem::tag(raw, Some(request.resolved_kind))?;
        let mut record = parse_item(&item)?;

        if let Some(expected) = expected_kind(request.resolved_kind) {
            let actual = record.kind();
            if actual != expected {
                status.warn(format!("expected a {:?} but the API returned a {:?}", expected, actual));
            }
        }

        // Already emitted; admit() will count it as a duplicate
        if scheduler.lock().await.has_seen(record.id()) {
            return Ok(record);
        }

        match &mut record {
            Record::Track(track)
                if self.options.include_comments && request.resolved_kind == ResourceKind::Track =>
            {
                self.attach_comments(track, cancel, status).await?
            }
            Record::Playlist(playlist) => self.hydrate_playlist(playlist, cancel, status).await?,
            _ => {}
        }
        Ok(record)
    }

    async fn attach_comments(
        &self,
        track: &mut TrackRecord,
        cancel: &CancellationToken,
        status: &mut UrlStatus,
    ) -> Result<(), ScrapeError> {
        let limits = Limits {
            end_page: self.options.limits.end_page,
            max_items: self.options.max_comments,
        };
        let thread = walk_comments(
            self.api.clone(),
            track.id,
            limits,
            self.options.comment_page_size,
            self.retry.clone(),
            cancel.clone(),
        )
        .collect_thread()
        .await;

        status.skipped_items += thread.skipped;
        match thread.error {
            Some(ScrapeError::Cancelled) => return Err(ScrapeError::Cancelled),
            Some(e) => {
                warn!("Comments of track {} are incomplete: {}", track.id, e);
                status.warn(format!("comments of track {} incomplete: {}", track.id, e));
            }
            None => {}
        }

        debug!("Attaching {} comment(s) to track {}", thread.comments.len(), track.id);
        track.attach_comments(thread.comments);
        Ok(())
    }

    /// Replace playlist track stubs with full summaries
    async fn hydrate_playlist(
        &self,
        playlist: &mut PlaylistRecord,
        cancel: &CancellationToken,
        status: &mut UrlStatus,
    ) -> Result<(), ScrapeError> {
        let stubs = playlist.stub_ids();
        if stubs.is_empty() {
            return Ok(());
        }
        debug!("Hydrating {} track stub(s) of playlist {}", stubs.len(), playlist.id);

        let api = &self.api;
        let mut full = Vec::with_capacity(stubs.len());
        for batch in stubs.chunks(TRACK_BATCH_SIZE) {
            let label = format!("tracks of playlist {}", playlist.id);
            match self.retry.run(&label, cancel, || api.fetch_tracks(batch)).await {
                Ok(tracks) => {
                    for raw in &tracks {
                        match parse_track_summary(raw) {
                            Ok(track) => full.push(track),
                            Err(e) => {
                                warn!("Skipping track of playlist {}: {}", playlist.id, e);
                                status.skipped_items += 1;
                                status.warn(e.to_string());
                            }
                        }
                    }
                }
                Err(FetchError::Cancelled) => return Err(ScrapeError::Cancelled),
                Err(e) => {
                    warn!("Could not hydrate playlist {}: {}", playlist.id, e);
                    status.warn(format!("tracks of playlist {} incomplete: {}", playlist.id, e));
                    break;
                }
            }
        }

        playlist.hydrate(&full);
        Ok(())
    }
}

fn expected_kind(kind: ResourceKind) -> Option<RecordKind> {
    match kind {
        ResourceKind::Track => Some(RecordKind::Track),
        ResourceKind::User => Some(RecordKind::User),
        ResourceKind::Playlist | ResourceKind::Album => Some(RecordKind::Playlist),
        ResourceKind::Search => None,
    }
}
