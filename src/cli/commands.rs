use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{RetryPolicy, SoundCloudClient};
use crate::cli::config::{RunInput, ScraperConfig};
use crate::scraper::{classifier, RunOptions, RunSummary, ScrapeController};
use crate::storage::{write_dataset, write_summary};
use crate::utils::MetricsCollector;

/// Options of `scraper scrape` as given on the command line
#[derive(Debug, Default)]
pub struct ScrapeArgs {
    pub urls: Vec<String>,
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub end_page: Option<i64>,
    pub max_items: Option<i64>,
    pub max_comments: Option<i64>,
    pub include_comments: Option<bool>,
    pub concurrency: Option<usize>,
}

impl ScrapeArgs {
    /// Build the run input: input file first, command line on top
    fn into_run_input(self) -> Result<(RunInput, PathBuf)> {
        let mut input = match &self.input {
            Some(path) => RunInput::load(path)?,
            None => RunInput::default(),
        };

        input.urls.extend(self.urls);
        input.end_page = self.end_page.or(input.end_page);
        input.max_items = self.max_items.or(input.max_items);
        input.max_comments = self.max_comments.or(input.max_comments);
        input.include_comments = self.include_comments.or(input.include_comments);

        Ok((input, self.output))
    }
}

/// Run a scrape and write the dataset and its summary
pub async fn scrape(config_path: Option<&Path>, args: ScrapeArgs) -> Result<()> {
    let mut config = ScraperConfig::load(config_path)
        .context("Failed to load configuration")?;
    if let Some(concurrency) = args.concurrency {
        config.scraper.concurrency = concurrency;
    }

    let (input, output) = args.into_run_input()?;
    if input.urls.is_empty() {
        bail!("No input URLs: pass them as arguments or through --input");
    }
    let options = RunOptions::resolve(&config.scraper, &input)?;

    let metrics = MetricsCollector::new();
    let client = SoundCloudClient::new(&config.api, metrics.clone())?;
    let controller = ScrapeController::new(Arc::new(client), options, RetryPolicy::from(&config.retry));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let mut report = controller.run(&input.urls, cancel).await;
    report.summary.metrics = Some(metrics.get_metrics().await);

    write_dataset(&output, &report.records)?;
    let summary_path = write_summary(&output, &report.summary)?;
    print_summary(&report.summary);
    info!("Summary written to {}", summary_path.display());

    report.ensure_collected()?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run ID: {}", summary.run_id);
    println!("Started: {}", summary.started_at.to_rfc3339());
    println!("Finished: {}", summary.finished_at.to_rfc3339());
    println!("Records: {}", summary.total_records);
    if summary.cancelled {
        println!("Run was cancelled");
    }

    for status in &summary.inputs {
        let kind = status.kind.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "  {} [{}] {:?}: {} record(s), {} skipped, {} duplicate(s)",
            status.input, kind, status.state, status.records, status.skipped_items, status.duplicates
        );
        if let Some(message) = &status.message {
            println!("    error: {}", message);
        }
        for warning in &status.warnings {
            println!("    warning: {}", warning);
        }
    }

    if let Some(metrics) = &summary.metrics {
        println!(
            "Requests: {} total, {} ok, {} failed, {} rate limited",
            metrics.total_requests, metrics.successful_requests, metrics.failed_requests, metrics.rate_limited
        );
    }
}

/// Print how a URL is classified
pub fn classify(url: &str) -> Result<()> {
    if classifier::short_link(url).is_some() {
        println!("{} is a short link; it is expanded when scraping", url);
        return Ok(());
    }

    let request = classifier::classify(url)?;
    println!("Kind: {}", request.resolved_kind);
    println!("Resource: {}", request.resource_id);
    match request.search_scope {
        Some(scope) => println!("Scope: {}", scope.api_path()),
        None => println!("Canonical URL: {}", request.canonical_url),
    }
    Ok(())
}

/// Print the effective configuration
pub fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = ScraperConfig::load(config_path)?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;

    let source = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(ScraperConfig::default_path);
    println!("# {}", source.display());
    print!("{}", yaml);
    Ok(())
}

/// Write the default configuration file
pub fn init_config() -> Result<()> {
    let path = ScraperConfig::default().save_as_default()?;
    println!("Default configuration written to {}", path.display());
    Ok(())
}
