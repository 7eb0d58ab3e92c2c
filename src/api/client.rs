use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, redirect, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::api::client_id::discover_client_id;
use crate::api::{ApiPage, CursorPosition, PageEndpoint, SoundCloudApi};
use crate::cli::config::ApiSettings;
use crate::error::FetchError;
use crate::utils::MetricsCollector;

/// Max ids per `/tracks?ids=` lookup
pub const TRACK_BATCH_SIZE: usize = 50;

/// Raw page envelope of collection endpoints
#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default, alias = "comments")]
    collection: Vec<Value>,

    #[serde(default, alias = "next")]
    next_href: Option<String>,
}

/// HTTP implementation of [`SoundCloudApi`] against the public v2 API
pub struct SoundCloudClient {
    client: Client,
    /// Same settings, but never follows redirects (short link expansion)
    no_redirect: Client,
    base_url: Url,
    web_url: String,
    client_id: OnceCell<String>,
    metrics: MetricsCollector,
}

impl SoundCloudClient {
    pub fn new(settings: &ApiSettings, metrics: MetricsCollector) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json, text/plain, */*"));

        let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers.clone())
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let no_redirect = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(settings.base_url.trim_end_matches('/'))
            .context(format!("Invalid API base URL: {}", settings.base_url))?;

        Ok(Self {
            client,
            no_redirect,
            base_url,
            web_url: settings.web_url.clone(),
            client_id: OnceCell::new_with(settings.client_id.clone()),
            metrics,
        })
    }

    /// Configured client id, or one discovered from the web player on first use
    async fn client_id(&self) -> Result<&str, FetchError> {
        self.client_id
            .get_or_try_init(|| discover_client_id(&self.client, &self.web_url))
            .await
            .map(String::as_str)
    }

    fn api_url(&self, path: &str) -> Result<Url, FetchError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))
            .map_err(|e| FetchError::Decode(format!("bad API URL for {}: {}", path, e)))
    }

    /// GET `url` (client id appended) and decode the JSON body
    async fn get_json<T: DeserializeOwned>(&self, label: &str, mut url: Url) -> Result<T, FetchError> {
        let client_id = self.client_id().await?.to_string();
        if !url.query_pairs().any(|(k, _)| k == "client_id") {
            url.query_pairs_mut().append_pair("client_id", &client_id);
        }

        debug!("GET {} {}", label, url.path());
        let timer = self.metrics.start_timer();

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_request(label, timer.end(), None).await;
                return Err(FetchError::from_reqwest(e));
            }
        };

        let status = response.status();
        self.metrics.record_request(label, timer.end(), Some(status.as_u16())).await;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.path().to_string(),
            });
        }

        response.json::<T>().await.map_err(FetchError::from_reqwest)
    }

    fn collection_url(&self, endpoint: &PageEndpoint, offset: u32, limit: u32) -> Result<Url, FetchError> {
        let mut url = match endpoint {
            PageEndpoint::Search { scope, query } => {
                let mut url = self.api_url(scope.api_path())?;
                url.query_pairs_mut().append_pair("q", query);
                url
            }
            PageEndpoint::Comments { track_id } => {
                let mut url = self.api_url(&format!("tracks/{}/comments", track_id))?;
                url.query_pairs_mut()
                    .append_pair("threaded", "0")
                    .append_pair("filter_replies", "0");
                url
            }
            PageEndpoint::Resolve { url } => {
                let mut resolve = self.api_url("resolve")?;
                resolve.query_pairs_mut().append_pair("url", url);
                return Ok(resolve);
            }
        };
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("linked_partitioning", "1");
        Ok(url)
    }
}

fn endpoint_label(endpoint: &PageEndpoint) -> &'static str {
    match endpoint {
        PageEndpoint::Resolve { .. } => "resolve",
        PageEndpoint::Search { .. } => "search",
        PageEndpoint::Comments { .. } => "comments",
    }
}

/// Parse a `Retry-After` header given in seconds
fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl SoundCloudApi for SoundCloudClient {
    async fn fetch_page(
        &self,
        endpoint: &PageEndpoint,
        position: &CursorPosition,
        limit: u32,
    ) -> Result<ApiPage, FetchError> {
        let label = endpoint_label(endpoint);

        if let PageEndpoint::Resolve { .. } = endpoint {
            let object: Value = self.get_json(label, self.collection_url(endpoint, 0, limit)?).await?;
            return Ok(ApiPage {
                collection: vec![object],
                next_href: None,
            });
        }

        let url = match position {
            CursorPosition::Offset(offset) => self.collection_url(endpoint, *offset, limit)?,
            CursorPosition::Token(href) => Url::parse(href)
                .map_err(|e| FetchError::Decode(format!("bad next_href {}: {}", href, e)))?,
        };

        let body: PageBody = self.get_json(label, url).await?;
        Ok(ApiPage {
            collection: body.collection,
            next_href: body.next_href.filter(|h| !h.is_empty()),
        })
    }

    async fn expand_short_link(&self, url: &str) -> Result<String, FetchError> {
        let timer = self.metrics.start_timer();
        let response = match self.no_redirect.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_request("short_link", timer.end(), None).await;
                return Err(FetchError::from_reqwest(e));
            }
        };
        let status = response.status();
        self.metrics.record_request("short_link", timer.end(), Some(status.as_u16())).await;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_redirection() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| FetchError::Decode(format!("redirect from {} has no Location", url)))?;

        // Location may be relative to the short link host
        let target = response
            .url()
            .join(location)
            .map_err(|e| FetchError::Decode(format!("bad redirect target {}: {}", location, e)))?;

        debug!("Expanded short link {} -> {}", url, target);
        Ok(target.to_string())
    }

    async fn fetch_tracks(&self, ids: &[u64]) -> Result<Vec<Value>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
        let mut url = self.api_url("tracks")?;
        url.query_pairs_mut().append_pair("ids", &ids);
        self.get_json("tracks", url).await
    }
}
