use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::FetchError;

/// Look up the public client id embedded in the web player's script bundles.
///
/// The id is only needed for anonymous API access; bundles are checked last
/// to first since the id lives in one of the application bundles loaded last.
pub async fn discover_client_id(client: &Client, web_url: &str) -> Result<String, FetchError> {
    debug!("Discovering client id from {}", web_url);

    let html = get_text(client, web_url).await?;
    let scripts = script_urls(&html)?;
    if scripts.is_empty() {
        return Err(FetchError::ClientId(format!("no script bundles found on {}", web_url)));
    }

    for src in scripts.iter().rev() {
        let body = get_text(client, src).await?;
        if let Some(id) = find_client_id(&body) {
            info!("Discovered client id from {}", src);
            return Ok(id);
        }
    }

    Err(FetchError::ClientId("no client_id found in script bundles".to_string()))
}

async fn get_text(client: &Client, url: &str) -> Result<String, FetchError> {
    client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(FetchError::from_reqwest)?
        .text()
        .await
        .map_err(FetchError::from_reqwest)
}

fn script_urls(html: &str) -> Result<Vec<String>, FetchError> {
    let pattern = Regex::new(r#"<script[^>]+src="(https?://[^"]+\.js)""#)
        .map_err(|e| FetchError::ClientId(e.to_string()))?;

    Ok(pattern
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect())
}

fn find_client_id(script: &str) -> Option<String> {
    let pattern = Regex::new(r#"client_id\s*[:=]\s*"([A-Za-z0-9]{16,})""#).ok()?;
    pattern
        .captures(script)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
