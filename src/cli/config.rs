use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Environment variable that overrides the configured client id
pub const CLIENT_ID_ENV: &str = "SOUNDCLOUD_CLIENT_ID";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScraperConfig {
    pub api: ApiSettings,
    pub scraper: ScraperSettings,
    pub retry: RetrySettings,
}

/// Upstream API settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub web_url: String,
    pub client_id: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// Defaults for each scrape run; the input file and CLI flags override them
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScraperSettings {
    pub include_comments: bool,
    pub end_page: Option<i64>,
    pub max_items: Option<i64>,
    pub max_comments: Option<i64>,
    pub concurrency: usize,
    pub search_page_size: u32,
    pub comment_page_size: u32,
}

/// Backoff settings for page fetches
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: f64,
    pub max_delay_ms: u64,
    pub max_rate_limit_waits: u32,
    pub max_retry_after_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api-v2.soundcloud.com".to_string(),
            web_url: "https://soundcloud.com".to_string(),
            client_id: None,
            user_agent: "SoundCloudScraper/1.0".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            include_comments: true,
            end_page: None,
            max_items: None,
            max_comments: None,
            concurrency: 4,
            search_page_size: 50,
            comment_page_size: 200,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_factor: 2.0,
            jitter: 0.2,
            max_delay_ms: 30_000,
            max_rate_limit_waits: 5,
            max_retry_after_secs: 120,
        }
    }
}

impl ScraperConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "soundcloud-scraper", "soundcloud-scraper") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the configuration from `path`, or the default location.
    ///
    /// A missing default file is created; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };
        config.apply_env();
        Ok(config)
    }

    /// Load the default configuration
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            if let Err(e) = config.save_as_default() {
                error!("Failed to write default configuration: {:#}", e);
            }
            Ok(config)
        }
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Environment overrides
    fn apply_env(&mut self) {
        if let Ok(client_id) = std::env::var(CLIENT_ID_ENV) {
            if !client_id.trim().is_empty() {
                self.api.client_id = Some(client_id.trim().to_string());
            }
        }
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<PathBuf> {
        let config_path = Self::default_path();
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    /// Save the configuration to a file
    fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

/// Input file listing the URLs of one run and its per-run options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    #[serde(default, alias = "url_list")]
    pub urls: Vec<String>,
    pub end_page: Option<i64>,
    pub max_items: Option<i64>,
    pub max_comments: Option<i64>,
    pub include_comments: Option<bool>,
}

impl RunInput {
    /// Load an input file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading input from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Input file not found at: {}", path.display()))?;

        let input: Self = serde_json::from_str(&contents)
            .context(format!("Failed to parse input file: {}", path.display()))?;

        Ok(input)
    }
}
