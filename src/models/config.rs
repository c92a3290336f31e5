//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FeedSource;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and fetch behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Geocoding provider settings
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Upstream feed definitions
    #[serde(default = "defaults::default_feeds")]
    pub feeds: Vec<FeedConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.geocoder.endpoint.trim().is_empty() {
            return Err(AppError::validation("geocoder.endpoint is empty"));
        }
        url::Url::parse(&self.geocoder.endpoint)?;
        if self.feeds.is_empty() {
            return Err(AppError::validation("No feeds defined"));
        }
        for feed in &self.feeds {
            if feed.key.trim().is_empty() {
                return Err(AppError::validation("feed key is empty"));
            }
            if feed.ttl_secs == 0 {
                return Err(AppError::validation(format!(
                    "feed '{}': ttl_secs must be > 0",
                    feed.key
                )));
            }
            url::Url::parse(&feed.url)?;
        }
        Ok(())
    }

    /// Look up a feed definition by key.
    pub fn feed(&self, key: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.key == key)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            geocoder: GeocoderConfig::default(),
            feeds: defaults::default_feeds(),
        }
    }
}

/// HTTP client and fetch behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between geocoding provider calls in milliseconds
    #[serde(default = "defaults::geocode_delay")]
    pub geocode_delay_ms: u64,

    /// Maximum feeds refreshed concurrently by `refresh_all`
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            geocode_delay_ms: defaults::geocode_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Geocoding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Provider endpoint URL
    #[serde(default = "defaults::geocoder_endpoint")]
    pub endpoint: String,

    /// API key. Falls back to the EMBERMAP_GEOCODER_KEY environment
    /// variable when absent.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Qualifier appended to every search to bias results to the region
    #[serde(default = "defaults::region_qualifier")]
    pub region_qualifier: String,
}

impl GeocoderConfig {
    /// Resolve the API key from config or environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("EMBERMAP_GEOCODER_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::geocoder_endpoint(),
            api_key: None,
            region_qualifier: defaults::region_qualifier(),
        }
    }
}

/// One upstream feed definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Cache/tracker identity for this feed
    pub key: String,

    /// Endpoint URL
    pub url: String,

    /// Parsing dialect
    pub source: FeedSource,

    /// Freshness window in seconds
    #[serde(default = "defaults::feed_ttl")]
    pub ttl_secs: u64,
}

mod defaults {
    use super::FeedConfig;
    use crate::models::FeedSource;

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; embermap/1.0)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn geocode_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        3
    }

    // Geocoder defaults
    pub fn geocoder_endpoint() -> String {
        "https://api.geocode.earth/v1/search".into()
    }
    pub fn region_qualifier() -> String {
        "Victoria, Australia".into()
    }

    // Feed defaults
    pub fn feed_ttl() -> u64 {
        60
    }

    pub fn default_feeds() -> Vec<FeedConfig> {
        vec![
            FeedConfig {
                key: "cfa-pager".to_string(),
                url: "https://pager.example.net/messages".to_string(),
                source: FeedSource::Pager,
                ttl_secs: feed_ttl(),
            },
            FeedConfig {
                key: "vic-incidents".to_string(),
                url: "https://data.emergency.vic.gov.au/Show?pageId=getIncidentRSS".to_string(),
                source: FeedSource::VicRss,
                ttl_secs: feed_ttl(),
            },
            FeedConfig {
                key: "nsw-incidents".to_string(),
                url: "https://www.rfs.nsw.gov.au/feeds/majorIncidents.xml".to_string(),
                source: FeedSource::NswRss,
                ttl_secs: feed_ttl(),
            },
        ]
    }
}
