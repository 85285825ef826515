//! Pipeline configuration.
//!
//! Everything here has a default, so the binary runs without a config file.
//! An optional YAML file (see `prefetch.example.yaml`) overrides any subset
//! of fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::time::Duration;
use tracing::{info, instrument};

/// A Google News edition: interface language, country and edition id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Geo {
    pub hl: String,
    pub gl: String,
    pub ceid: String,
}

impl Geo {
    pub fn new(hl: &str, gl: &str, ceid: &str) -> Self {
        Self {
            hl: hl.to_string(),
            gl: gl.to_string(),
            ceid: ceid.to_string(),
        }
    }
}

impl Default for Geo {
    fn default() -> Self {
        Geo::new("en-US", "US", "US:en")
    }
}

/// One news category and how to search for it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Category {
    /// Topic key stored on every article (e.g. `business-economy`).
    pub key: String,
    pub label: String,
    pub queries: Vec<String>,
    /// Geo targets in priority order. Empty means the default geo only.
    #[serde(default)]
    pub geos: Vec<Geo>,
}

impl Category {
    fn new(key: &str, label: &str, queries: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
            geos: Vec::new(),
        }
    }

    fn with_geos(mut self, geos: Vec<Geo>) -> Self {
        self.geos = geos;
        self
    }

    /// Geo targets to query, falling back to `default` when none are set.
    pub fn geo_targets(&self, default: &Geo) -> Vec<Geo> {
        if self.geos.is_empty() {
            vec![default.clone()]
        } else {
            self.geos.clone()
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub categories: Vec<Category>,
    pub default_geo: Geo,
    /// Maximum articles kept per category fetch.
    pub max_articles_per_category: usize,
    /// Articles resolved concurrently per browser batch.
    pub resolve_batch_size: usize,
    pub feed_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub redirect_settle_secs: u64,
    pub fetch_attempts: usize,
    /// Linear backoff step; the n-th retry waits `n * step`.
    pub backoff_step_millis: u64,
    pub youtube_playlist_id: String,
    pub youtube_channel_id: String,
    /// Blog feed URLs tried in order until one yields items.
    pub blog_feed_urls: Vec<String>,
    /// Browser executables tried in order before falling back to `PATH`.
    pub browser_paths: Vec<String>,
    /// Per-topic fallback image pools. Topics not listed get a generated pool.
    pub fallback_images: BTreeMap<String, Vec<String>>,
    pub fallback_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home_africa = vec![Geo::new("en-ZA", "ZA", "ZA:en"), Geo::default()];
        let home_india = vec![Geo::new("en-IN", "IN", "IN:en"), Geo::default()];

        Self {
            categories: vec![
                Category::new("world", "World", &["world news", "international affairs"]),
                Category::new(
                    "business-economy",
                    "Business & Economy",
                    &["business news", "economy", "stock market"],
                ),
                Category::new("technology", "Technology", &["technology news", "artificial intelligence"]),
                Category::new("science", "Science", &["science news", "space exploration"]),
                Category::new("health", "Health", &["health news", "medical research"]),
                Category::new("politics", "Politics", &["politics", "elections"]),
                Category::new("sports", "Sports", &["sports news"]),
                Category::new("entertainment", "Entertainment", &["entertainment news", "movies"]),
                Category::new("environment", "Environment", &["climate change", "environment news"]),
                Category::new("africa", "Africa", &["africa news"]).with_geos(home_africa),
                Category::new("india", "India", &["india news"]).with_geos(home_india),
            ],
            default_geo: Geo::default(),
            max_articles_per_category: 50,
            resolve_batch_size: 5,
            feed_timeout_secs: 15,
            navigation_timeout_secs: 30,
            redirect_settle_secs: 8,
            fetch_attempts: 3,
            backoff_step_millis: 1000,
            youtube_playlist_id: String::new(),
            youtube_channel_id: String::new(),
            blog_feed_urls: Vec::new(),
            browser_paths: vec![
                "/usr/bin/chromium".to_string(),
                "/usr/bin/google-chrome-stable".to_string(),
            ],
            fallback_images: BTreeMap::new(),
            fallback_pool_size: 3,
        }
    }
}

impl Config {
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn redirect_settle(&self) -> Duration {
        Duration::from_secs(self.redirect_settle_secs)
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_millis)
    }

    /// Fallback image pool for a topic.
    ///
    /// Configured pools win; otherwise the pool is
    /// `/images/fallback/<topic>-<n>.jpg` for `n` in `1..=fallback_pool_size`.
    pub fn fallback_pool(&self, topic: &str) -> Vec<String> {
        if let Some(pool) = self.fallback_images.get(topic).filter(|p| !p.is_empty()) {
            return pool.clone();
        }
        let topic = if topic.is_empty() { "news" } else { topic };
        (1..=self.fallback_pool_size.max(1))
            .map(|n| format!("/images/fallback/{topic}-{n}.jpg"))
            .collect()
    }
}

/// Load configuration from an optional YAML file.
///
/// # Errors
///
/// Returns an error when the file was given but cannot be read or parsed.
#[instrument(level = "info")]
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(Config::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&raw)?;
    info!(categories = config.categories.len(), "Loaded configuration");
    Ok(config)
}
