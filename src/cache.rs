//! Persistent cache of resolved Google News redirect links.
//!
//! Keys are the opaque article ids taken from the redirect URL path
//! (`/rss/articles/<id>`), values the publisher URL and preview image found
//! by the browser. Entries never expire.

use crate::models::CacheEntry;
use crate::outputs::json::{read_json_or_default, write_json};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

static ARTICLE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:rss/)?(?:articles|read)/([A-Za-z0-9_-]+)").unwrap());

/// Host of the redirect links that need resolving.
pub const REDIRECT_HOST: &str = "news.google.com";

/// Whether `url` points at the redirect domain.
pub fn is_redirect_url(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(REDIRECT_HOST)))
        .unwrap_or(false)
}

/// Extract the cache key from a redirect link, if it is one.
pub fn cache_key(url: &str) -> Option<String> {
    if !is_redirect_url(url) {
        return None;
    }
    let path = url::Url::parse(url).ok()?.path().to_string();
    ARTICLE_KEY
        .captures(&path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// In-memory view of the cache file.
///
/// Serialized as a sorted JSON object so the file diffs cleanly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlCache {
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl UrlCache {
    /// Load the cache; a missing or malformed file is an empty cache.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let entries: BTreeMap<String, CacheEntry> = read_json_or_default(path.as_ref()).await;
        info!(entries = entries.len(), "Loaded URL cache");
        Self {
            entries,
            dirty: false,
        }
    }

    /// Write the cache back when it changed since load.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn save(&mut self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        if !self.dirty {
            info!("URL cache unchanged; not writing");
            return Ok(());
        }
        write_json(path.as_ref(), &self.entries).await?;
        self.dirty = false;
        info!(entries = self.entries.len(), "Saved URL cache");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
