//! Data models for articles, videos, the URL cache and the persisted documents.
//!
//! This module defines the structures written to and read from the data
//! directory:
//! - [`Article`]: A news item from a category search, the blog feed or a custom section
//! - [`Video`]: A YouTube feed entry
//! - [`CacheEntry`]: A resolved redirect link and its preview image
//! - [`PrefetchedDocument`]: The aggregate document consumed by the front-end
//! - [`CustomSection`] / [`CustomSectionsDocument`]: Editor-curated sections
//!
//! Field names are camelCase on disk to match what the front-end reads.

use serde::{Deserialize, Serialize};

/// A single news article.
///
/// `image_url` and `url` are rewritten in place by the resolver and by the
/// fallback-image pass. An empty `image_url` means no image has been found yet.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    /// Synthesized `<prefix>-<index>` identifier, unique within one batch.
    pub id: String,
    pub title: String,
    /// Plain-text description, or the title when the feed has none.
    pub summary: String,
    /// Category key (e.g. `business-economy`) or `tdaai` for blog posts.
    pub topic: String,
    /// Publisher label.
    pub source: String,
    /// Raw publication date string exactly as the feed gave it.
    pub date: String,
    pub image_url: String,
    pub url: String,
}

impl Article {
    /// Whether the article still needs an image.
    pub fn has_image(&self) -> bool {
        !self.image_url.trim().is_empty()
    }
}

/// A YouTube video from a playlist or channel feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Video {
    pub id: String,
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    pub published_at: String,
    pub description: String,
    pub channel_title: String,
}

/// A cached redirect resolution, keyed by the article id found in the
/// redirect URL path.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheEntry {
    pub resolved_url: String,
    pub image_url: String,
}

/// The aggregate document holding everything the front-end renders.
///
/// Always replaced whole on write.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrefetchedDocument {
    /// RFC 3339 timestamp of the last write.
    pub fetched_at: String,
    pub playlist_url: String,
    pub news: Vec<Article>,
    pub channel_videos: Vec<Video>,
    pub tdaai_articles: Vec<Article>,
}

/// An editor-curated section whose articles come from an external
/// collection page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomSection {
    pub id: String,
    pub title: String,
    pub color: String,
    pub page_url: String,
    pub collection_slug: String,
    pub articles: Vec<Article>,
}

/// On-disk wrapper for the custom sections file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CustomSectionsDocument {
    pub sections: Vec<CustomSection>,
}
