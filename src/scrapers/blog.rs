//! Third-party blog feed ingest (stored as `tdaaiArticles`).
//!
//! The blog has moved its feed more than once, so several candidate URLs are
//! configured and tried in order. The first one that yields at least one
//! item wins. RSS `<item>` and Atom `<entry>` payloads are both accepted.

use super::{article_from_entry, number_articles};
use crate::config::Config;
use crate::feed::parse_entries;
use crate::models::Article;
use crate::retry::FetchAsync;
use tracing::{info, instrument, warn};

/// Topic key and id prefix for blog posts.
pub const BLOG_TOPIC: &str = "tdaai";

/// Parse a blog feed body into articles (RSS first, then Atom).
pub fn parse_blog_feed(xml: &str, cap: usize) -> Vec<Article> {
    let mut entries = parse_entries(xml, "item");
    if entries.is_empty() {
        entries = parse_entries(xml, "entry");
    }
    let mut articles: Vec<Article> = entries
        .iter()
        .filter_map(|e| article_from_entry(e, BLOG_TOPIC))
        .take(cap)
        .collect();
    number_articles(&mut articles, BLOG_TOPIC);
    articles
}

/// Try each configured feed URL in order; empty when all fail.
#[instrument(level = "info", skip_all, fields(candidates = config.blog_feed_urls.len()))]
pub async fn fetch_blog_articles<F: FetchAsync>(fetcher: &F, config: &Config) -> Vec<Article> {
    for url in &config.blog_feed_urls {
        match fetcher.fetch(url).await {
            Ok(body) => {
                let articles = parse_blog_feed(&body, config.max_articles_per_category);
                if !articles.is_empty() {
                    info!(%url, count = articles.len(), "Fetched blog articles");
                    return articles;
                }
                warn!(%url, "Blog feed had no usable items; trying next candidate");
            }
            Err(e) => warn!(%url, error = %e, "Blog feed fetch failed; trying next candidate"),
        }
    }
    if config.blog_feed_urls.is_empty() {
        info!("No blog feeds configured; skipping");
    }
    Vec::new()
}
