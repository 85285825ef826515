//! Merging fresh results into the aggregate document.
//!
//! A category fetch replaces exactly that category's articles: everything
//! with the same topic is dropped, the new batch is appended, and the whole
//! list is re-sorted newest first. Dates that do not parse sort as the Unix
//! epoch, i.e. last.

use crate::models::{Article, PrefetchedDocument, Video};
use crate::utils::parse_pub_date;
use tracing::{info, instrument};

/// Replace `topic`'s articles in `news` with `fresh`, then sort by date.
pub fn merge_by_topic(news: &mut Vec<Article>, topic: &str, fresh: Vec<Article>) {
    news.retain(|a| a.topic != topic);
    news.extend(fresh);
    sort_newest_first(news);
}

/// Stable sort, newest first; unparseable dates last.
pub fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by_key(|a| std::cmp::Reverse(parse_pub_date(&a.date)));
}

/// Apply a category batch to the document.
///
/// An empty batch leaves the existing articles alone so a failed fetch never
/// wipes a category.
#[instrument(level = "info", skip_all, fields(%topic, fresh = fresh.len()))]
pub fn apply_category(doc: &mut PrefetchedDocument, topic: &str, fresh: Vec<Article>) -> bool {
    if fresh.is_empty() {
        info!("Empty batch; keeping existing articles");
        return false;
    }
    merge_by_topic(&mut doc.news, topic, fresh);
    info!(total = doc.news.len(), "Merged category into aggregate");
    true
}

/// Replace the channel videos when the fetch produced any.
pub fn apply_videos(doc: &mut PrefetchedDocument, videos: Vec<Video>, playlist_url: Option<String>) -> bool {
    if let Some(url) = playlist_url {
        doc.playlist_url = url;
    }
    if videos.is_empty() {
        return false;
    }
    doc.channel_videos = videos;
    true
}

/// Replace the blog articles when the fetch produced any.
pub fn apply_blog(doc: &mut PrefetchedDocument, mut articles: Vec<Article>) -> bool {
    if articles.is_empty() {
        return false;
    }
    sort_newest_first(&mut articles);
    doc.tdaai_articles = articles;
    true
}
