//! Content sources feeding the aggregate document.
//!
//! | Source | Module | Method | Output |
//! |--------|--------|--------|--------|
//! | Google News search | [`google_news`] | RSS, per category, multi-query, multi-geo | `news` |
//! | YouTube | [`youtube`] | Atom playlist/channel feed | `channelVideos` |
//! | Blog | [`blog`] | RSS/Atom, candidate URLs in order | `tdaaiArticles` |
//! | Custom sections | [`collections`] | HTML collection pages | custom sections file |
//!
//! Every source fetches through [`crate::retry::FetchAsync`] and treats a
//! failed request as "nothing from here", never as a reason to stop.

pub mod blog;
pub mod collections;
pub mod google_news;
pub mod youtube;

use crate::feed::{FeedEntry, first_img_src, strip_html};
use crate::images::best_image;
use crate::models::Article;
use crate::utils::host_label;

/// Normalize one RSS `<item>` or Atom `<entry>` into an [`Article`].
///
/// Returns `None` when the entry has no title or no link. The `id` is left
/// empty; callers number articles once the batch is final.
pub(crate) fn article_from_entry(entry: &FeedEntry, topic: &str) -> Option<Article> {
    let mut title = strip_html(entry.text("title")?);
    if title.is_empty() {
        return None;
    }

    let url = entry
        .text("link")
        .or_else(|| {
            entry.attr_where("link", "href", |e| {
                e.attr("rel").is_none_or(|rel| rel == "alternate")
            })
        })?
        .to_string();

    let source = entry
        .text("source")
        .map(str::to_string)
        .or_else(|| entry.text("name").map(str::to_string))
        .or_else(|| host_label(&url))
        .unwrap_or_default();

    // Google News appends " - Publisher" to every headline.
    if !source.is_empty() {
        if let Some(stripped) = title.strip_suffix(&format!(" - {source}")) {
            title = stripped.trim_end().to_string();
        }
    }

    let description = entry
        .text("description")
        .or_else(|| entry.text("content:encoded"))
        .or_else(|| entry.text("summary"))
        .or_else(|| entry.text("content"))
        .unwrap_or_default();

    let summary = match strip_html(description) {
        s if s.is_empty() => title.clone(),
        s => s,
    };

    let date = entry
        .text("pubDate")
        .or_else(|| entry.text("published"))
        .or_else(|| entry.text("updated"))
        .or_else(|| entry.text("dc:date"))
        .unwrap_or_default()
        .to_string();

    let inline_img = first_img_src(description);
    let image_url = best_image([
        entry.attr("media:content", "url"),
        entry.attr("enclosure", "url"),
        inline_img.as_deref(),
    ])
    .unwrap_or_default();

    Some(Article {
        id: String::new(),
        title,
        summary,
        topic: topic.to_string(),
        source,
        date,
        image_url,
        url,
    })
}

/// Assign `<prefix>-<index>` ids in batch order.
pub(crate) fn number_articles(articles: &mut [Article], prefix: &str) {
    for (i, article) in articles.iter_mut().enumerate() {
        article.id = format!("{prefix}-{i}");
    }
}
