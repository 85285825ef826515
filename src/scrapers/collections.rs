//! Custom-section collection page scraper.
//!
//! Each custom section points at an external collection page
//! (`pageUrl`) and names the collection slug its article links live under.
//! Links are recognized as `<a href>` whose resolved path contains
//! `/<collectionSlug>/` followed by at least one more segment, i.e. pages
//! below the collection rather than the collection itself.

use crate::images::is_generic_image;
use crate::models::{Article, CustomSection, CustomSectionsDocument};
use crate::retry::FetchAsync;
use crate::utils::host_label;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

/// Articles kept per section.
pub const MAX_SECTION_ARTICLES: usize = 12;

/// Extract article cards for `section` from a collection page.
pub fn parse_collection_page(html: &str, section: &CustomSection) -> Vec<Article> {
    let Ok(base) = Url::parse(&section.page_url) else {
        warn!(page_url = %section.page_url, "Invalid section page URL");
        return Vec::new();
    };
    let slug = section.collection_slug.trim_matches('/');
    if slug.is_empty() {
        return Vec::new();
    }
    let marker = format!("/{slug}/");

    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let source = host_label(&section.page_url).unwrap_or_default();

    let articles: Vec<Article> = document
        .select(&anchors)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let resolved = base.join(href).ok()?;
            let path = resolved.path();
            let below = path
                .find(&marker)
                .map(|at| &path[at + marker.len()..])
                .is_some_and(|rest| !rest.trim_matches('/').is_empty());
            if !below {
                return None;
            }
            let title = card_title(&a)?;
            let image_url = card_image(&a)
                .and_then(|src| base.join(&src).ok())
                .map(|u| u.to_string())
                .filter(|u| !is_generic_image(u))
                .unwrap_or_default();
            let mut url = resolved;
            url.set_fragment(None);
            Some(Article {
                id: String::new(),
                summary: title.clone(),
                title,
                topic: section.id.clone(),
                source: source.clone(),
                date: String::new(),
                image_url,
                url: url.to_string(),
            })
        })
        .unique_by(|a| a.url.clone())
        .take(MAX_SECTION_ARTICLES)
        .enumerate()
        .map(|(i, mut a)| {
            a.id = format!("{}-{i}", section.id);
            a
        })
        .collect();

    articles
}

fn card_title(anchor: &ElementRef<'_>) -> Option<String> {
    let headings = Selector::parse("h1, h2, h3, h4").ok()?;
    let text = anchor
        .select(&headings)
        .next()
        .map(|h| h.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| anchor.text().collect::<Vec<_>>().join(" "));
    let title = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn card_image(anchor: &ElementRef<'_>) -> Option<String> {
    let imgs = Selector::parse("img").ok()?;
    anchor.select(&imgs).find_map(|img| {
        let el = img.value();
        el.attr("src")
            .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
            .or_else(|| el.attr("data-src"))
            .map(|s| s.trim().to_string())
    })
}

/// Refresh every section's articles from its collection page.
///
/// Sections whose page fails to load or yields nothing keep their previous
/// articles. Returns the number of sections updated.
#[instrument(level = "info", skip_all, fields(sections = doc.sections.len()))]
pub async fn refresh_sections<F: FetchAsync>(fetcher: &F, doc: &mut CustomSectionsDocument) -> usize {
    let mut updated = 0;
    for section in doc.sections.iter_mut() {
        if section.page_url.is_empty() {
            continue;
        }
        let body = match fetcher.fetch(&section.page_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(section = %section.id, error = %e, "Collection page fetch failed; keeping existing articles");
                continue;
            }
        };
        let articles = parse_collection_page(&body, section);
        if articles.is_empty() {
            warn!(section = %section.id, "No articles found; keeping existing articles");
            continue;
        }
        info!(section = %section.id, count = articles.len(), "Section articles replaced");
        section.articles = articles;
        updated += 1;
    }
    updated
}
