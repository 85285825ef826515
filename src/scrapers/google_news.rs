//! Google News search RSS category fetcher.
//!
//! One category is fetched as a grid of searches: every geo target (home
//! region first), then a "last 7 days" pass over every search phrase, then an
//! all-time pass only if the recent pass left the category short of its cap.
//! Titles are deduplicated across the whole grid, first seen wins.
//!
//! # URL Pattern
//!
//! `https://news.google.com/rss/search?q=<query>[+when:7d]&hl=<hl>&gl=<gl>&ceid=<ceid>`
//!
//! Item links point at `news.google.com/rss/articles/<id>` redirect pages;
//! the resolver turns them into publisher URLs later.

use super::{article_from_entry, number_articles};
use crate::config::{Category, Config, Geo};
use crate::feed::parse_entries;
use crate::models::Article;
use crate::retry::FetchAsync;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

const SEARCH_ENDPOINT: &str = "https://news.google.com/rss/search";

/// Which half of the two-pass search is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Restricted to the last 7 days.
    Recent,
    AllTime,
}

/// Outcome counts for one category fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryReport {
    pub topic: String,
    pub queries_ok: usize,
    pub queries_failed: usize,
    pub duplicates: usize,
    pub articles: usize,
}

/// Build a search feed URL.
pub fn search_url(query: &str, geo: &Geo, pass: Pass) -> String {
    let q = match pass {
        Pass::Recent => format!("{query} when:7d"),
        Pass::AllTime => query.to_string(),
    };
    format!(
        "{SEARCH_ENDPOINT}?q={}&hl={}&gl={}&ceid={}",
        urlencoding::encode(&q),
        urlencoding::encode(&geo.hl),
        urlencoding::encode(&geo.gl),
        urlencoding::encode(&geo.ceid),
    )
}

/// Fetch up to `max_articles_per_category` articles for one category.
///
/// Geo targets are queried in priority order. Each runs a recent pass and,
/// while the cap is not reached, an all-time pass over every search phrase.
/// A failed query is logged and counted; the remaining queries still run.
///
/// # Arguments
///
/// * `fetcher` - Feed fetcher, normally a [`crate::retry::RetryFetch`]
/// * `category` - Topic key, search phrases and geo targets
/// * `config` - Supplies the cap and the default geo
///
/// # Returns
///
/// The deduplicated articles with `<topic>-<index>` ids in first-seen order,
/// and a [`CategoryReport`] with query and duplicate counts.
#[instrument(level = "info", skip_all, fields(topic = %category.key))]
pub async fn fetch_category<F: FetchAsync>(
    fetcher: &F,
    category: &Category,
    config: &Config,
) -> (Vec<Article>, CategoryReport) {
    let cap = config.max_articles_per_category;
    let mut report = CategoryReport {
        topic: category.key.clone(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut articles: Vec<Article> = Vec::new();

    'geos: for geo in category.geo_targets(&config.default_geo) {
        for pass in [Pass::Recent, Pass::AllTime] {
            if articles.len() >= cap {
                break 'geos;
            }
            for query in &category.queries {
                if articles.len() >= cap {
                    break;
                }
                let url = search_url(query, &geo, pass);
                match fetcher.fetch(&url).await {
                    Ok(body) => {
                        report.queries_ok += 1;
                        let before = articles.len();
                        report.duplicates +=
                            collect_items(&body, &category.key, cap, &mut seen, &mut articles);
                        debug!(
                            %query,
                            gl = %geo.gl,
                            ?pass,
                            added = articles.len() - before,
                            "Search feed parsed"
                        );
                    }
                    Err(e) => {
                        report.queries_failed += 1;
                        warn!(%query, gl = %geo.gl, ?pass, error = %e, "Search query failed; continuing");
                    }
                }
            }
        }
    }

    number_articles(&mut articles, &category.key);
    report.articles = articles.len();
    info!(
        label = %category.label,
        articles = report.articles,
        queries_ok = report.queries_ok,
        queries_failed = report.queries_failed,
        duplicates = report.duplicates,
        "Fetched category"
    );
    (articles, report)
}

/// Append new items from one feed body, stopping at `cap`.
///
/// Returns how many items were dropped as duplicate titles.
fn collect_items(
    body: &str,
    topic: &str,
    cap: usize,
    seen: &mut HashSet<String>,
    out: &mut Vec<Article>,
) -> usize {
    let mut duplicates = 0;
    for entry in parse_entries(body, "item") {
        if out.len() >= cap {
            break;
        }
        let Some(article) = article_from_entry(&entry, topic) else {
            continue;
        };
        if seen.insert(article.title.clone()) {
            out.push(article);
        } else {
            duplicates += 1;
        }
    }
    duplicates
}
