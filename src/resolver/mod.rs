//! Redirect-link resolution: Google News links to publisher URLs and images.
//!
//! # Flow
//!
//! 1. Every redirect link with a cache key already in the [`UrlCache`] is
//!    rewritten immediately, no browser involved.
//! 2. The rest go to the browser in batches of `resolve_batch_size`. Each
//!    batch is a join: all members settle before the next batch starts.
//! 3. A resolution counts only when the final address is off the redirect and
//!    consent domains. Successes are cached; failures keep the original link.
//!
//! The browser is requested from a [`BrowserProvider`] only when step 2 has
//! work, so a fully cached category never launches one.

pub mod browser;
pub mod extract;

use crate::cache::{UrlCache, cache_key};
use crate::error::ResolveError;
use crate::images::is_generic_image;
use crate::models::{Article, CacheEntry};
use crate::utils::{host_of, truncate_for_log};
use browser::{BrowserProvider, Navigator};
use extract::{in_page_url, is_blocked_url, preview_image};
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

/// Counts for one resolution phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub cache_hits: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Redirect links left alone because no browser was available.
    pub skipped: usize,
}

impl ResolveReport {
    pub fn absorb(&mut self, other: &ResolveReport) {
        self.cache_hits += other.cache_hits;
        self.resolved += other.resolved;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Rewrite an article from a resolution; an existing image is kept.
fn apply_entry(article: &mut Article, entry: &CacheEntry) {
    if !entry.resolved_url.is_empty() {
        article.url = entry.resolved_url.clone();
    }
    if !article.has_image() && !entry.image_url.is_empty() {
        article.image_url = entry.image_url.clone();
    }
}

/// Apply cached resolutions; return the indices still needing the browser.
pub fn apply_cached(articles: &mut [Article], cache: &UrlCache, report: &mut ResolveReport) -> Vec<usize> {
    let mut pending = Vec::new();
    for (idx, article) in articles.iter_mut().enumerate() {
        let Some(key) = cache_key(&article.url) else {
            continue;
        };
        match cache.get(&key) {
            Some(entry) => {
                apply_entry(article, entry);
                report.cache_hits += 1;
            }
            None => pending.push(idx),
        }
    }
    pending
}

/// Follow one redirect link to a publisher page.
async fn resolve_one<N: Navigator>(navigator: &N, link: &str) -> Result<CacheEntry, ResolveError> {
    let page = navigator.navigate(link).await?;

    if !is_blocked_url(&page.final_url) {
        let image_url = preview_image(&page.html, &page.final_url)
            .filter(|img| !is_generic_image(img))
            .unwrap_or_default();
        return Ok(CacheEntry {
            resolved_url: page.final_url,
            image_url,
        });
    }

    // Still on the interstitial; the publisher URL may be embedded in it.
    match in_page_url(&page.html) {
        Some(url) => Ok(CacheEntry {
            resolved_url: url,
            image_url: String::new(),
        }),
        None => Err(ResolveError::Unresolved(page.final_url)),
    }
}

/// Resolve `pending` articles through `navigator`, in joined batches.
#[instrument(level = "info", skip_all, fields(pending = pending.len(), batch_size = batch_size))]
pub async fn resolve_pending<N: Navigator>(
    articles: &mut [Article],
    pending: &[usize],
    cache: &mut UrlCache,
    navigator: &N,
    batch_size: usize,
    report: &mut ResolveReport,
) {
    for (batch_no, chunk) in pending.chunks(batch_size.max(1)).enumerate() {
        let mut jobs: Vec<(usize, String, String)> = Vec::with_capacity(chunk.len());
        for &idx in chunk {
            let Some(key) = cache_key(&articles[idx].url) else {
                continue;
            };
            // An earlier batch may have resolved the same key.
            if let Some(entry) = cache.get(&key) {
                apply_entry(&mut articles[idx], entry);
                report.cache_hits += 1;
                continue;
            }
            jobs.push((idx, key, articles[idx].url.clone()));
        }

        let outcomes = join_all(jobs.iter().map(|(_, _, link)| resolve_one(navigator, link))).await;

        for ((idx, key, link), outcome) in jobs.into_iter().zip(outcomes) {
            match outcome {
                Ok(entry) => {
                    debug!(%key, host = ?host_of(&entry.resolved_url), "Resolved redirect");
                    apply_entry(&mut articles[idx], &entry);
                    cache.insert(key, entry);
                    report.resolved += 1;
                }
                Err(e) => {
                    warn!(
                        link = %truncate_for_log(&link, 120),
                        error = %e,
                        "Resolution failed; keeping redirect link"
                    );
                    report.failed += 1;
                }
            }
        }
        debug!(batch_no, resolved = report.resolved, failed = report.failed, "Batch settled");
    }
}

/// Resolve every redirect link in `articles`, cache first, browser second.
///
/// Articles are rewritten in place: `url` becomes the publisher URL and
/// `image_url` is filled when it was empty. Links that fail keep their
/// redirect URL. The browser is requested only when some link missed the
/// cache.
///
/// # Arguments
///
/// * `articles` - Batch to rewrite; links off the redirect host are left alone
/// * `cache` - Consulted first and updated with every success
/// * `provider` - Source of the headless browser
/// * `batch_size` - Navigations joined per batch
///
/// # Returns
///
/// A [`ResolveReport`] with cache hits, resolutions, failures and links
/// skipped for lack of a browser.
#[instrument(level = "info", skip_all, fields(count = articles.len()))]
pub async fn resolve_articles<P: BrowserProvider>(
    articles: &mut [Article],
    cache: &mut UrlCache,
    provider: &mut P,
    batch_size: usize,
) -> ResolveReport {
    let mut report = ResolveReport::default();
    let pending = apply_cached(articles, cache, &mut report);

    if !pending.is_empty() {
        match provider.navigator().await {
            Some(navigator) => {
                resolve_pending(articles, &pending, cache, navigator, batch_size, &mut report).await;
            }
            None => report.skipped += pending.len(),
        }
    }

    info!(
        cache_hits = report.cache_hits,
        resolved = report.resolved,
        failed = report.failed,
        skipped = report.skipped,
        "Resolution finished"
    );
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::resolver::browser::NavigatedPage;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Scripted navigator: maps a link to a page, counts navigations and
    /// tracks how many were in flight at once.
    #[derive(Default)]
    pub(crate) struct FakeNavigator {
        pub pages: HashMap<String, NavigatedPage>,
        pub calls: Cell<usize>,
        pub in_flight: Cell<usize>,
        pub max_in_flight: Cell<usize>,
        pub order: RefCell<Vec<String>>,
    }

    impl FakeNavigator {
        pub fn with_page(mut self, link: &str, final_url: &str, html: &str) -> Self {
            self.pages.insert(
                link.to_string(),
                NavigatedPage {
                    final_url: final_url.to_string(),
                    html: html.to_string(),
                },
            );
            self
        }
    }

    impl Navigator for FakeNavigator {
        async fn navigate(&self, url: &str) -> Result<NavigatedPage, ResolveError> {
            self.calls.set(self.calls.get() + 1);
            self.order.borrow_mut().push(url.to_string());
            self.in_flight.set(self.in_flight.get() + 1);
            self.max_in_flight
                .set(self.max_in_flight.get().max(self.in_flight.get()));
            tokio::task::yield_now().await;
            self.in_flight.set(self.in_flight.get() - 1);
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ResolveError::Navigation(format!("no page for {url}")))
        }
    }

    /// Provider handing out a fixed navigator, or none.
    pub(crate) struct FakeProvider {
        pub navigator: Option<FakeNavigator>,
        pub requests: usize,
    }

    impl FakeProvider {
        pub fn new(navigator: Option<FakeNavigator>) -> Self {
            Self {
                navigator,
                requests: 0,
            }
        }
    }

    impl BrowserProvider for FakeProvider {
        type Nav = FakeNavigator;

        async fn navigator(&mut self) -> Option<&FakeNavigator> {
            self.requests += 1;
            self.navigator.as_ref()
        }
    }

    const PUBLISHER_HTML: &str = r#"<html><head>
        <meta property="og:image" content="https://www.example.com/photos/lead.jpg">
    </head></html>"#;

    fn redirect_article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            title: format!("Title {id}"),
            topic: "world".to_string(),
            url: format!("https://news.google.com/rss/articles/{id}?oc=5"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_navigation_and_is_stable() {
        let navigator = FakeNavigator::default().with_page(
            "https://news.google.com/rss/articles/AAA?oc=5",
            "https://www.example.com/world/story",
            PUBLISHER_HTML,
        );
        let mut provider = FakeProvider::new(Some(navigator));
        let mut cache = UrlCache::default();

        let mut first = vec![redirect_article("AAA")];
        let report = resolve_articles(&mut first, &mut cache, &mut provider, 5).await;
        assert_eq!(report.resolved, 1);
        assert_eq!(first[0].url, "https://www.example.com/world/story");
        assert_eq!(first[0].image_url, "https://www.example.com/photos/lead.jpg");

        let mut second = vec![redirect_article("AAA")];
        let report = resolve_articles(&mut second, &mut cache, &mut provider, 5).await;
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.resolved, 0);
        assert_eq!(second[0].url, first[0].url);

        let navigator = provider.navigator.as_ref().unwrap();
        assert_eq!(navigator.calls.get(), 1);
        // The second run never asked for the browser at all.
        assert_eq!(provider.requests, 1);
    }

    #[tokio::test]
    async fn test_cached_image_does_not_overwrite_existing_image() {
        let mut cache = UrlCache::default();
        cache.insert(
            "AAA".to_string(),
            CacheEntry {
                resolved_url: "https://www.example.com/a".to_string(),
                image_url: "https://www.example.com/cached.jpg".to_string(),
            },
        );
        let mut article = redirect_article("AAA");
        article.image_url = "https://feed.example.com/own.jpg".to_string();
        let mut articles = vec![article];

        let mut provider = FakeProvider::new(None);
        resolve_articles(&mut articles, &mut cache, &mut provider, 5).await;
        assert_eq!(articles[0].url, "https://www.example.com/a");
        assert_eq!(articles[0].image_url, "https://feed.example.com/own.jpg");
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_ordered() {
        let mut navigator = FakeNavigator::default();
        let mut articles = Vec::new();
        for i in 0..12 {
            let id = format!("ID{i}");
            let article = redirect_article(&id);
            navigator = navigator.with_page(
                &article.url,
                &format!("https://www.example.com/{i}"),
                "<html></html>",
            );
            articles.push(article);
        }
        let mut provider = FakeProvider::new(Some(navigator));
        let mut cache = UrlCache::default();

        let report = resolve_articles(&mut articles, &mut cache, &mut provider, 5).await;

        assert_eq!(report.resolved, 12);
        let navigator = provider.navigator.as_ref().unwrap();
        assert!(navigator.max_in_flight.get() <= 5);
        assert!(navigator.max_in_flight.get() > 1);
        let order = navigator.order.borrow();
        assert!(order[0].contains("ID0?"));
        assert!(order[11].contains("ID11?"));
        assert_eq!(cache.len(), 12);
    }

    #[tokio::test]
    async fn test_failures_keep_original_link_and_do_not_abort() {
        let navigator = FakeNavigator::default()
            .with_page(
                "https://news.google.com/rss/articles/OK?oc=5",
                "https://www.example.com/ok",
                "<html></html>",
            )
            .with_page(
                "https://news.google.com/rss/articles/STUCK?oc=5",
                "https://news.google.com/rss/articles/STUCK",
                "<html><body>still here</body></html>",
            );
        let mut provider = FakeProvider::new(Some(navigator));
        let mut cache = UrlCache::default();
        let mut articles = vec![
            redirect_article("STUCK"),
            redirect_article("MISSING"),
            redirect_article("OK"),
        ];

        let report = resolve_articles(&mut articles, &mut cache, &mut provider, 5).await;

        assert_eq!(report.resolved, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(articles[0].url, "https://news.google.com/rss/articles/STUCK?oc=5");
        assert_eq!(articles[1].url, "https://news.google.com/rss/articles/MISSING?oc=5");
        assert_eq!(articles[2].url, "https://www.example.com/ok");
        assert!(cache.get("STUCK").is_none());
    }

    #[tokio::test]
    async fn test_consent_page_falls_back_to_in_page_url() {
        let navigator = FakeNavigator::default().with_page(
            "https://news.google.com/rss/articles/CONSENT?oc=5",
            "https://consent.google.com/ml?continue=https://news.google.com/x",
            r#"<html><head><meta property="og:url" content="https://www.example.com/real"></head></html>"#,
        );
        let mut provider = FakeProvider::new(Some(navigator));
        let mut cache = UrlCache::default();
        let mut articles = vec![redirect_article("CONSENT")];

        let report = resolve_articles(&mut articles, &mut cache, &mut provider, 5).await;

        assert_eq!(report.resolved, 1);
        assert_eq!(articles[0].url, "https://www.example.com/real");
        assert_eq!(articles[0].image_url, "");
    }

    #[tokio::test]
    async fn test_no_browser_applies_cache_and_skips_rest() {
        let mut cache = UrlCache::default();
        cache.insert(
            "HIT".to_string(),
            CacheEntry {
                resolved_url: "https://www.example.com/hit".to_string(),
                image_url: String::new(),
            },
        );
        let mut articles = vec![redirect_article("HIT"), redirect_article("MISS")];
        let mut plain = redirect_article("PLAIN");
        plain.url = "https://www.example.com/already-direct".to_string();
        articles.push(plain);

        let mut provider = FakeProvider::new(None);
        let report = resolve_articles(&mut articles, &mut cache, &mut provider, 5).await;

        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(articles[0].url, "https://www.example.com/hit");
        assert!(articles[1].url.starts_with("https://news.google.com/"));
        assert_eq!(articles[2].url, "https://www.example.com/already-direct");
    }

    #[tokio::test]
    async fn test_duplicate_keys_across_batches_navigate_once() {
        let navigator = FakeNavigator::default().with_page(
            "https://news.google.com/rss/articles/DUP?oc=5",
            "https://www.example.com/dup",
            "<html></html>",
        );
        let mut provider = FakeProvider::new(Some(navigator));
        let mut cache = UrlCache::default();
        let mut articles = vec![redirect_article("DUP"), redirect_article("DUP")];

        let report = resolve_articles(&mut articles, &mut cache, &mut provider, 1).await;

        assert_eq!(report.resolved, 1);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(provider.navigator.as_ref().unwrap().calls.get(), 1);
    }
}
