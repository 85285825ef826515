//! Slot execution: fetch, resolve, merge and persist.
//!
//! A [`Pipeline`] owns the in-memory aggregate document and URL cache for
//! one invocation. Each slot mutates them and writes the affected files
//! before the next slot starts, so a crash mid-way through a full run keeps
//! everything finished so far.

use crate::cache::UrlCache;
use crate::config::Config;
use crate::images::assign_fallback_images;
use crate::models::{CustomSectionsDocument, PrefetchedDocument};
use crate::outputs::aggregate::{apply_blog, apply_category, apply_videos};
use crate::outputs::json::{AGGREGATE_FILE, CACHE_FILE, SECTIONS_FILE, read_json_or_default, write_json};
use crate::resolver::browser::BrowserProvider;
use crate::resolver::{ResolveReport, resolve_articles};
use crate::retry::FetchAsync;
use crate::schedule::Slot;
use crate::scrapers::blog::fetch_blog_articles;
use crate::scrapers::collections::refresh_sections;
use crate::scrapers::google_news::fetch_category;
use crate::scrapers::youtube::{fetch_videos, playlist_page_url};
use crate::utils::now_rfc3339;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Totals for one invocation, logged once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub slots_run: usize,
    pub categories_fetched: usize,
    pub articles: usize,
    pub queries_failed: usize,
    pub resolution: ResolveReport,
    pub fallback_images: usize,
    pub videos: usize,
    pub blog_articles: usize,
    pub sections_updated: usize,
}

/// The three documents of a data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub aggregate: PathBuf,
    pub cache: PathBuf,
    pub sections: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            aggregate: dir.join(AGGREGATE_FILE),
            cache: dir.join(CACHE_FILE),
            sections: dir.join(SECTIONS_FILE),
        }
    }
}

/// State shared by every slot of one invocation.
pub struct Pipeline<'a, F, P> {
    config: &'a Config,
    fetcher: &'a F,
    browser: &'a mut P,
    paths: DataPaths,
    doc: PrefetchedDocument,
    cache: UrlCache,
    pub report: RunReport,
}

impl<'a, F, P> Pipeline<'a, F, P>
where
    F: FetchAsync,
    P: BrowserProvider,
{
    /// Read the aggregate document and cache; missing files start empty.
    pub async fn open(config: &'a Config, fetcher: &'a F, browser: &'a mut P, paths: DataPaths) -> Self {
        let doc: PrefetchedDocument = read_json_or_default(&paths.aggregate).await;
        let cache = UrlCache::load(&paths.cache).await;
        if cache.is_empty() {
            info!("URL cache is empty; every redirect link will need the browser");
        }
        info!(
            articles = doc.news.len(),
            videos = doc.channel_videos.len(),
            cached = cache.len(),
            "Pipeline opened"
        );
        Self {
            config,
            fetcher,
            browser,
            paths,
            doc,
            cache,
            report: RunReport::default(),
        }
    }

    /// Run each slot in order.
    ///
    /// # Errors
    ///
    /// Returns the first persistence error; fetch and resolution failures
    /// are counted, not returned.
    pub async fn run(&mut self, slots: &[Slot]) -> Result<(), Box<dyn Error>> {
        for slot in slots {
            self.run_slot(*slot).await?;
        }
        Ok(())
    }

    #[instrument(level = "info", skip_all, fields(%slot))]
    pub async fn run_slot(&mut self, slot: Slot) -> Result<(), Box<dyn Error>> {
        match slot {
            Slot::Category(idx) => self.run_category(idx).await?,
            Slot::Media => self.run_media().await?,
            Slot::CustomArticles => self.run_custom_sections().await?,
        }
        self.report.slots_run += 1;
        Ok(())
    }

    async fn run_category(&mut self, idx: usize) -> Result<(), Box<dyn Error>> {
        let config = self.config;
        let category = config
            .categories
            .get(idx)
            .ok_or_else(|| format!("no category at slot index {idx}"))?;

        let (mut articles, fetched) = fetch_category(self.fetcher, category, config).await;
        self.report.categories_fetched += 1;
        self.report.queries_failed += fetched.queries_failed;
        self.report.articles += articles.len();

        if articles.is_empty() {
            warn!(topic = %category.key, "Category produced no articles; keeping previous ones");
            return Ok(());
        }

        let resolution = resolve_articles(
            &mut articles,
            &mut self.cache,
            &mut *self.browser,
            config.resolve_batch_size,
        )
        .await;
        self.report.resolution.absorb(&resolution);
        self.report.fallback_images += assign_fallback_images(&mut articles, config);

        if apply_category(&mut self.doc, &category.key, articles) {
            self.write_aggregate().await?;
        }
        self.cache.save(&self.paths.cache).await
    }

    async fn run_media(&mut self) -> Result<(), Box<dyn Error>> {
        let videos = fetch_videos(self.fetcher, self.config).await;
        self.report.videos += videos.len();
        let playlist_url = Some(&self.config.youtube_playlist_id)
            .filter(|id| !id.is_empty())
            .map(|id| playlist_page_url(id));
        let mut changed = apply_videos(&mut self.doc, videos, playlist_url);

        let mut posts = fetch_blog_articles(self.fetcher, self.config).await;
        self.report.blog_articles += posts.len();
        if !posts.is_empty() {
            let resolution = resolve_articles(
                &mut posts,
                &mut self.cache,
                &mut *self.browser,
                self.config.resolve_batch_size,
            )
            .await;
            self.report.resolution.absorb(&resolution);
            self.report.fallback_images += assign_fallback_images(&mut posts, self.config);
        }
        changed |= apply_blog(&mut self.doc, posts);

        if changed {
            self.write_aggregate().await?;
        } else {
            info!("No videos or blog posts; aggregate left untouched");
        }
        self.cache.save(&self.paths.cache).await
    }

    async fn run_custom_sections(&mut self) -> Result<(), Box<dyn Error>> {
        let mut sections: CustomSectionsDocument = read_json_or_default(&self.paths.sections).await;
        if sections.sections.is_empty() {
            info!(path = %self.paths.sections.display(), "No custom sections configured; skipping");
            return Ok(());
        }
        let updated = refresh_sections(self.fetcher, &mut sections).await;
        self.report.sections_updated += updated;
        if updated > 0 {
            write_json(&self.paths.sections, &sections).await?;
        }
        Ok(())
    }

    async fn write_aggregate(&mut self) -> Result<(), Box<dyn Error>> {
        self.doc.fetched_at = now_rfc3339();
        write_json(&self.paths.aggregate, &self.doc).await?;
        info!(
            path = %self.paths.aggregate.display(),
            articles = self.doc.news.len(),
            videos = self.doc.channel_videos.len(),
            blog = self.doc.tdaai_articles.len(),
            "Wrote aggregate document"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Category;
    use crate::error::FetchError;
    use crate::models::{Article, CacheEntry, CustomSection};
    use crate::resolver::tests::{FakeNavigator, FakeProvider};
    use crate::scrapers::google_news::{Pass, search_url};
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Serves canned bodies by exact URL; everything else is a 404.
    #[derive(Default)]
    struct MapFetcher {
        bodies: HashMap<String, String>,
        calls: Cell<usize>,
    }

    impl MapFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.to_string());
            self
        }
    }

    impl FetchAsync for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.bodies.get(url).cloned().ok_or_else(|| FetchError::Status {
                status: 404,
                url: url.to_string(),
            })
        }
    }

    fn test_config() -> Config {
        Config {
            categories: vec![Category {
                key: "world".to_string(),
                label: "World".to_string(),
                queries: vec!["world news".to_string()],
                geos: Vec::new(),
            }],
            ..Config::default()
        }
    }

    fn world_url(config: &Config, pass: Pass) -> String {
        search_url("world news", &config.default_geo, pass)
    }

    const WORLD_FEED: &str = r#"<rss><channel>
        <item>
          <title>Summit opens in Geneva - Example Times</title>
          <link>https://news.google.com/rss/articles/GEN1?oc=5</link>
          <pubDate>Tue, 06 May 2025 08:00:00 GMT</pubDate>
          <source url="https://www.example.com">Example Times</source>
        </item>
        <item>
          <title>Rains ease across the region - Daily Example</title>
          <link>https://news.google.com/rss/articles/RAIN2?oc=5</link>
          <pubDate>Tue, 06 May 2025 09:00:00 GMT</pubDate>
          <source url="https://daily.example.org">Daily Example</source>
        </item>
    </channel></rss>"#;

    fn navigator() -> FakeNavigator {
        FakeNavigator::default()
            .with_page(
                "https://news.google.com/rss/articles/GEN1?oc=5",
                "https://www.example.com/geneva-summit",
                r#"<meta property="og:image" content="https://www.example.com/photos/geneva.jpg">"#,
            )
            .with_page(
                "https://news.google.com/rss/articles/RAIN2?oc=5",
                "https://daily.example.org/rains",
                "<html></html>",
            )
    }

    #[tokio::test]
    async fn test_category_slot_resolves_merges_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let fetcher = MapFetcher::default().with(&world_url(&config, Pass::Recent), WORLD_FEED);
        let mut provider = FakeProvider::new(Some(navigator()));

        // An older article from another topic must survive the merge.
        let existing = PrefetchedDocument {
            news: vec![Article {
                id: "science-0".to_string(),
                title: "Old science story".to_string(),
                topic: "science".to_string(),
                date: "Mon, 05 May 2025 08:00:00 GMT".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let paths = DataPaths::new(tmp.path());
        write_json(&paths.aggregate, &existing).await.unwrap();

        let mut pipeline = Pipeline::open(&config, &fetcher, &mut provider, paths.clone()).await;
        pipeline.run_slot(Slot::Category(0)).await.unwrap();
        let report = pipeline.report.clone();

        assert_eq!(report.categories_fetched, 1);
        assert_eq!(report.articles, 2);
        assert_eq!(report.resolution.resolved, 2);
        assert_eq!(report.fallback_images, 1);

        let doc: PrefetchedDocument = read_json_or_default(&paths.aggregate).await;
        assert!(!doc.fetched_at.is_empty());
        let titles: Vec<&str> = doc.news.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Rains ease across the region", "Summit opens in Geneva", "Old science story"]
        );
        assert_eq!(doc.news[1].url, "https://www.example.com/geneva-summit");
        assert_eq!(doc.news[1].image_url, "https://www.example.com/photos/geneva.jpg");
        assert!(doc.news[0].image_url.starts_with("/images/fallback/world-"));

        let cache = UrlCache::load(&paths.cache).await;
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get("GEN1"),
            Some(&CacheEntry {
                resolved_url: "https://www.example.com/geneva-summit".to_string(),
                image_url: "https://www.example.com/photos/geneva.jpg".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_second_run_uses_cache_without_browser() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let fetcher = MapFetcher::default().with(&world_url(&config, Pass::Recent), WORLD_FEED);
        let paths = DataPaths::new(tmp.path());

        let mut provider = FakeProvider::new(Some(navigator()));
        let mut first = Pipeline::open(&config, &fetcher, &mut provider, paths.clone()).await;
        first.run_slot(Slot::Category(0)).await.unwrap();
        let first_doc: PrefetchedDocument = read_json_or_default(&paths.aggregate).await;

        let mut no_browser = FakeProvider::new(None);
        let mut second = Pipeline::open(&config, &fetcher, &mut no_browser, paths.clone()).await;
        second.run_slot(Slot::Category(0)).await.unwrap();
        assert_eq!(second.report.resolution.cache_hits, 2);
        assert_eq!(second.report.resolution.skipped, 0);
        drop(second);
        assert_eq!(no_browser.requests, 0);

        let second_doc: PrefetchedDocument = read_json_or_default(&paths.aggregate).await;
        let urls = |d: &PrefetchedDocument| d.news.iter().map(|a| a.url.clone()).collect::<Vec<_>>();
        assert_eq!(urls(&first_doc), urls(&second_doc));
    }

    #[tokio::test]
    async fn test_failed_category_keeps_previous_articles() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let fetcher = MapFetcher::default();
        let paths = DataPaths::new(tmp.path());
        let existing = PrefetchedDocument {
            fetched_at: "2025-05-01T00:00:00Z".to_string(),
            news: vec![Article {
                id: "world-0".to_string(),
                title: "Yesterday's world story".to_string(),
                topic: "world".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        write_json(&paths.aggregate, &existing).await.unwrap();

        let mut provider = FakeProvider::new(None);
        let mut pipeline = Pipeline::open(&config, &fetcher, &mut provider, paths.clone()).await;
        pipeline.run_slot(Slot::Category(0)).await.unwrap();
        assert_eq!(pipeline.report.queries_failed, 2);

        let doc: PrefetchedDocument = read_json_or_default(&paths.aggregate).await;
        assert_eq!(doc, existing);
    }

    #[tokio::test]
    async fn test_unknown_category_index_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let fetcher = MapFetcher::default();
        let mut provider = FakeProvider::new(None);
        let mut pipeline = Pipeline::open(&config, &fetcher, &mut provider, DataPaths::new(tmp.path())).await;
        assert!(pipeline.run_slot(Slot::Category(7)).await.is_err());
    }

    #[tokio::test]
    async fn test_media_slot_writes_videos_and_blog() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            youtube_playlist_id: "PL123".to_string(),
            blog_feed_urls: vec![
                "https://blog.example.com/feed-old".to_string(),
                "https://blog.example.com/feed".to_string(),
            ],
            ..test_config()
        };
        let videos = r#"<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015">
            <entry>
              <yt:videoId>abc123</yt:videoId>
              <title>Weekly briefing</title>
              <published>2025-05-06T10:00:00+00:00</published>
              <author><name>Example Channel</name></author>
            </entry>
        </feed>"#;
        let blog = r#"<rss><channel><item>
            <title>Notes from the field</title>
            <link>https://blog.example.com/notes</link>
            <pubDate>Tue, 06 May 2025 07:00:00 GMT</pubDate>
        </item></channel></rss>"#;
        let fetcher = MapFetcher::default()
            .with(&crate::scrapers::youtube::playlist_feed_url("PL123"), videos)
            .with("https://blog.example.com/feed", blog);
        let mut provider = FakeProvider::new(None);
        let paths = DataPaths::new(tmp.path());

        let mut pipeline = Pipeline::open(&config, &fetcher, &mut provider, paths.clone()).await;
        pipeline.run_slot(Slot::Media).await.unwrap();
        assert_eq!(pipeline.report.videos, 1);
        assert_eq!(pipeline.report.blog_articles, 1);
        drop(pipeline);
        // Blog links are direct, so the browser is never requested.
        assert_eq!(provider.requests, 0);

        let doc: PrefetchedDocument = read_json_or_default(&paths.aggregate).await;
        assert_eq!(doc.playlist_url, "https://www.youtube.com/playlist?list=PL123");
        assert_eq!(doc.channel_videos[0].video_id, "abc123");
        assert_eq!(doc.tdaai_articles[0].id, "tdaai-0");
        assert!(doc.tdaai_articles[0].image_url.starts_with("/images/fallback/tdaai-"));
    }

    #[tokio::test]
    async fn test_custom_sections_slot_replaces_only_found_articles() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let paths = DataPaths::new(tmp.path());
        let previous = Article {
            id: "kept-0".to_string(),
            title: "Previously scraped".to_string(),
            ..Default::default()
        };
        let sections = CustomSectionsDocument {
            sections: vec![
                CustomSection {
                    id: "climate".to_string(),
                    page_url: "https://site.example.com/collections/climate".to_string(),
                    collection_slug: "climate".to_string(),
                    ..Default::default()
                },
                CustomSection {
                    id: "kept".to_string(),
                    page_url: "https://site.example.com/collections/down".to_string(),
                    collection_slug: "down".to_string(),
                    articles: vec![previous.clone()],
                    ..Default::default()
                },
            ],
        };
        write_json(&paths.sections, &sections).await.unwrap();

        let page = r#"<html><body>
            <a href="/collections/climate/heat-records"><h3>Heat records fall</h3></a>
        </body></html>"#;
        let fetcher = MapFetcher::default().with("https://site.example.com/collections/climate", page);
        let mut provider = FakeProvider::new(None);

        let mut pipeline = Pipeline::open(&config, &fetcher, &mut provider, paths.clone()).await;
        pipeline.run_slot(Slot::CustomArticles).await.unwrap();
        assert_eq!(pipeline.report.sections_updated, 1);

        let stored: CustomSectionsDocument = read_json_or_default(&paths.sections).await;
        assert_eq!(stored.sections[0].articles[0].title, "Heat records fall");
        assert_eq!(
            stored.sections[0].articles[0].url,
            "https://site.example.com/collections/climate/heat-records"
        );
        assert_eq!(stored.sections[1].articles, vec![previous]);
    }

    #[tokio::test]
    async fn test_full_run_covers_every_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let fetcher = MapFetcher::default().with(&world_url(&config, Pass::Recent), WORLD_FEED);
        let mut provider = FakeProvider::new(Some(navigator()));

        let mut pipeline = Pipeline::open(&config, &fetcher, &mut provider, DataPaths::new(tmp.path())).await;
        let slots = crate::schedule::all_slots(config.categories.len());
        pipeline.run(&slots).await.unwrap();

        assert_eq!(pipeline.report.slots_run, 3);
        assert_eq!(pipeline.report.categories_fetched, 1);
    }
}
