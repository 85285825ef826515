//! # News Prefetch
//!
//! Populates the JSON documents a static news site reads at build and run
//! time: Google News search results per category, channel videos, blog posts
//! and editor-curated sections scraped from collection pages.
//!
//! ## Features
//!
//! - Multi-query, multi-geo category search with a recent pass and an
//!   all-time pass, deduplicated by title and capped per category
//! - Google News redirect links resolved to publisher URLs in a headless
//!   browser, with the publisher's preview image
//! - A persistent URL cache so a link is resolved in the browser once
//! - Deterministic fallback images for articles without a usable one
//! - Time-sliced rotation so each scheduled run touches a single slot
//!
//! ## Usage
//!
//! ```sh
//! news_prefetch            # current rotation slot
//! news_prefetch --full     # every slot, e.g. at deploy time
//! ```
//!
//! ## Architecture
//!
//! 1. **Schedule**: pick the slot for the current 10-minute window (or all of them)
//! 2. **Fetch**: search feeds, video feeds, blog feed or collection pages
//! 3. **Resolve**: cache first, then the browser in batches of 5
//! 4. **Output**: merge into the aggregate document and write it back

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod config;
mod error;
mod feed;
mod images;
mod models;
mod outputs;
mod pipeline;
mod resolver;
mod retry;
mod schedule;
mod scrapers;
mod utils;

use cli::Cli;
use pipeline::{DataPaths, Pipeline};
use resolver::browser::LazyBrowser;
use retry::{HttpFetcher, RetryFetch};
use schedule::{Slot, all_slots, slot_for, total_slots};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Prefetch failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("news_prefetch starting up");

    let args = Cli::parse();
    debug!(full = args.full, data_dir = %args.data_dir, config = ?args.config, "Parsed CLI arguments");

    let config = config::load_config(args.config.as_deref())?;

    // Early check: the data directory must be writable before any fetching
    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let slots: Vec<Slot> = if args.full {
        all_slots(config.categories.len())
    } else {
        vec![slot_for(Utc::now(), config.categories.len())]
    };
    info!(
        full = args.full,
        slots = %slots.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        cycle_slots = total_slots(config.categories.len()),
        "Selected work"
    );

    let fetcher = RetryFetch::new(
        HttpFetcher::new(config.feed_timeout())?,
        config.fetch_attempts,
        config.backoff_step(),
    );
    let mut browser = LazyBrowser::new(&config);

    let mut pipeline = Pipeline::open(&config, &fetcher, &mut browser, DataPaths::new(&args.data_dir)).await;
    let outcome = pipeline.run(&slots).await;
    let report = pipeline.report.clone();
    drop(pipeline);

    // The browser is closed whether or not the run succeeded
    browser.close().await;
    outcome?;

    let elapsed = start_time.elapsed();
    info!(
        slots = report.slots_run,
        categories = report.categories_fetched,
        articles = report.articles,
        queries_failed = report.queries_failed,
        cache_hits = report.resolution.cache_hits,
        resolved = report.resolution.resolved,
        resolve_failed = report.resolution.failed,
        resolve_skipped = report.resolution.skipped,
        fallback_images = report.fallback_images,
        videos = report.videos,
        blog_articles = report.blog_articles,
        sections_updated = report.sections_updated,
        elapsed_secs = elapsed.as_secs_f64(),
        "news_prefetch finished"
    );

    Ok(())
}
