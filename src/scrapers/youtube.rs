//! YouTube playlist and channel feed ingest.
//!
//! YouTube publishes Atom feeds at
//! `https://www.youtube.com/feeds/videos.xml?playlist_id=<id>` and
//! `...?channel_id=<id>`. The playlist is preferred; the channel feed is the
//! fallback when the playlist yields nothing.

use crate::config::Config;
use crate::feed::{FeedEntry, extract_tag_contents, parse_entries};
use crate::models::Video;
use crate::retry::FetchAsync;
use itertools::Itertools;
use tracing::{info, instrument, warn};

const FEED_ENDPOINT: &str = "https://www.youtube.com/feeds/videos.xml";

pub fn playlist_feed_url(playlist_id: &str) -> String {
    format!("{FEED_ENDPOINT}?playlist_id={}", urlencoding::encode(playlist_id))
}

pub fn channel_feed_url(channel_id: &str) -> String {
    format!("{FEED_ENDPOINT}?channel_id={}", urlencoding::encode(channel_id))
}

/// Public playlist page, stored as `playlistUrl` in the aggregate.
pub fn playlist_page_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", urlencoding::encode(playlist_id))
}

/// Parse an Atom video feed into [`Video`]s, deduplicated by video id.
///
/// Entries without an author take the feed-level author as channel title.
pub fn parse_videos(xml: &str) -> Vec<Video> {
    let feed_author = extract_tag_contents(xml, "name").into_iter().next().unwrap_or_default();
    parse_entries(xml, "entry")
        .iter()
        .filter_map(video_from_entry)
        .unique_by(|v| v.video_id.clone())
        .enumerate()
        .map(|(i, mut v)| {
            v.id = format!("yt-{i}");
            if v.channel_title.is_empty() {
                v.channel_title = feed_author.clone();
            }
            v
        })
        .collect()
}

fn video_from_entry(entry: &FeedEntry) -> Option<Video> {
    let video_id = entry
        .text("yt:videoId")
        .map(str::to_string)
        .or_else(|| entry.attr("link", "href").and_then(video_id_from_link))?;
    let title = entry.text("title")?.to_string();

    let thumbnail = entry
        .attr("media:thumbnail", "url")
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg"));

    Some(Video {
        id: String::new(),
        title,
        thumbnail,
        published_at: entry.text("published").unwrap_or_default().to_string(),
        description: entry.text("media:description").unwrap_or_default().to_string(),
        channel_title: entry.text("name").unwrap_or_default().to_string(),
        video_id,
    })
}

fn video_id_from_link(href: &str) -> Option<String> {
    let parsed = url::Url::parse(href).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Fetch videos for the configured playlist, falling back to the channel.
///
/// Returns an empty list when nothing is configured or every feed failed.
#[instrument(level = "info", skip_all)]
pub async fn fetch_videos<F: FetchAsync>(fetcher: &F, config: &Config) -> Vec<Video> {
    let mut feeds = Vec::new();
    if !config.youtube_playlist_id.is_empty() {
        feeds.push(playlist_feed_url(&config.youtube_playlist_id));
    }
    if !config.youtube_channel_id.is_empty() {
        feeds.push(channel_feed_url(&config.youtube_channel_id));
    }
    if feeds.is_empty() {
        info!("No YouTube playlist or channel configured; skipping");
        return Vec::new();
    }

    for url in feeds {
        match fetcher.fetch(&url).await {
            Ok(body) => {
                let videos = parse_videos(&body);
                if !videos.is_empty() {
                    info!(count = videos.len(), %url, "Fetched YouTube videos");
                    return videos;
                }
                warn!(%url, "YouTube feed had no entries");
            }
            Err(e) => warn!(%url, error = %e, "YouTube feed fetch failed"),
        }
    }
    Vec::new()
}
