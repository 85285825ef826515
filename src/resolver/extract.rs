//! HTML extraction for the resolver: fallback publisher URLs and preview images.
//!
//! Everything here works on page HTML already captured from the browser, so
//! it is plain synchronous `scraper` code.

use crate::images::is_generic_image;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Hosts that are never an acceptable final address.
pub const BLOCKED_HOSTS: &[&str] = &["news.google.com", "consent.google.com"];

static NOT_CONTENT_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)avatar|logo|icon|sprite|pixel|badge|gravatar").unwrap());

/// Sources for a publisher URL inside an interstitial page, in priority order.
const URL_SOURCES: &[(&str, &str)] = &[
    (r#"link[rel="canonical"]"#, "href"),
    (r#"meta[property="og:url"]"#, "content"),
    ("[data-n-au]", "data-n-au"),
];

/// Preview image tags, in priority order.
const IMAGE_SOURCES: &[(&str, &str)] = &[
    (r#"meta[property="og:image"]"#, "content"),
    (r#"meta[property="og:image:secure_url"]"#, "content"),
    (r#"meta[name="twitter:image"]"#, "content"),
    (r#"meta[property="twitter:image"]"#, "content"),
    (r#"meta[name="twitter:image:src"]"#, "content"),
    (r#"link[rel="image_src"]"#, "href"),
];

/// Containers searched for a first content image when no tag matched.
const CONTENT_CONTAINERS: &[&str] = &["article", "main", r#"[role="main"]"#, ".article", ".content"];

/// Whether `url` is unusable as a final publisher address.
///
/// Anything that is not http(s), or is on a redirect/consent host, is blocked.
pub fn is_blocked_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return true;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return true;
    }
    match parsed.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            BLOCKED_HOSTS
                .iter()
                .any(|b| host == *b || host.ends_with(&format!(".{b}")))
        }
        None => true,
    }
}

/// Publisher URL embedded in an interstitial page, if any.
pub fn in_page_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    URL_SOURCES.iter().find_map(|(css, attr)| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|candidate| !is_blocked_url(candidate))
            .map(str::to_string)
    })
}

/// Best preview image for a publisher page, resolved against `page_url`.
pub fn preview_image(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok();
    let absolutize = |raw: &str| -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") {
            return None;
        }
        match &base {
            Some(base) => base.join(raw).ok().map(|u| u.to_string()),
            None => Url::parse(raw).ok().map(|u| u.to_string()),
        }
    };

    let document = Html::parse_document(html);

    let tagged = IMAGE_SOURCES.iter().find_map(|(css, attr)| {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .filter_map(absolutize)
            .find(|src| !is_generic_image(src))
    });
    if tagged.is_some() {
        return tagged;
    }

    CONTENT_CONTAINERS.iter().find_map(|container| {
        let selector = Selector::parse(&format!("{container} img")).ok()?;
        document
            .select(&selector)
            .filter_map(|img| {
                let el = img.value();
                el.attr("src")
                    .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
                    .or_else(|| el.attr("data-src"))
            })
            .filter(|src| !NOT_CONTENT_IMAGE.is_match(src))
            .filter_map(absolutize)
            .find(|src| !is_generic_image(src))
    })
}
