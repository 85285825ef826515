//! Image-quality heuristic and deterministic fallback images.
//!
//! The classifier rules are applied in a fixed order: the CDN allowlist must
//! short-circuit before the size and substring rules, which would otherwise
//! reject perfectly good resized CDN images.

use crate::config::Config;
use crate::models::Article;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};
use url::Url;

/// Hosts whose images are always accepted (WordPress Photon CDN).
static ALWAYS_ACCEPTABLE_HOST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^i\d\.wp\.com$").unwrap());

static SIZE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[?&](?:w|width|size|sz|s|h|height)=(\d+)\b").unwrap());

static GENERIC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        news\.google\.com
        | gstatic\.com
        | google\.com/s2/favicons
        | [/_-]news[-_]?(?:logo|icon|default|placeholder|thumb)
        | logo
        | favicon
        | icon-\d+
        | default-image
        | placeholder
        | avatar
        ",
    )
    .unwrap()
});

/// Whether an image URL is a generic placeholder rather than a real picture.
///
/// Rules, first match wins:
/// 1. empty ⇒ generic
/// 2. allowlisted CDN host ⇒ not generic
/// 3. width/size query parameter between 1 and 199 ⇒ generic
/// 4. aggregator domains and logo/favicon/icon/placeholder/avatar names ⇒ generic
/// 5. otherwise not generic
///
/// "news" only counts in a news-branded asset name (`news-logo`,
/// `_news_default`), not as a bare substring, so images under `/news/`
/// paths are kept.
pub fn is_generic_image(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return true;
    }

    if let Ok(parsed) = Url::parse(url) {
        if parsed
            .host_str()
            .is_some_and(|host| ALWAYS_ACCEPTABLE_HOST.is_match(host))
        {
            return false;
        }
    }

    let small = SIZE_PARAM
        .captures_iter(url)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .any(|n| (1..200).contains(&n));
    if small {
        return true;
    }

    GENERIC_PATTERN.is_match(url)
}

/// Pick the first candidate that is not generic.
pub fn best_image<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|c| !is_generic_image(c))
        .map(str::to_string)
}

/// Stable 32-bit string hash over UTF-16 code units (`h * 31 + c`, wrapping).
pub fn title_hash(title: &str) -> i32 {
    title.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    })
}

/// Deterministic fallback image for a title from a pool.
pub fn fallback_image<'a>(title: &str, pool: &'a [String]) -> Option<&'a str> {
    if pool.is_empty() {
        return None;
    }
    let idx = title_hash(title).unsigned_abs() as usize % pool.len();
    pool.get(idx).map(String::as_str)
}

/// Give every article without an image its deterministic fallback.
///
/// Returns the number of articles that received one.
#[instrument(level = "info", skip_all, fields(count = articles.len()))]
pub fn assign_fallback_images(articles: &mut [Article], config: &Config) -> usize {
    let mut assigned = 0;
    for article in articles.iter_mut().filter(|a| !a.has_image()) {
        let pool = config.fallback_pool(&article.topic);
        if let Some(image) = fallback_image(&article.title, &pool) {
            debug!(id = %article.id, %image, "Assigned fallback image");
            article.image_url = image.to_string();
            assigned += 1;
        }
    }
    info!(assigned, "Fallback images assigned");
    assigned
}
