//! Tolerant RSS/Atom extraction on top of `quick-xml` events.
//!
//! Feeds are read as a flat list of entries (`<item>` or `<entry>`), each
//! holding its descendant elements in document order. Lookups never fail: a
//! missing tag is `None` or an empty `Vec`. Malformed markup is tolerated as
//! far as the reader allows; on a hard reader error the entries collected so
//! far are returned.

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::warn;

/// One element inside an entry, with its own text and attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Qualified name as written, e.g. `media:content`.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A feed entry: every element nested inside one `<item>`/`<entry>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub elements: Vec<Element>,
}

impl FeedEntry {
    /// Text of the first `tag` element with non-blank content.
    pub fn text(&self, tag: &str) -> Option<&str> {
        self.elements
            .iter()
            .filter(|e| e.name == tag)
            .map(|e| e.text.trim())
            .find(|t| !t.is_empty())
    }

    /// Text of every `tag` element, in document order.
    pub fn texts(&self, tag: &str) -> Vec<&str> {
        self.elements
            .iter()
            .filter(|e| e.name == tag)
            .map(|e| e.text.trim())
            .collect()
    }

    /// First non-blank `attr` value on a `tag` element.
    pub fn attr(&self, tag: &str, attr: &str) -> Option<&str> {
        self.elements
            .iter()
            .filter(|e| e.name == tag)
            .filter_map(|e| e.attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    /// First `attr` value on a `tag` element that also satisfies `pred`.
    pub fn attr_where(&self, tag: &str, attr: &str, pred: impl Fn(&Element) -> bool) -> Option<&str> {
        self.elements
            .iter()
            .filter(|e| e.name == tag && pred(e))
            .filter_map(|e| e.attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Parse every `entry_tag` element (`item` for RSS, `entry` for Atom).
pub fn parse_entries(xml: &str, entry_tag: &str) -> Vec<FeedEntry> {
    parse(xml, Some(entry_tag))
}

/// Text content of every `tag` element in the payload, in document order.
pub fn extract_tag_contents(xml: &str, tag: &str) -> Vec<String> {
    parse(xml, None)
        .into_iter()
        .flat_map(|entry| entry.elements)
        .filter(|e| e.name == tag)
        .map(|e| e.text.trim().to_string())
        .collect()
}

/// With `entry_tag == None` the whole document is a single entry.
fn parse(xml: &str, entry_tag: Option<&str>) -> Vec<FeedEntry> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = entry_tag.is_none().then(FeedEntry::default);
    // Indices into `current.elements` of the elements still open.
    let mut open: Vec<usize> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = qualified_name(&e);
                if entry_tag == Some(name.as_str()) {
                    current = Some(FeedEntry::default());
                    open.clear();
                } else if let Some(entry) = current.as_mut() {
                    entry.elements.push(element_from(&e, name));
                    open.push(entry.elements.len() - 1);
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    let name = qualified_name(&e);
                    entry.elements.push(element_from(&e, name));
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(entry), Some(&idx)) = (current.as_mut(), open.last()) {
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    append_text(&mut entry.elements[idx].text, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(entry), Some(&idx)) = (current.as_mut(), open.last()) {
                    append_text(&mut entry.elements[idx].text, &String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if entry_tag == Some(name.as_str()) {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    open.clear();
                } else {
                    open.pop();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, entries = entries.len(), "Feed markup error; keeping entries read so far");
                break;
            }
            _ => {}
        }
    }

    // Whole-document mode, or an entry left open by a truncated payload.
    if let Some(entry) = current {
        if entry_tag.is_none() || !entry.elements.is_empty() {
            entries.push(entry);
        }
    }
    entries
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn element_from(e: &BytesStart<'_>, name: String) -> Element {
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect();
    Element {
        name,
        attrs,
        text: String::new(),
    }
}

fn append_text(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());

/// `src` of the first `<img>` in an HTML fragment.
pub fn first_img_src(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|s| !s.is_empty())
}

/// Strip HTML tags, decode common entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode named and numeric HTML entities left in feed text.
pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}
