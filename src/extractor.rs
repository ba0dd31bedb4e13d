//! Pure extraction of SEO signals from server-delivered HTML.
//!
//! Nothing here fails on malformed markup: html5ever recovers what it can and
//! every field without a match comes back as `None`.

use crate::models::{ImageRef, ResolvedMetadata};
use crate::url_utils::{is_same_origin, normalize_url};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use url::Url;

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector should be valid"));
static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[content]").expect("meta selector should be valid"));
static LINK_REL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel][href]").expect("link selector should be valid"));
static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("script selector should be valid"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("img selector should be valid"));
static H1_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("h1 selector should be valid"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector should be valid"));
static MAIN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("main").expect("main selector should be valid"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector should be valid"));

const NON_VISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Links found on a page, normalized and de-duplicated in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

/// Everything the crawler needs from one HTML document.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub metadata: ResolvedMetadata,
    pub links: PageLinks,
    pub structured_data_types: Vec<String>,
    pub script_count: usize,
}

/// Parses once and runs every extractor. `h1s` and `word_count` are always
/// populated since a live document was available.
pub fn extract_page(html: &str, page_url: &Url) -> ExtractedPage {
    let document = Html::parse_document(html);

    let mut metadata = extract_metadata(&document);
    metadata.h1s = Some(extract_h1s(&document));
    metadata.word_count = Some(word_count(&document));

    let structured_data_types = metadata
        .structured_data
        .as_deref()
        .map(structured_data_types)
        .unwrap_or_default();

    ExtractedPage {
        links: extract_links(&document, page_url),
        script_count: document.select(&SCRIPT_SELECTOR).count(),
        structured_data_types,
        metadata,
    }
}

/// Head metadata, JSON-LD and images. Leaves `h1s`/`word_count` unset.
pub fn extract_metadata(document: &Html) -> ResolvedMetadata {
    let mut metadata = ResolvedMetadata {
        title: extract_title(document),
        ..Default::default()
    };

    for element in document.select(&META_SELECTOR) {
        let attrs = element.value();
        let Some(key) = attrs.attr("name").or_else(|| attrs.attr("property")) else {
            continue;
        };
        let content = attrs.attr("content").unwrap_or_default().trim().to_string();

        let slot = match key.trim().to_ascii_lowercase().as_str() {
            "description" => &mut metadata.description,
            "robots" => &mut metadata.robots,
            "viewport" => &mut metadata.viewport,
            "og:title" => &mut metadata.og_title,
            "og:description" => &mut metadata.og_description,
            "og:image" => &mut metadata.og_image,
            "og:type" => &mut metadata.og_type,
            "twitter:card" => &mut metadata.twitter_card,
            "twitter:title" => &mut metadata.twitter_title,
            "twitter:description" => &mut metadata.twitter_description,
            _ => continue,
        };
        // first occurrence wins
        if slot.is_none() {
            *slot = Some(content);
        }
    }

    let mut alternates = BTreeMap::new();
    for element in document.select(&LINK_REL_SELECTOR) {
        let attrs = element.value();
        let rel = attrs.attr("rel").unwrap_or_default().to_ascii_lowercase();
        let href = attrs.attr("href").unwrap_or_default().trim().to_string();
        let rels: Vec<&str> = rel.split_whitespace().collect();

        if rels.contains(&"canonical") && metadata.canonical.is_none() {
            metadata.canonical = Some(href);
        } else if rels.contains(&"icon") && metadata.favicon.is_none() {
            metadata.favicon = Some(href);
        } else if rels.contains(&"alternate")
            && let Some(lang) = attrs.attr("hreflang")
        {
            alternates.entry(lang.trim().to_string()).or_insert(href);
        }
    }
    metadata.alternates = (!alternates.is_empty()).then_some(alternates);

    let structured_data = extract_json_ld(document);
    metadata.structured_data = (!structured_data.is_empty()).then_some(structured_data);

    let images = extract_images(document);
    metadata.images = (!images.is_empty()).then_some(images);

    metadata
}

pub fn extract_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
}

/// Every parseable `application/ld+json` block; arrays are flattened, invalid JSON skipped.
pub fn extract_json_ld(document: &Html) -> Vec<Value> {
    let mut blocks = Vec::new();

    for script in document.select(&SCRIPT_SELECTOR) {
        let is_json_ld = script
            .value()
            .attr("type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"));
        if !is_json_ld {
            continue;
        }

        let raw = script.text().collect::<String>();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(Value::Array(items)) => blocks.extend(items),
            Ok(value) => blocks.push(value),
            Err(e) => tracing::debug!(error = %e, "Skipping invalid JSON-LD block"),
        }
    }

    blocks
}

/// `@type` values, including those nested under `@graph`, in first-seen order.
pub fn structured_data_types(blocks: &[Value]) -> Vec<String> {
    fn collect(value: &Value, types: &mut Vec<String>) {
        match value {
            Value::Array(items) => items.iter().for_each(|item| collect(item, types)),
            Value::Object(obj) => {
                match obj.get("@type") {
                    Some(Value::String(t)) => types.push(t.clone()),
                    Some(Value::Array(ts)) => types.extend(
                        ts.iter().filter_map(|t| t.as_str().map(|s| s.to_string())),
                    ),
                    _ => {}
                }
                if let Some(graph) = obj.get("@graph") {
                    collect(graph, types);
                }
            }
            _ => {}
        }
    }

    let mut types = Vec::new();
    blocks.iter().for_each(|block| collect(block, &mut types));

    let mut seen = HashSet::new();
    types.retain(|t| seen.insert(t.clone()));
    types
}

pub fn extract_images(document: &Html) -> Vec<ImageRef> {
    document
        .select(&IMG_SELECTOR)
        .filter_map(|el| {
            let src = el.value().attr("src")?.trim();
            if src.is_empty() {
                return None;
            }
            Some(ImageRef {
                src: src.to_string(),
                alt: el.value().attr("alt").map(|a| a.to_string()),
            })
        })
        .collect()
}

pub fn extract_h1s(document: &Html) -> Vec<String> {
    document
        .select(&H1_SELECTOR)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .collect()
}

/// Approximate count of visible words, preferring `<main>` when present.
pub fn word_count(document: &Html) -> usize {
    let root = document
        .select(&MAIN_SELECTOR)
        .next()
        .or_else(|| document.select(&BODY_SELECTOR).next())
        .unwrap_or_else(|| document.root_element());

    visible_text(root).split_whitespace().count()
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut text = String::new();

    for node in root.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_VISIBLE_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    text
}

/// Anchor targets split by origin. Fragments are dropped, trailing slashes
/// normalized, and non-HTTP schemes (`mailto:`, `tel:`, `javascript:`) skipped.
pub fn extract_links(document: &Html, page_url: &Url) -> PageLinks {
    let mut links = PageLinks::default();
    let mut seen = HashSet::new();

    for element in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let Ok(absolute) = page_url.join(href) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }

        let normalized = normalize_url(&absolute);
        if !seen.insert(normalized.clone()) {
            continue;
        }

        if is_same_origin(&absolute, page_url) {
            links.internal.push(normalized);
        } else {
            links.external.push(normalized);
        }
    }

    links
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!doctype html>
<html>
<head>
  <title>  Acme   Widgets </title>
  <meta content="Widgets for every job" name="description">
  <meta property="og:title" content="Acme">
  <meta name="twitter:card" content="summary_large_image">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link href="https://acme.dev/" rel="canonical">
  <link rel="shortcut icon" href="/favicon.ico">
  <link rel="alternate" hreflang="de" href="https://acme.dev/de">
  <script type="application/ld+json">{"@context":"https://schema.org","@graph":[{"@type":"Organization"},{"@type":["WebSite","Thing"]}]}</script>
  <script type="application/ld+json">{ not json }</script>
  <style>.hero { color: red }</style>
</head>
<body>
  <nav>skip me not</nav>
  <main>
    <h1>Best <em>widgets</em>&nbsp;ever</h1>
    <p>Four words right here.</p>
    <script>var hidden = "not counted words";</script>
    <img src="/a.png" alt="A">
    <img src="/b.png">
    <a href="/about/#team">About</a>
    <a href="/about">About again</a>
    <a href="https://other.com/x">Other</a>
    <a href="mailto:hi@acme.dev">Mail</a>
    <a href="#top">Top</a>
  </main>
</body>
</html>"##;

    #[test]
    fn test_extract_page_metadata() {
        let url = Url::parse("https://acme.dev/").unwrap();
        let page = extract_page(PAGE, &url);
        let m = &page.metadata;

        assert_eq!(m.title.as_deref(), Some("Acme Widgets"));
        assert_eq!(m.description.as_deref(), Some("Widgets for every job"));
        assert_eq!(m.og_title.as_deref(), Some("Acme"));
        assert_eq!(m.og_image, None);
        assert_eq!(m.twitter_card.as_deref(), Some("summary_large_image"));
        assert_eq!(m.canonical.as_deref(), Some("https://acme.dev/"));
        assert_eq!(m.favicon.as_deref(), Some("/favicon.ico"));
        assert_eq!(
            m.alternates.as_ref().and_then(|a| a.get("de")).map(String::as_str),
            Some("https://acme.dev/de")
        );
        assert_eq!(m.structured_data.as_ref().map(Vec::len), Some(1));
        assert_eq!(page.structured_data_types, vec!["Organization", "WebSite", "Thing"]);
        assert_eq!(m.images.as_ref().map(Vec::len), Some(2));
        assert_eq!(m.h1s, Some(vec!["Best widgets ever".to_string()]));
        assert_eq!(page.script_count, 3);
    }

    #[test]
    fn test_word_count_prefers_main_and_skips_scripts() {
        let url = Url::parse("https://acme.dev/").unwrap();
        let page = extract_page(PAGE, &url);
        // h1 (3) + paragraph (4) + anchor texts (About, About again, Other, Mail, Top = 6)
        assert_eq!(page.metadata.word_count, Some(13));
    }

    #[test]
    fn test_extract_links_split_and_deduped() {
        let url = Url::parse("https://acme.dev/").unwrap();
        let page = extract_page(PAGE, &url);

        assert_eq!(page.links.internal, vec!["https://acme.dev/about"]);
        assert_eq!(page.links.external, vec!["https://other.com/x"]);
    }

    #[test]
    fn test_empty_title_is_distinct_from_missing() {
        let empty = Html::parse_document("<html><head><title></title></head></html>");
        assert_eq!(extract_title(&empty), Some(String::new()));

        let missing = Html::parse_document("<html><head></head><body></body></html>");
        assert_eq!(extract_title(&missing), None);
        assert_eq!(extract_metadata(&missing), ResolvedMetadata::default());
    }

    #[test]
    fn test_malformed_html_does_not_panic() {
        let url = Url::parse("https://acme.dev/").unwrap();
        let page = extract_page("<html><head><title>Broken<meta name=description", &url);
        assert!(page.metadata.h1s.as_ref().is_some_and(Vec::is_empty));
    }
}
