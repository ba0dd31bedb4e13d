//! Normalization of metadata input into the flat [`ResolvedMetadata`] shape.
//!
//! Callers may hand over either the flat record or a nested, framework-style
//! object (`openGraph`, `twitter`, `alternates`, `icons`, `robots` as an object,
//! `title` with `default`/`absolute`). Rules only ever see the flat shape.

use crate::models::{ImageRef, ResolvedMetadata};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const NESTED_MARKERS: &[&str] = &["openGraph", "twitter", "icons", "alternates", "other"];

#[derive(Debug, Clone)]
pub enum MetadataInput {
    Flat(ResolvedMetadata),
    Nested(Map<String, Value>),
}

impl MetadataInput {
    /// Picks the shape by looking for keys only the nested form uses.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Object(map) if is_nested(&map) => Ok(MetadataInput::Nested(map)),
            other => Ok(MetadataInput::Flat(serde_json::from_value(other)?)),
        }
    }

    pub fn normalize(self) -> ResolvedMetadata {
        normalize_metadata(self)
    }
}

fn is_nested(map: &Map<String, Value>) -> bool {
    NESTED_MARKERS.iter().any(|key| map.contains_key(*key))
        || map.get("title").is_some_and(Value::is_object)
        || map.get("robots").is_some_and(Value::is_object)
}

pub fn normalize_metadata(input: MetadataInput) -> ResolvedMetadata {
    match input {
        MetadataInput::Flat(flat) => flat,
        MetadataInput::Nested(map) => normalize_nested(&map),
    }
}

fn normalize_nested(map: &Map<String, Value>) -> ResolvedMetadata {
    let open_graph = map.get("openGraph");
    let twitter = map.get("twitter");
    let alternates = map.get("alternates");

    ResolvedMetadata {
        title: map.get("title").and_then(title_text),
        description: string_at(map.get("description")),
        canonical: alternates.and_then(|a| string_at(a.get("canonical"))),
        og_title: open_graph.and_then(|og| string_at(og.get("title"))),
        og_description: open_graph.and_then(|og| string_at(og.get("description"))),
        og_image: open_graph.and_then(|og| og.get("images")).and_then(first_url),
        og_type: open_graph.and_then(|og| string_at(og.get("type"))),
        twitter_card: twitter.and_then(|t| string_at(t.get("card"))),
        twitter_title: twitter.and_then(|t| string_at(t.get("title"))),
        twitter_description: twitter.and_then(|t| string_at(t.get("description"))),
        robots: map.get("robots").and_then(robots_directive),
        alternates: alternates
            .and_then(|a| a.get("languages"))
            .and_then(Value::as_object)
            .map(|languages| {
                languages
                    .iter()
                    .filter_map(|(locale, url)| url.as_str().map(|u| (locale.clone(), u.to_string())))
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|languages| !languages.is_empty()),
        structured_data: map
            .get("structuredData")
            .or_else(|| map.get("jsonLd"))
            .map(|data| match data {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            }),
        viewport: map.get("viewport").and_then(viewport_directive),
        favicon: map.get("icons").and_then(icon_url),
        images: map.get("images").and_then(Value::as_array).map(|images| {
            images
                .iter()
                .filter_map(|img| {
                    let src = string_at(img.get("src"))?;
                    Some(ImageRef {
                        src,
                        alt: string_at(img.get("alt")),
                    })
                })
                .collect()
        }),
        h1s: map.get("h1s").and_then(Value::as_array).map(|h1s| {
            h1s.iter()
                .filter_map(|h| h.as_str().map(|s| s.to_string()))
                .collect()
        }),
        word_count: map
            .get("wordCount")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
    }
}

fn string_at(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(|s| s.to_string())
}

fn title_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => string_at(obj.get("absolute")).or_else(|| string_at(obj.get("default"))),
        _ => None,
    }
}

/// First URL out of a string, `{url}` object, or array of either.
fn first_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => string_at(obj.get("url")),
        Value::Array(items) => items.iter().find_map(first_url),
        _ => None,
    }
}

fn icon_url(value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => obj
            .get("icon")
            .or_else(|| obj.get("shortcut"))
            .and_then(first_url)
            .or_else(|| string_at(obj.get("url"))),
        other => first_url(other),
    }
}

fn robots_directive(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => {
            let index = obj.get("index").and_then(Value::as_bool).unwrap_or(true);
            let follow = obj.get("follow").and_then(Value::as_bool).unwrap_or(true);
            Some(format!(
                "{}, {}",
                if index { "index" } else { "noindex" },
                if follow { "follow" } else { "nofollow" }
            ))
        }
        _ => None,
    }
}

fn viewport_directive(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => {
            let mut parts = Vec::new();
            if let Some(width) = obj.get("width") {
                match width {
                    Value::String(s) => parts.push(format!("width={}", s)),
                    other => parts.push(format!("width={}", other)),
                }
            }
            if let Some(scale) = obj.get("initialScale") {
                parts.push(format!("initial-scale={}", scale));
            }
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}
