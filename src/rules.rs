//! The default scoring rules.
//!
//! Each rule is a plain value: identity, weight, severity and a pure check
//! function over [`ResolvedMetadata`]. [`default_rules`] builds the ordered list;
//! callers can pass any other list to [`crate::validator::RuleEngine::new`].

use crate::models::{ResolvedMetadata, RuleStatus, Severity, ValidationRule};
use url::Url;

pub const TITLE_MIN_CHARS: usize = 30;
pub const TITLE_MAX_CHARS: usize = 60;
pub const DESCRIPTION_MIN_CHARS: usize = 70;
pub const DESCRIPTION_MAX_CHARS: usize = 160;
pub const MIN_WORDS: usize = 300;
pub const VERY_THIN_WORDS: usize = 100;

const TWITTER_CARD_TYPES: &[&str] = &["summary", "summary_large_image", "app", "player"];

/// Outcome of a single check before it is attached to the rule's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCheck {
    pub status: RuleStatus,
    pub message: Option<String>,
    pub value: Option<String>,
    pub expected: Option<String>,
}

impl RuleCheck {
    pub fn pass() -> Self {
        Self {
            status: RuleStatus::Pass,
            message: None,
            value: None,
            expected: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            status: RuleStatus::Warn,
            message: Some(message.into()),
            ..Self::pass()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RuleStatus::Error,
            message: Some(message.into()),
            ..Self::pass()
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }
}

pub type CheckFn = fn(&ResolvedMetadata) -> RuleCheck;

#[derive(Clone, Copy)]
pub struct RuleDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub weight: u32,
    pub severity: Severity,
    pub check: CheckFn,
}

impl std::fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("severity", &self.severity)
            .finish()
    }
}

impl RuleDefinition {
    pub fn run(&self, metadata: &ResolvedMetadata) -> ValidationRule {
        let outcome = (self.check)(metadata);
        ValidationRule {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            weight: self.weight,
            severity: self.severity,
            status: outcome.status,
            message: outcome.message,
            value: outcome.value,
            expected: outcome.expected,
        }
    }
}

/// The built-in rule list. Weights sum to 100.
#[rustfmt::skip]
pub fn default_rules() -> Vec<RuleDefinition> {
    use Severity::{Critical, Optional};

    vec![
        rule("title-present", "Title present", "Page declares a <title>", 5, Critical, check_title_present),
        rule("title-length", "Title length", "Title is 30-60 characters", 10, Critical, check_title_length),
        rule("description-present", "Meta description present", "Page declares a meta description", 5, Critical, check_description_present),
        rule("description-length", "Meta description length", "Meta description is 70-160 characters", 8, Critical, check_description_length),
        rule("og-title", "OpenGraph title", "og:title is set for social previews", 5, Optional, check_og_title),
        rule("og-description", "OpenGraph description", "og:description is set for social previews", 5, Optional, check_og_description),
        rule("og-image", "OpenGraph image", "og:image is an absolute URL", 8, Critical, check_og_image),
        rule("canonical", "Canonical URL", "Page declares an absolute canonical URL", 8, Critical, check_canonical),
        rule("structured-data", "Structured data present", "Page embeds JSON-LD structured data", 8, Optional, check_structured_data_present),
        rule("structured-data-valid", "Structured data valid", "JSON-LD blocks declare @context and @type", 4, Optional, check_structured_data_valid),
        rule("h1-present", "Single H1", "Page has exactly one <h1>", 6, Critical, check_h1),
        rule("content-length", "Content length", "Page has at least 300 words of visible text", 4, Optional, check_content_length),
        rule("robots-indexable", "Indexable", "Robots meta does not block indexing", 5, Critical, check_robots),
        rule("twitter-card", "Twitter card", "twitter:card is a known card type", 4, Optional, check_twitter_card),
        rule("hreflang", "Hreflang alternates", "Alternates use absolute URLs and include x-default", 3, Optional, check_hreflang),
        rule("viewport", "Viewport", "Viewport meta is responsive", 5, Critical, check_viewport),
        rule("favicon", "Favicon", "Page links a favicon", 3, Optional, check_favicon),
        rule("image-alt", "Image alt text", "Images carry alt attributes", 4, Optional, check_image_alt),
    ]
}

fn rule(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    weight: u32,
    severity: Severity,
    check: CheckFn,
) -> RuleDefinition {
    RuleDefinition {
        id,
        name,
        description,
        weight,
        severity,
        check,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn is_absolute_http(value: &str) -> bool {
    Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

fn presence(value: &Option<String>, label: &str) -> RuleCheck {
    match value.as_deref().map(str::trim) {
        None => RuleCheck::error(format!("Missing {}", label)),
        Some("") => RuleCheck::error(format!("{} is empty", label)),
        Some(v) => RuleCheck::pass().value(v),
    }
}

fn length_in_range(value: &Option<String>, label: &str, min: usize, max: usize) -> RuleCheck {
    let expected = format!("{}-{} characters", min, max);
    let Some(text) = non_empty(value) else {
        return RuleCheck::error(format!("No {} to measure", label)).expected(expected);
    };

    let len = text.chars().count();
    if len < min {
        RuleCheck::warn(format!("{} is too short ({} chars)", label, len))
            .value(len.to_string())
            .expected(expected)
    } else if len > max {
        RuleCheck::warn(format!("{} is too long ({} chars)", label, len))
            .value(len.to_string())
            .expected(expected)
    } else {
        RuleCheck::pass().value(len.to_string())
    }
}

fn check_title_present(m: &ResolvedMetadata) -> RuleCheck {
    presence(&m.title, "title")
}

fn check_title_length(m: &ResolvedMetadata) -> RuleCheck {
    length_in_range(&m.title, "title", TITLE_MIN_CHARS, TITLE_MAX_CHARS)
}

fn check_description_present(m: &ResolvedMetadata) -> RuleCheck {
    presence(&m.description, "meta description")
}

fn check_description_length(m: &ResolvedMetadata) -> RuleCheck {
    length_in_range(
        &m.description,
        "meta description",
        DESCRIPTION_MIN_CHARS,
        DESCRIPTION_MAX_CHARS,
    )
}

fn check_og_title(m: &ResolvedMetadata) -> RuleCheck {
    presence(&m.og_title, "og:title")
}

fn check_og_description(m: &ResolvedMetadata) -> RuleCheck {
    presence(&m.og_description, "og:description")
}

fn absolute_url(value: &Option<String>, label: &str) -> RuleCheck {
    let presence = presence(value, label);
    if presence.status != RuleStatus::Pass {
        return presence;
    }

    match non_empty(value) {
        Some(url) if !is_absolute_http(url) => {
            RuleCheck::warn(format!("{} should be an absolute URL", label))
                .value(url)
                .expected("absolute http(s) URL")
        }
        _ => presence,
    }
}

fn check_og_image(m: &ResolvedMetadata) -> RuleCheck {
    absolute_url(&m.og_image, "og:image")
}

fn check_canonical(m: &ResolvedMetadata) -> RuleCheck {
    absolute_url(&m.canonical, "canonical URL")
}

fn check_structured_data_present(m: &ResolvedMetadata) -> RuleCheck {
    match m.structured_data.as_deref() {
        Some(blocks) if !blocks.is_empty() => {
            RuleCheck::pass().value(format!("{} block(s)", blocks.len()))
        }
        _ => RuleCheck::error("No JSON-LD structured data found"),
    }
}

fn check_structured_data_valid(m: &ResolvedMetadata) -> RuleCheck {
    let Some(blocks) = m.structured_data.as_deref().filter(|b| !b.is_empty()) else {
        return RuleCheck::error("No structured data to validate");
    };

    let invalid = blocks
        .iter()
        .filter(|block| {
            let Some(obj) = block.as_object() else {
                return true;
            };
            let has_context = obj
                .get("@context")
                .is_some_and(|ctx| ctx.to_string().contains("schema.org"));
            let has_type = obj.contains_key("@type") || obj.contains_key("@graph");
            !(has_context && has_type)
        })
        .count();

    if invalid == 0 {
        RuleCheck::pass()
    } else {
        RuleCheck::warn(format!(
            "{} of {} JSON-LD block(s) lack a schema.org @context or @type",
            invalid,
            blocks.len()
        ))
    }
}

fn check_h1(m: &ResolvedMetadata) -> RuleCheck {
    // absent means the signal was never collected (static analysis)
    let Some(h1s) = m.h1s.as_deref() else {
        return RuleCheck::pass();
    };

    match h1s.len() {
        0 => RuleCheck::error("No <h1> found").expected("1"),
        1 => RuleCheck::pass().value(h1s[0].clone()),
        n => RuleCheck::warn(format!("Multiple <h1> tags ({})", n))
            .value(n.to_string())
            .expected("1"),
    }
}

fn check_content_length(m: &ResolvedMetadata) -> RuleCheck {
    let Some(words) = m.word_count else {
        return RuleCheck::pass();
    };
    let expected = format!(">= {} words", MIN_WORDS);

    if words < VERY_THIN_WORDS {
        RuleCheck::error(format!("Very little content ({} words)", words))
            .value(words.to_string())
            .expected(expected)
    } else if words < MIN_WORDS {
        RuleCheck::warn(format!("Thin content ({} words)", words))
            .value(words.to_string())
            .expected(expected)
    } else {
        RuleCheck::pass().value(words.to_string())
    }
}

fn check_robots(m: &ResolvedMetadata) -> RuleCheck {
    let Some(robots) = m.robots.as_deref() else {
        return RuleCheck::pass();
    };
    let directives: Vec<String> = robots
        .split(',')
        .map(|d| d.trim().to_ascii_lowercase())
        .collect();

    if directives.iter().any(|d| d == "noindex" || d == "none") {
        RuleCheck::error("Robots meta blocks indexing").value(robots)
    } else if directives.iter().any(|d| d == "nofollow") {
        RuleCheck::warn("Robots meta blocks link following").value(robots)
    } else {
        RuleCheck::pass().value(robots)
    }
}

fn check_twitter_card(m: &ResolvedMetadata) -> RuleCheck {
    let presence = presence(&m.twitter_card, "twitter:card");
    let Some(card) = non_empty(&m.twitter_card) else {
        return presence;
    };

    if TWITTER_CARD_TYPES.contains(&card.to_ascii_lowercase().as_str()) {
        presence
    } else {
        RuleCheck::warn(format!("Unknown twitter:card type '{}'", card))
            .value(card)
            .expected(TWITTER_CARD_TYPES.join(" | "))
    }
}

fn check_hreflang(m: &ResolvedMetadata) -> RuleCheck {
    let Some(alternates) = m.alternates.as_ref().filter(|a| !a.is_empty()) else {
        return RuleCheck::pass();
    };

    let relative: Vec<&str> = alternates
        .iter()
        .filter(|(_, url)| !is_absolute_http(url))
        .map(|(locale, _)| locale.as_str())
        .collect();
    if !relative.is_empty() {
        return RuleCheck::warn(format!(
            "Hreflang alternates must be absolute URLs ({})",
            relative.join(", ")
        ));
    }

    if !alternates.keys().any(|k| k.eq_ignore_ascii_case("x-default")) {
        return RuleCheck::warn("Hreflang alternates have no x-default entry")
            .value(format!("{} locale(s)", alternates.len()));
    }

    RuleCheck::pass().value(format!("{} locale(s)", alternates.len()))
}

fn check_viewport(m: &ResolvedMetadata) -> RuleCheck {
    let presence = presence(&m.viewport, "viewport meta tag");
    let Some(viewport) = non_empty(&m.viewport) else {
        return presence;
    };

    let compact: String = viewport.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.to_ascii_lowercase().contains("width=device-width") {
        presence
    } else {
        RuleCheck::warn("Viewport is not responsive")
            .value(viewport)
            .expected("width=device-width")
    }
}

fn check_favicon(m: &ResolvedMetadata) -> RuleCheck {
    presence(&m.favicon, "favicon")
}

fn check_image_alt(m: &ResolvedMetadata) -> RuleCheck {
    let Some(images) = m.images.as_deref().filter(|i| !i.is_empty()) else {
        return RuleCheck::pass();
    };

    // an empty alt marks a decorative image and is fine
    let missing = images.iter().filter(|img| img.alt.is_none()).count();
    let summary = format!("{}/{} missing alt", missing, images.len());

    if missing == 0 {
        RuleCheck::pass()
    } else if missing == images.len() {
        RuleCheck::error("No images have alt text").value(summary)
    } else {
        RuleCheck::warn(format!("{} image(s) missing alt text", missing)).value(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;
    use std::collections::HashSet;

    fn status_of(id: &str, metadata: &ResolvedMetadata) -> RuleStatus {
        default_rules()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.run(metadata).status)
            .expect("rule exists")
    }

    #[test]
    fn test_default_weights_sum_to_100() {
        let total: u32 = default_rules().iter().map(|r| r.weight).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_rule_ids_unique() {
        let rules = default_rules();
        let ids: HashSet<_> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn test_h1_absent_vs_empty() {
        let absent = ResolvedMetadata::default();
        assert_eq!(status_of("h1-present", &absent), RuleStatus::Pass);

        let empty = ResolvedMetadata {
            h1s: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(status_of("h1-present", &empty), RuleStatus::Error);

        let multiple = ResolvedMetadata {
            h1s: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        assert_eq!(status_of("h1-present", &multiple), RuleStatus::Warn);
    }

    #[test]
    fn test_word_count_absent_is_not_penalized() {
        assert_eq!(
            status_of("content-length", &ResolvedMetadata::default()),
            RuleStatus::Pass
        );
        let thin = ResolvedMetadata {
            word_count: Some(150),
            ..Default::default()
        };
        assert_eq!(status_of("content-length", &thin), RuleStatus::Warn);
    }

    #[test]
    fn test_title_empty_vs_missing_both_fail() {
        let empty = ResolvedMetadata {
            title: Some("   ".into()),
            ..Default::default()
        };
        let check = default_rules()[0].run(&empty);
        assert_eq!(check.status, RuleStatus::Error);
        assert_eq!(check.message.as_deref(), Some("title is empty"));

        let missing = default_rules()[0].run(&ResolvedMetadata::default());
        assert_eq!(missing.message.as_deref(), Some("Missing title"));
    }

    #[test]
    fn test_title_length_bounds() {
        let with_title = |len: usize| ResolvedMetadata {
            title: Some("x".repeat(len)),
            ..Default::default()
        };
        assert_eq!(status_of("title-length", &with_title(29)), RuleStatus::Warn);
        assert_eq!(status_of("title-length", &with_title(30)), RuleStatus::Pass);
        assert_eq!(status_of("title-length", &with_title(60)), RuleStatus::Pass);
        assert_eq!(status_of("title-length", &with_title(61)), RuleStatus::Warn);
    }

    #[test]
    fn test_robots_noindex() {
        let noindex = ResolvedMetadata {
            robots: Some("NoIndex, follow".into()),
            ..Default::default()
        };
        assert_eq!(status_of("robots-indexable", &noindex), RuleStatus::Error);
    }

    #[test]
    fn test_image_alt_partial() {
        let metadata = ResolvedMetadata {
            images: Some(vec![
                ImageRef { src: "/a.png".into(), alt: Some("A".into()) },
                ImageRef { src: "/b.png".into(), alt: None },
                ImageRef { src: "/c.png".into(), alt: Some(String::new()) },
            ]),
            ..Default::default()
        };
        assert_eq!(status_of("image-alt", &metadata), RuleStatus::Warn);
    }

    #[test]
    fn test_relative_og_image_warns() {
        let metadata = ResolvedMetadata {
            og_image: Some("/og.png".into()),
            ..Default::default()
        };
        assert_eq!(status_of("og-image", &metadata), RuleStatus::Warn);
    }
}
