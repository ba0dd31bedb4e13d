use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat SEO metadata for one page.
///
/// `None` means the field was not found (or, for `h1s`/`word_count`, never
/// collected); `Some("")` means it was present but empty. Rules treat the two
/// differently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_type: Option<String>,
    pub twitter_card: Option<String>,
    pub twitter_title: Option<String>,
    pub twitter_description: Option<String>,
    pub robots: Option<String>,
    /// hreflang locale -> URL
    pub alternates: Option<BTreeMap<String, String>>,
    pub structured_data: Option<Vec<serde_json::Value>>,
    pub viewport: Option<String>,
    pub favicon: Option<String>,
    pub images: Option<Vec<ImageRef>>,
    pub h1s: Option<Vec<String>>,
    pub word_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pass,
    Warn,
    Error,
}

/// One rule's identity together with the outcome of running it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub weight: u32,
    pub severity: Severity,
    pub status: RuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub score: u32,
    pub grade: Grade,
    pub passed: Vec<ValidationRule>,
    pub warnings: Vec<ValidationRule>,
    pub errors: Vec<ValidationRule>,
}

impl ValidationResult {
    pub fn critical_error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|rule| rule.severity == Severity::Critical)
            .count()
    }

    pub fn optional_error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|rule| rule.severity == Severity::Optional)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawledPage {
    pub url: String,
    /// Final HTTP status; `None` when no response was received.
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub metadata: ResolvedMetadata,
    /// Absent for pages with `error` set.
    pub validation: Option<ValidationResult>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the response redirected to a page fetched under its own URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirected_to: Option<String>,
    pub h1s: Vec<String>,
    pub word_count: usize,
    pub response_time_ms: u64,
    pub redirect_chain: Vec<String>,
    pub structured_data_types: Vec<String>,
    pub is_app_page: bool,
    pub script_count: usize,
    pub image_count: usize,
    pub images_missing_alt: usize,
}

impl CrawledPage {
    /// A page that could not be fetched or scored.
    pub fn failed(url: impl Into<String>, depth: usize, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            content_type: None,
            metadata: ResolvedMetadata::default(),
            validation: None,
            internal_links: vec![],
            external_links: vec![],
            depth,
            error: Some(error.into()),
            redirected_to: None,
            h1s: vec![],
            word_count: 0,
            response_time_ms: 0,
            redirect_chain: vec![],
            structured_data_types: vec![],
            is_app_page: false,
            script_count: 0,
            image_count: 0,
            images_missing_alt: 0,
        }
    }

    /// Fetched and scored.
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.redirected_to.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// A redirect onto a URL that is scored separately.
    pub fn is_redirect_only(&self) -> bool {
        self.error.is_none() && self.redirected_to.is_some()
    }

    /// Entry for a URL that redirected onto an already-fetched page.
    pub fn redirect_only(
        url: impl Into<String>,
        depth: usize,
        status: u16,
        target: impl Into<String>,
        redirect_chain: Vec<String>,
    ) -> Self {
        let mut page = Self::failed(url, depth, "");
        page.error = None;
        page.status = Some(status);
        page.redirected_to = Some(target.into());
        page.redirect_chain = redirect_chain;
        page
    }

    /// Non-HTML responses exist; they are not broken links.
    pub fn is_non_html(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.starts_with(NOT_HTML_PREFIX))
    }
}

pub const NOT_HTML_PREFIX: &str = "Not HTML";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub value: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum H1IssueKind {
    Missing,
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct H1Issue {
    pub url: String,
    pub issue: H1IssueKind,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub from: String,
    pub to: String,
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonHtmlLink {
    pub from: String,
    pub to: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectChain {
    pub url: String,
    pub chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinContentPage {
    pub url: String,
    pub word_count: usize,
    pub is_app_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowPage {
    pub url: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAltIssue {
    pub url: String,
    pub total_images: usize,
    pub missing_alt: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenImage {
    pub page: String,
    pub src: String,
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    OgImage,
    Favicon,
    Canonical,
    Hreflang,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCheck {
    pub kind: AssetKind,
    pub url: String,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Cross-page findings computed once after the crawl.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlAnalysis {
    pub duplicate_titles: Vec<DuplicateGroup>,
    pub duplicate_descriptions: Vec<DuplicateGroup>,
    pub h1_issues: Vec<H1Issue>,
    pub broken_internal_links: Vec<BrokenLink>,
    pub non_html_links: Vec<NonHtmlLink>,
    pub redirect_chains: Vec<RedirectChain>,
    pub thin_content: Vec<ThinContentPage>,
    pub inlinks: BTreeMap<String, usize>,
    pub orphan_pages: Vec<String>,
    pub slowest_pages: Vec<SlowPage>,
    pub structured_data_types: BTreeMap<String, usize>,
    pub image_alt_issues: Vec<ImageAltIssue>,
    pub broken_external_links: Vec<BrokenLink>,
    pub bot_blocked_links: Vec<BrokenLink>,
    pub broken_images: Vec<BrokenImage>,
    pub content_types: BTreeMap<String, usize>,
    pub not_in_sitemap: Vec<String>,
    pub sitemap_only: Vec<String>,
    pub robots_blocked: Vec<String>,
    pub asset_checks: Vec<AssetCheck>,
}

/// Root output of a crawl, serialized as JSON for CI and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub start_url: String,
    pub domain: String,
    pub pages: Vec<CrawledPage>,
    pub total_pages: usize,
    pub passed_pages: usize,
    pub errored_pages: usize,
    pub score: u32,
    pub grade: Grade,
    pub critical_errors: usize,
    pub optional_errors: usize,
    pub warnings: usize,
    pub skipped_urls: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: String,
    pub analysis: CrawlAnalysis,
}
