//! Post-crawl analysis across the whole page set.
//!
//! Runs once after the crawl has drained. Pages with `error` set and pages
//! matching an ignore pattern are left out of every aggregate, except that
//! errored pages are used to resolve which internal links are broken.

use crate::link_checker::{LinkChecker, LinkVerdict};
use crate::models::{
    BrokenImage, BrokenLink, CrawlAnalysis, CrawledPage, DuplicateGroup, Grade, H1Issue,
    H1IssueKind, ImageAltIssue, NonHtmlLink, RedirectChain, RuleStatus, Severity, SlowPage,
    ThinContentPage, ValidationRule,
};
use crate::robots::RobotsTxt;
use crate::url_utils::{IgnorePatterns, normalize_url_str};
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

pub const THIN_CONTENT_WORDS: usize = 200;
pub const DUPLICATE_TITLE_PENALTY: u32 = 5;
pub const DUPLICATE_DESCRIPTION_PENALTY: u32 = 3;
pub const SLOWEST_PAGES_LIMIT: usize = 10;

/// Approximate detection of client-rendered application shells, so thin
/// content on them can be told apart from genuinely thin pages.
#[derive(Debug, Clone)]
pub struct AppPageHeuristics {
    pub path_segments: Vec<String>,
    pub query_params: Vec<String>,
    pub low_word_count: usize,
    pub script_count: usize,
}

impl Default for AppPageHeuristics {
    fn default() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            path_segments: owned(&[
                "app",
                "dashboard",
                "wizard",
                "onboarding",
                "setup",
                "checkout",
                "builder",
                "editor",
            ]),
            query_params: owned(&["type", "step", "tab", "mode"]),
            low_word_count: 50,
            script_count: 5,
        }
    }
}

impl AppPageHeuristics {
    pub fn is_app_page(&self, url: &str, word_count: usize, script_count: usize) -> bool {
        if word_count < self.low_word_count && script_count >= self.script_count {
            return true;
        }

        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        let path_hit = parsed
            .path_segments()
            .into_iter()
            .flatten()
            .any(|segment| {
                let segment = segment.to_ascii_lowercase();
                self.path_segments.iter().any(|k| *k == segment)
            });
        let query_hit = parsed
            .query_pairs()
            .any(|(key, _)| self.query_params.iter().any(|p| p.eq_ignore_ascii_case(&key)));

        path_hit || query_hit
    }
}

/// Inputs from outside the page set.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub ignore: &'a IgnorePatterns,
    pub sitemap_urls: &'a [String],
    pub robots: Option<&'a RobotsTxt>,
    pub user_agent: &'a str,
}

#[derive(Debug, Clone)]
pub struct CrossPageAnalyzer {
    /// `None` skips external-link and image verification.
    checker: Option<LinkChecker>,
}

impl CrossPageAnalyzer {
    pub fn new(checker: Option<LinkChecker>) -> Self {
        Self { checker }
    }

    pub async fn analyze(&self, pages: &[CrawledPage], ctx: &AnalysisContext<'_>) -> CrawlAnalysis {
        let in_scope: Vec<&CrawledPage> = pages
            .iter()
            .filter(|p| !ctx.ignore.matches_url(&p.url))
            .collect();
        let analyzable: Vec<&CrawledPage> =
            in_scope.iter().copied().filter(|p| p.is_ok()).collect();

        let (broken_internal_links, non_html_links) = internal_link_failures(&in_scope, &analyzable);
        let inlinks = inlink_counts(&analyzable);

        let mut analysis = CrawlAnalysis {
            duplicate_titles: find_duplicates(&analyzable, |p| p.metadata.title.as_deref()),
            duplicate_descriptions: find_duplicates(&analyzable, |p| {
                p.metadata.description.as_deref()
            }),
            h1_issues: h1_issues(&analyzable),
            broken_internal_links,
            non_html_links,
            redirect_chains: in_scope
                .iter()
                .filter(|p| !p.redirect_chain.is_empty())
                .map(|p| RedirectChain {
                    url: p.url.clone(),
                    chain: p.redirect_chain.clone(),
                })
                .collect(),
            thin_content: analyzable
                .iter()
                .filter(|p| p.word_count < THIN_CONTENT_WORDS)
                .map(|p| ThinContentPage {
                    url: p.url.clone(),
                    word_count: p.word_count,
                    is_app_page: p.is_app_page,
                })
                .collect(),
            orphan_pages: analyzable
                .iter()
                .filter(|p| p.depth > 0 && inlinks.get(&p.url).copied().unwrap_or(0) == 0)
                .map(|p| p.url.clone())
                .collect(),
            inlinks,
            slowest_pages: slowest_pages(&analyzable),
            structured_data_types: structured_data_distribution(&analyzable),
            image_alt_issues: analyzable
                .iter()
                .filter(|p| p.images_missing_alt > 0)
                .map(|p| ImageAltIssue {
                    url: p.url.clone(),
                    total_images: p.image_count,
                    missing_alt: p.images_missing_alt,
                })
                .collect(),
            content_types: content_type_counts(&in_scope),
            robots_blocked: ctx
                .robots
                .map(|robots| {
                    analyzable
                        .iter()
                        .filter(|p| {
                            Url::parse(&p.url)
                                .is_ok_and(|u| !robots.is_url_allowed(&u, ctx.user_agent))
                        })
                        .map(|p| p.url.clone())
                        .collect()
                })
                .unwrap_or_default(),
            ..Default::default()
        };

        if !ctx.sitemap_urls.is_empty() {
            let (not_in_sitemap, sitemap_only) =
                sitemap_coverage(pages, &analyzable, ctx.sitemap_urls);
            analysis.not_in_sitemap = not_in_sitemap;
            analysis.sitemap_only = sitemap_only;
        }

        if let Some(checker) = &self.checker {
            self.verify_external(checker, &analyzable, &mut analysis).await;
        }

        analysis
    }

    async fn verify_external(
        &self,
        checker: &LinkChecker,
        pages: &[&CrawledPage],
        analysis: &mut CrawlAnalysis,
    ) {
        let external = unique(pages.iter().flat_map(|p| p.external_links.iter().cloned()));
        let images_by_page: Vec<(&str, Vec<String>)> = pages
            .iter()
            .map(|p| (p.url.as_str(), resolved_image_urls(p)))
            .collect();
        let images = unique(images_by_page.iter().flat_map(|(_, srcs)| srcs.iter().cloned()));

        tracing::info!(
            links = external.len(),
            images = images.len(),
            "Verifying external links and images"
        );

        let link_results = checker.check_all(&external).await;
        for page in pages {
            for link in &page.external_links {
                let Some(check) = link_results.get(link) else {
                    continue;
                };
                match &check.verdict {
                    LinkVerdict::Ok { .. } => {}
                    LinkVerdict::BotBlocked { status } => analysis.bot_blocked_links.push(BrokenLink {
                        from: page.url.clone(),
                        to: link.clone(),
                        status: Some(*status),
                        error: None,
                    }),
                    LinkVerdict::Broken { status, error } => {
                        analysis.broken_external_links.push(BrokenLink {
                            from: page.url.clone(),
                            to: link.clone(),
                            status: *status,
                            error: error.clone(),
                        })
                    }
                }
            }
        }

        let image_results = checker.check_all(&images).await;
        for (page_url, srcs) in &images_by_page {
            for src in srcs {
                if let Some(check) = image_results.get(src)
                    && let LinkVerdict::Broken { status, error } = &check.verdict
                {
                    analysis.broken_images.push(BrokenImage {
                        page: page_url.to_string(),
                        src: src.clone(),
                        status: *status,
                        error: error.clone(),
                    });
                }
            }
        }
    }
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

fn resolved_image_urls(page: &CrawledPage) -> Vec<String> {
    let Ok(base) = Url::parse(&page.url) else {
        return vec![];
    };
    let srcs = page
        .metadata
        .images
        .iter()
        .flatten()
        .filter_map(|img| base.join(&img.src).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string());
    unique(srcs)
}

/// Groups of pages sharing an identical non-empty value (after trimming).
pub fn find_duplicates<F>(pages: &[&CrawledPage], value_of: F) -> Vec<DuplicateGroup>
where
    F: Fn(&CrawledPage) -> Option<&str>,
{
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();

    for page in pages {
        let Some(value) = value_of(page).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let urls = groups.entry(value.to_string()).or_insert_with(|| {
            order.push(value.to_string());
            Vec::new()
        });
        urls.push(page.url.clone());
    }

    order
        .into_iter()
        .filter_map(|value| {
            let urls = groups.remove(&value)?;
            (urls.len() > 1).then_some(DuplicateGroup { value, urls })
        })
        .collect()
}

pub fn h1_issues(pages: &[&CrawledPage]) -> Vec<H1Issue> {
    pages
        .iter()
        .filter_map(|p| {
            let issue = match p.h1s.len() {
                0 => H1IssueKind::Missing,
                1 => return None,
                _ => H1IssueKind::Multiple,
            };
            Some(H1Issue {
                url: p.url.clone(),
                issue,
                count: p.h1s.len(),
            })
        })
        .collect()
}

/// Matches outgoing internal links against crawled pages that failed.
/// Non-HTML targets exist and are reported separately from broken ones.
pub fn internal_link_failures(
    in_scope: &[&CrawledPage],
    analyzable: &[&CrawledPage],
) -> (Vec<BrokenLink>, Vec<NonHtmlLink>) {
    let failed: HashMap<&str, &CrawledPage> = in_scope
        .iter()
        .filter(|p| p.is_failed())
        .map(|p| (p.url.as_str(), *p))
        .collect();

    let mut broken = Vec::new();
    let mut non_html = Vec::new();

    for page in analyzable {
        for link in &page.internal_links {
            let Some(target) = failed.get(link.as_str()) else {
                continue;
            };
            if target.is_non_html() {
                non_html.push(NonHtmlLink {
                    from: page.url.clone(),
                    to: link.clone(),
                    content_type: target.content_type.clone(),
                });
            } else {
                broken.push(BrokenLink {
                    from: page.url.clone(),
                    to: link.clone(),
                    status: target.status,
                    error: target.error.clone(),
                });
            }
        }
    }

    (broken, non_html)
}

/// Incoming internal link count per analyzable page (self-links excluded).
pub fn inlink_counts(pages: &[&CrawledPage]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> =
        pages.iter().map(|p| (p.url.clone(), 0)).collect();

    for page in pages {
        for link in &page.internal_links {
            let Some(target) = normalize_url_str(link) else {
                continue;
            };
            if target == page.url {
                continue;
            }
            if let Some(count) = counts.get_mut(&target) {
                *count += 1;
            }
        }
    }

    counts
}

fn slowest_pages(pages: &[&CrawledPage]) -> Vec<SlowPage> {
    let mut sorted: Vec<&CrawledPage> = pages.to_vec();
    sorted.sort_by(|a, b| b.response_time_ms.cmp(&a.response_time_ms));
    sorted
        .into_iter()
        .take(SLOWEST_PAGES_LIMIT)
        .map(|p| SlowPage {
            url: p.url.clone(),
            response_time_ms: p.response_time_ms,
        })
        .collect()
}

fn structured_data_distribution(pages: &[&CrawledPage]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for ty in pages.iter().flat_map(|p| p.structured_data_types.iter()) {
        *counts.entry(ty.clone()).or_insert(0) += 1;
    }
    counts
}

fn content_type_counts(pages: &[&CrawledPage]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for content_type in pages.iter().filter_map(|p| p.content_type.as_deref()) {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        *counts.entry(mime).or_insert(0) += 1;
    }
    counts
}

fn sitemap_coverage(
    all_pages: &[CrawledPage],
    analyzable: &[&CrawledPage],
    sitemap_urls: &[String],
) -> (Vec<String>, Vec<String>) {
    let listed: HashSet<String> = sitemap_urls
        .iter()
        .filter_map(|u| normalize_url_str(u))
        .collect();
    let crawled: HashSet<&str> = all_pages.iter().map(|p| p.url.as_str()).collect();

    let not_in_sitemap = analyzable
        .iter()
        .filter(|p| !listed.contains(&p.url))
        .map(|p| p.url.clone())
        .collect();
    let sitemap_only = unique(
        sitemap_urls
            .iter()
            .filter_map(|u| normalize_url_str(u))
            .filter(|u| !crawled.contains(u.as_str())),
    );

    (not_in_sitemap, sitemap_only)
}

/// Deducts duplicate-content penalties from page scores.
///
/// This is the one place a [`crate::models::ValidationResult`] changes after
/// it was produced: each page in a duplicate-title group loses
/// [`DUPLICATE_TITLE_PENALTY`] points and gains a critical error, each page in
/// a duplicate-description group loses [`DUPLICATE_DESCRIPTION_PENALTY`] and
/// gains an optional warning. Scores clamp at 0 and grades are recomputed.
pub fn apply_cross_page_penalties(pages: &mut [CrawledPage], analysis: &CrawlAnalysis) {
    let title_groups = group_index(&analysis.duplicate_titles);
    let description_groups = group_index(&analysis.duplicate_descriptions);

    for page in pages.iter_mut() {
        let Some(validation) = page.validation.as_mut() else {
            continue;
        };

        if let Some(others) = title_groups.get(page.url.as_str()) {
            validation.score = validation.score.saturating_sub(DUPLICATE_TITLE_PENALTY);
            validation.errors.push(ValidationRule {
                id: "duplicate-title".to_string(),
                name: "Unique title".to_string(),
                description: "Title is not shared with other crawled pages".to_string(),
                weight: 0,
                severity: Severity::Critical,
                status: RuleStatus::Error,
                message: Some(format!(
                    "Title is shared with {} other page(s) (-{} points)",
                    others, DUPLICATE_TITLE_PENALTY
                )),
                value: page.metadata.title.clone(),
                expected: Some("unique title".to_string()),
            });
        }

        if let Some(others) = description_groups.get(page.url.as_str()) {
            validation.score = validation.score.saturating_sub(DUPLICATE_DESCRIPTION_PENALTY);
            validation.warnings.push(ValidationRule {
                id: "duplicate-description".to_string(),
                name: "Unique meta description".to_string(),
                description: "Meta description is not shared with other crawled pages".to_string(),
                weight: 0,
                severity: Severity::Optional,
                status: RuleStatus::Warn,
                message: Some(format!(
                    "Meta description is shared with {} other page(s) (-{} points)",
                    others, DUPLICATE_DESCRIPTION_PENALTY
                )),
                value: page.metadata.description.clone(),
                expected: Some("unique meta description".to_string()),
            });
        }

        validation.grade = Grade::from_score(validation.score);
    }
}

/// url -> number of other pages in its group
fn group_index(groups: &[DuplicateGroup]) -> HashMap<&str, usize> {
    groups
        .iter()
        .flat_map(|g| g.urls.iter().map(move |u| (u.as_str(), g.urls.len() - 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_page_heuristics() {
        let heuristics = AppPageHeuristics::default();
        assert!(heuristics.is_app_page("https://x.dev/app/projects", 500, 0));
        assert!(heuristics.is_app_page("https://x.dev/signup/onboarding", 500, 0));
        assert!(heuristics.is_app_page("https://x.dev/new?step=2", 500, 0));
        assert!(heuristics.is_app_page("https://x.dev/landing", 10, 12));
        assert!(!heuristics.is_app_page("https://x.dev/blog/apps-we-love", 500, 0));
        assert!(!heuristics.is_app_page("https://x.dev/landing", 10, 1));
    }
}
