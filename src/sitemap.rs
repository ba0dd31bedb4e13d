use crate::robots::RobotsTxt;
use crate::safe_fetch::{FetchOptions, SafeFetcher};
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use url::Url;

/// Deepest sitemap-index nesting followed below the root sitemap.
pub const MAX_SITEMAP_DEPTH: usize = 3;
/// Upper bound on page URLs collected across all sitemaps.
pub const MAX_SITEMAP_URLS: usize = 50_000;

/// Entries of one sitemap document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSitemap {
    /// `<url><loc>` entries
    pub urls: Vec<String>,
    /// `<sitemap><loc>` entries of a sitemap index
    pub sitemaps: Vec<String>,
}

/// Stream-parses sitemap XML. Invalid entries are skipped.
pub fn parse_sitemap(xml: &[u8]) -> ParsedSitemap {
    let mut parsed = ParsedSitemap::default();

    for entity in SiteMapReader::new(Cursor::new(xml)) {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    parsed.urls.push(url.to_string());
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    parsed.sitemaps.push(url.to_string());
                }
            }
            SiteMapEntity::Err(e) => {
                tracing::debug!(error = ?e, "Skipping invalid sitemap entry");
            }
        }
    }

    parsed
}

#[derive(Debug, Clone)]
pub struct SitemapClient {
    fetcher: SafeFetcher,
}

impl SitemapClient {
    pub fn new(fetcher: SafeFetcher) -> Self {
        Self { fetcher }
    }

    /// Sitemaps to try for a site: those declared in robots.txt, else `/sitemap.xml`.
    pub fn candidate_sitemaps(origin: &Url, robots: Option<&RobotsTxt>) -> Vec<String> {
        let declared: Vec<String> = robots
            .map(|r| r.sitemaps().to_vec())
            .unwrap_or_default();
        if !declared.is_empty() {
            return declared;
        }

        let mut fallback = origin.clone();
        fallback.set_path("/sitemap.xml");
        fallback.set_query(None);
        fallback.set_fragment(None);
        vec![fallback.to_string()]
    }

    /// Collects page URLs from every candidate sitemap, de-duplicated in order.
    pub async fn discover(&self, origin: &Url, robots: Option<&RobotsTxt>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for sitemap_url in Self::candidate_sitemaps(origin, robots) {
            for url in self.fetch_all(&sitemap_url).await {
                if urls.len() >= MAX_SITEMAP_URLS {
                    break;
                }
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }

        if !urls.is_empty() {
            tracing::info!(count = urls.len(), "Discovered URLs from sitemap");
        }
        urls
    }

    /// Follows a sitemap and any nested indexes.
    ///
    /// Indexes are walked with an explicit worklist; each sitemap is fetched at
    /// most once and nothing deeper than [`MAX_SITEMAP_DEPTH`] is followed.
    pub async fn fetch_all(&self, sitemap_url: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut worklist = VecDeque::from([(sitemap_url.to_string(), 0usize)]);
        let mut urls = Vec::new();

        while let Some((url, depth)) = worklist.pop_front() {
            if !visited.insert(url.clone()) {
                tracing::debug!(url = %url, "Sitemap already visited, skipping cycle");
                continue;
            }
            if depth > MAX_SITEMAP_DEPTH {
                tracing::warn!(url = %url, depth, "Sitemap index nested too deeply, skipping");
                continue;
            }

            let Some(body) = self.fetch_document(&url).await else {
                continue;
            };
            let parsed = parse_sitemap(&body);

            worklist.extend(parsed.sitemaps.into_iter().map(|child| (child, depth + 1)));

            let room = MAX_SITEMAP_URLS.saturating_sub(urls.len());
            urls.extend(parsed.urls.into_iter().take(room));
            if urls.len() >= MAX_SITEMAP_URLS {
                tracing::warn!(limit = MAX_SITEMAP_URLS, "Sitemap URL limit reached");
                break;
            }
        }

        urls
    }

    async fn fetch_document(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.fetcher.fetch(url, &FetchOptions::get()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to fetch sitemap");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(url = %url, status = %response.status(), "Sitemap not available");
            return None;
        }

        match response.bytes().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to read sitemap body");
                None
            }
        }
    }
}
