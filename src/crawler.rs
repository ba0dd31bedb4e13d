use crate::analyzer::{AnalysisContext, AppPageHeuristics, CrossPageAnalyzer, apply_cross_page_penalties};
use crate::assets::AssetVerifier;
use crate::error::FetchError;
use crate::extractor::extract_page;
use crate::http_client::DEFAULT_USER_AGENT;
use crate::link_checker::LinkChecker;
use crate::models::{CrawlResult, CrawledPage, NOT_HTML_PREFIX};
use crate::reporter::Reporter;
use crate::robots::{RobotsClient, RobotsTxt};
use crate::safe_fetch::{AddressPolicy, FetchOptions, SafeFetcher, SafeResponse};
use crate::sitemap::SitemapClient;
use crate::url_utils::{
    IgnorePatterns, is_asset_url, is_same_origin, is_same_site, normalize_url, rewrite_to_origin,
};
use crate::validator::{RuleEngine, ValidateOptions};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use url::Url;

/// Longest wait honoured from a `Retry-After` header.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Invoked once per recorded page, from whichever worker produced it.
pub type ProgressCallback = Arc<dyn Fn(&CrawledPage) + Send + Sync>;

/// Configuration for a crawl
#[derive(Clone)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub max_depth: usize,
    /// Politeness delay after each fetch, in milliseconds
    pub delay_ms: u64,
    pub concurrency: usize,
    /// Extra attempts for 429/503 responses
    pub retries: u32,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub strict: bool,
    pub ignore_patterns: Vec<String>,
    pub disabled_rules: Vec<String>,
    pub retry_base_delay_ms: u64,
    pub use_sitemap: bool,
    pub respect_robots_txt: bool,
    pub check_external_links: bool,
    pub verify_assets: bool,
    /// Lets the crawl reach loopback and private ranges (local dev servers).
    pub allow_private_network: bool,
    pub on_page: Option<ProgressCallback>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 500,
            max_depth: 5,
            delay_ms: 500,
            concurrency: 1,
            retries: 2,
            timeout_ms: 15_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            strict: false,
            ignore_patterns: vec![],
            disabled_rules: vec![],
            retry_base_delay_ms: 1_000,
            use_sitemap: true,
            respect_robots_txt: false,
            check_external_links: true,
            verify_assets: true,
            allow_private_network: false,
            on_page: None,
        }
    }
}

impl fmt::Debug for CrawlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlOptions")
            .field("max_pages", &self.max_pages)
            .field("max_depth", &self.max_depth)
            .field("delay_ms", &self.delay_ms)
            .field("concurrency", &self.concurrency)
            .field("retries", &self.retries)
            .field("timeout_ms", &self.timeout_ms)
            .field("user_agent", &self.user_agent)
            .field("strict", &self.strict)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("disabled_rules", &self.disabled_rules)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("use_sitemap", &self.use_sitemap)
            .field("respect_robots_txt", &self.respect_robots_txt)
            .field("check_external_links", &self.check_external_links)
            .field("verify_assets", &self.verify_assets)
            .field("allow_private_network", &self.allow_private_network)
            .field("on_page", &self.on_page.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl CrawlOptions {
    fn validate_options(&self) -> ValidateOptions {
        let options = ValidateOptions {
            strict: self.strict,
            ..ValidateOptions::default()
        };
        options.with_disabled(self.disabled_rules.iter().cloned())
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}

/// Frontier and results, touched only for short critical sections.
struct Frontier {
    /// Links on other origins are not followed. Starts as the start URL's
    /// origin and moves if the start page redirects within the same site.
    origin: Url,
    queue: VecDeque<(String, usize)>,
    /// Every URL ever queued or fetched
    seen: HashSet<String>,
    /// URLs already claimed by a worker, plus redirect targets they reached
    fetched: HashSet<String>,
    skipped: Vec<String>,
    skipped_set: HashSet<String>,
    claimed: usize,
    in_flight: usize,
    pages: Vec<CrawledPage>,
}

impl Frontier {
    fn new(origin: Url) -> Self {
        Self {
            origin,
            queue: VecDeque::new(),
            seen: HashSet::new(),
            fetched: HashSet::new(),
            skipped: vec![],
            skipped_set: HashSet::new(),
            claimed: 0,
            in_flight: 0,
            pages: vec![],
        }
    }

    fn skip(&mut self, url: String) {
        if self.skipped_set.insert(url.clone()) {
            self.skipped.push(url);
        }
    }
}

enum Next {
    Work(String, usize),
    Wait,
    Done,
}

struct Shared {
    frontier: Mutex<Frontier>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Frontier> {
        self.frontier.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Breadth-first crawl over a bounded worker pool.
pub struct CrawlScheduler {
    start_url: Url,
    options: CrawlOptions,
    fetcher: SafeFetcher,
    engine: RuleEngine,
    heuristics: AppPageHeuristics,
}

impl CrawlScheduler {
    pub fn new(start_url: &str, options: CrawlOptions) -> Result<Self, FetchError> {
        let start_url = Url::parse(start_url).map_err(|e| FetchError::InvalidUrl {
            url: start_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(start_url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(start_url.scheme().to_string()));
        }

        let policy = AddressPolicy {
            allow_private: options.allow_private_network,
        };
        let fetcher = SafeFetcher::new(
            Duration::from_millis(options.timeout_ms),
            &options.user_agent,
            policy,
        )?;

        Ok(Self {
            start_url,
            options,
            fetcher,
            engine: RuleEngine::default(),
            heuristics: AppPageHeuristics::default(),
        })
    }

    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_heuristics(mut self, heuristics: AppPageHeuristics) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Runs the crawl to completion. Individual page failures are recorded
    /// on the page and never abort the run.
    pub async fn crawl(&self) -> CrawlResult {
        let started = Instant::now();
        let options = &self.options;
        let ignore = IgnorePatterns::new(&options.ignore_patterns);
        let start = normalize_url(&self.start_url);

        tracing::info!(
            url = %start,
            max_pages = options.max_pages,
            max_depth = options.max_depth,
            concurrency = options.concurrency,
            "Starting crawl"
        );

        let robots = if options.use_sitemap || options.respect_robots_txt {
            RobotsClient::new(self.fetcher.clone()).fetch(&self.start_url).await
        } else {
            None
        };

        let sitemap_urls = if options.use_sitemap {
            self.sitemap_seeds(robots.as_ref()).await
        } else {
            vec![]
        };

        let mut frontier = Frontier::new(self.start_url.clone());
        frontier.seen.insert(start.clone());
        frontier.queue.push_back((start.clone(), 0));

        let worker = Arc::new(Worker {
            fetcher: self.fetcher.clone(),
            engine: self.engine.clone(),
            validate: options.validate_options(),
            heuristics: self.heuristics.clone(),
            options: options.clone(),
            robots: robots.clone().filter(|_| options.respect_robots_txt),
            shared: Shared {
                frontier: Mutex::new(frontier),
                wake: Notify::new(),
            },
        });

        {
            let mut state = worker.shared.lock();
            for url in &sitemap_urls {
                worker.enqueue(&mut state, url.clone(), 1);
            }
        }

        let concurrency = options.concurrency.max(1);
        let mut workers = JoinSet::new();
        for index in 0..concurrency {
            let worker = Arc::clone(&worker);
            workers.spawn(async move { worker.run(index, concurrency).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Crawl worker failed");
            }
        }

        let (mut pages, skipped_urls) = {
            let mut state = worker.shared.lock();
            let leftover: Vec<String> = state.queue.drain(..).map(|(url, _)| url).collect();
            for url in leftover {
                if !state.fetched.contains(&url) {
                    state.skip(url);
                }
            }
            let fetched = std::mem::take(&mut state.fetched);
            let skipped = std::mem::take(&mut state.skipped)
                .into_iter()
                .filter(|url| !fetched.contains(url))
                .collect::<Vec<_>>();
            (std::mem::take(&mut state.pages), skipped)
        };

        tracing::info!(
            pages = pages.len(),
            skipped = skipped_urls.len(),
            "Crawl finished, analyzing"
        );

        let checker = options
            .check_external_links
            .then(|| LinkChecker::new(self.fetcher.clone()));
        let context = AnalysisContext {
            ignore: &ignore,
            sitemap_urls: &sitemap_urls,
            robots: robots.as_ref(),
            user_agent: &options.user_agent,
        };
        let mut analysis = CrossPageAnalyzer::new(checker).analyze(&pages, &context).await;
        apply_cross_page_penalties(&mut pages, &analysis);

        if options.verify_assets
            && let Some(page) = pages.iter().find(|p| p.url == start && p.is_ok())
            && let Ok(page_url) = Url::parse(&page.url)
        {
            analysis.asset_checks = AssetVerifier::new(self.fetcher.clone())
                .verify(&page.metadata, &page_url)
                .await;
        }

        Reporter::build_result(
            &self.start_url,
            pages,
            skipped_urls,
            analysis,
            &ignore,
            started.elapsed(),
        )
    }

    /// Sitemap URLs mapped onto the crawl's host; foreign and asset URLs are dropped.
    async fn sitemap_seeds(&self, robots: Option<&RobotsTxt>) -> Vec<String> {
        let discovered = SitemapClient::new(self.fetcher.clone())
            .discover(&self.start_url, robots)
            .await;

        let mut seen = HashSet::new();
        let mut seeds = Vec::new();
        let mut dropped = 0usize;
        for raw in discovered {
            let Some(url) = Url::parse(&raw)
                .ok()
                .and_then(|u| rewrite_to_origin(&u, &self.start_url))
            else {
                dropped += 1;
                continue;
            };
            if is_asset_url(&url) {
                continue;
            }
            let normalized = normalize_url(&url);
            if seen.insert(normalized.clone()) {
                seeds.push(normalized);
            }
        }

        if dropped > 0 {
            tracing::warn!(dropped, "Dropped sitemap URLs on a foreign domain");
        }
        seeds
    }
}

/// State shared by every task in the pool.
struct Worker {
    fetcher: SafeFetcher,
    engine: RuleEngine,
    validate: ValidateOptions,
    heuristics: AppPageHeuristics,
    options: CrawlOptions,
    /// Present only when robots.txt should be obeyed
    robots: Option<RobotsTxt>,
    shared: Shared,
}

/// Result of processing one frontier item.
struct Visit {
    page: CrawledPage,
    links: Vec<String>,
    final_url: Option<String>,
}

impl Worker {
    async fn run(&self, index: usize, pool_size: usize) {
        let stagger = self.options.delay_ms * index as u64 / pool_size as u64;
        if stagger > 0 {
            tokio::time::sleep(Duration::from_millis(stagger)).await;
        }

        loop {
            let woken = self.shared.wake.notified();
            match self.next_item() {
                Next::Done => break,
                Next::Wait => woken.await,
                Next::Work(url, depth) => {
                    let visit = self.visit(&url, depth).await;
                    self.record(visit, depth);
                    self.shared.wake.notify_waiters();
                    self.politeness_delay().await;
                }
            }
        }

        self.shared.wake.notify_waiters();
    }

    fn next_item(&self) -> Next {
        let mut state = self.shared.lock();
        loop {
            if state.claimed >= self.options.max_pages {
                return Next::Done;
            }
            match state.queue.pop_front() {
                Some((url, depth)) => {
                    if !state.fetched.insert(url.clone()) {
                        continue;
                    }
                    state.claimed += 1;
                    state.in_flight += 1;
                    return Next::Work(url, depth);
                }
                None if state.in_flight == 0 => return Next::Done,
                None => return Next::Wait,
            }
        }
    }

    fn record(&self, visit: Visit, depth: usize) {
        let page = {
            let mut state = self.shared.lock();
            state.in_flight -= 1;

            if let Some(final_url) = visit.final_url {
                state.seen.insert(final_url.clone());
                state.fetched.insert(final_url);
            }
            for link in visit.links {
                self.enqueue(&mut state, link, depth + 1);
            }

            state.pages.push(visit.page.clone());
            visit.page
        };

        if let Some(on_page) = &self.options.on_page {
            on_page(&page);
        }
    }

    /// Adds a normalized URL to the frontier unless it was seen, is out of
    /// depth, or is disallowed by robots.txt.
    fn enqueue(&self, state: &mut Frontier, url: String, depth: usize) {
        if state.seen.contains(&url) {
            return;
        }
        if depth > self.options.max_depth {
            state.skip(url);
            return;
        }
        if let Some(robots) = &self.robots
            && let Ok(parsed) = Url::parse(&url)
            && !robots.is_url_allowed(&parsed, &self.options.user_agent)
        {
            tracing::info!(url = %url, "Skipping URL disallowed by robots.txt");
            state.skip(url);
            return;
        }

        state.seen.insert(url.clone());
        state.queue.push_back((url, depth));
    }

    async fn politeness_delay(&self) {
        let base = self.options.delay_ms;
        if base == 0 {
            return;
        }
        let jitter = fastrand::u64(0..=base / 2);
        tokio::time::sleep(Duration::from_millis(base + jitter)).await;
    }

    async fn visit(&self, url: &str, depth: usize) -> Visit {
        let started = Instant::now();
        let response = match self.fetch_with_retry(url).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_security_rejection() {
                    tracing::warn!(url = %url, error = %e, "Request rejected by address policy");
                } else {
                    tracing::warn!(url = %url, error = %e, "Failed to fetch page");
                }
                let mut page = CrawledPage::failed(url, depth, e.to_string());
                page.response_time_ms = elapsed_ms(started);
                return Visit {
                    page,
                    links: vec![],
                    final_url: None,
                };
            }
        };

        let status = response.status();
        let content_type = response.content_type();
        let redirect_chain = response.redirect_chain().to_vec();
        let final_url = response.final_url().clone();
        let final_normalized = normalize_url(&final_url);
        let origin = if depth == 0 {
            self.adopt_origin(&final_url)
        } else {
            self.shared.lock().origin.clone()
        };
        let redirected = (final_normalized != url && is_same_origin(&final_url, &origin))
            .then(|| final_normalized.clone());

        // A redirect onto a page another visit owns is recorded, not scored.
        if let Some(target) = &redirected
            && (status.is_redirection() || !self.claim(target))
        {
            tracing::debug!(url = %url, target = %target, "Redirects to an already fetched page");
            let mut page = CrawledPage::redirect_only(
                url,
                depth,
                status.as_u16(),
                target.clone(),
                redirect_chain,
            );
            page.content_type = content_type;
            page.response_time_ms = elapsed_ms(started);
            return Visit {
                page,
                links: vec![],
                final_url: redirected.clone(),
            };
        }

        let failed = |error: String, elapsed: u64| {
            let mut page = CrawledPage::failed(url, depth, error);
            page.status = Some(status.as_u16());
            page.content_type = content_type.clone();
            page.redirect_chain = redirect_chain.clone();
            page.response_time_ms = elapsed;
            page
        };

        if !status.is_success() {
            return Visit {
                page: failed(format!("HTTP {}", status.as_u16()), elapsed_ms(started)),
                links: vec![],
                final_url: redirected,
            };
        }

        if let Some(ct) = content_type.as_deref()
            && !is_html_content_type(ct)
        {
            return Visit {
                page: failed(format!("{} ({})", NOT_HTML_PREFIX, ct), elapsed_ms(started)),
                links: vec![],
                final_url: redirected,
            };
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Visit {
                    page: failed(e.to_string(), elapsed_ms(started)),
                    links: vec![],
                    final_url: redirected,
                };
            }
        };
        let response_time_ms = elapsed_ms(started);

        let extracted = extract_page(&body, &final_url);
        let validation = self.engine.validate(&extracted.metadata, &self.validate);
        let metadata = extracted.metadata;

        let h1s = metadata.h1s.clone().unwrap_or_default();
        let word_count = metadata.word_count.unwrap_or_default();
        let images = metadata.images.as_deref().unwrap_or_default();
        let image_count = images.len();
        let images_missing_alt = images.iter().filter(|img| img.alt.is_none()).count();

        let links = extracted
            .links
            .internal
            .iter()
            .filter(|link| {
                Url::parse(link)
                    .is_ok_and(|u| is_same_origin(&u, &origin) && !is_asset_url(&u))
            })
            .cloned()
            .collect();

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            score = validation.score,
            elapsed_ms = response_time_ms,
            "Page scored"
        );

        Visit {
            page: CrawledPage {
                url: url.to_string(),
                status: Some(status.as_u16()),
                content_type,
                validation: Some(validation),
                internal_links: extracted.links.internal,
                external_links: extracted.links.external,
                depth,
                error: None,
                redirected_to: None,
                is_app_page: self.heuristics.is_app_page(
                    url,
                    word_count,
                    extracted.script_count,
                ),
                h1s,
                word_count,
                response_time_ms,
                redirect_chain,
                structured_data_types: extracted.structured_data_types,
                script_count: extracted.script_count,
                image_count,
                images_missing_alt,
                metadata,
            },
            links,
            final_url: redirected,
        }
    }

    /// Claims a redirect target for this visit. False when another visit
    /// already fetched or claimed it.
    fn claim(&self, target: &str) -> bool {
        let mut state = self.shared.lock();
        state.seen.insert(target.to_string());
        state.fetched.insert(target.to_string())
    }

    /// True unless `next` is an already fetched page on the crawl origin.
    fn should_follow(&self, next: &Url) -> bool {
        let state = self.shared.lock();
        !(is_same_origin(next, &state.origin) && state.fetched.contains(&normalize_url(next)))
    }

    /// Moves the crawl origin when the start page lands elsewhere on the same
    /// site (scheme, `www.` or port change). Returns the origin in effect.
    fn adopt_origin(&self, final_url: &Url) -> Url {
        let mut state = self.shared.lock();
        if !is_same_origin(final_url, &state.origin) && is_same_site(final_url, &state.origin) {
            tracing::info!(from = %state.origin, to = %final_url, "Start URL redirected, following new origin");
            state.origin = final_url.clone();
        }
        state.origin.clone()
    }

    /// GET with bounded retries on 429/503. Only the calling worker sleeps.
    /// Redirects onto already fetched pages are not followed.
    async fn fetch_with_retry(&self, url: &str) -> Result<SafeResponse, FetchError> {
        let mut attempt = 0;
        loop {
            let response = self
                .fetcher
                .fetch_following(url, &FetchOptions::get(), |next| self.should_follow(next))
                .await?;
            let status = response.status();
            let throttled = status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::SERVICE_UNAVAILABLE;

            if !throttled || attempt >= self.options.retries {
                return Ok(response);
            }

            let wait = retry_after(&response).unwrap_or_else(|| self.options.backoff(attempt));
            attempt += 1;
            tracing::warn!(
                url = %url,
                status = status.as_u16(),
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Throttled, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Numeric `Retry-After` in seconds, capped at [`MAX_RETRY_AFTER`].
fn retry_after(response: &SafeResponse) -> Option<Duration> {
    let seconds: u64 = response.header(RETRY_AFTER)?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER))
}

fn is_html_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.contains("text/html") || lower.contains("application/xhtml")
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
