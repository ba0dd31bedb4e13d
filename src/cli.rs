use crate::crawler::CrawlOptions;
use crate::http_client::DEFAULT_USER_AGENT;
use clap::Parser;

pub const DEFAULT_MAX_PAGES: usize = 500;
pub const DEFAULT_DEPTH: usize = 5;
pub const DEFAULT_DELAY_MS: u64 = 500;
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_OUTPUT: &str = "text";

#[derive(Parser, Debug)]
#[command(name = "seo-audit")]
#[command(about = "Crawl a website and score its on-page SEO", long_about = None)]
pub struct Cli {
    /// The URL to start crawling from
    #[arg(value_name = "URL")]
    pub url: String,

    /// Maximum number of pages to crawl
    #[arg(short, long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,

    /// Maximum crawl depth
    #[arg(short, long, default_value_t = DEFAULT_DEPTH)]
    pub depth: usize,

    /// Politeness delay after each request, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DELAY_MS)]
    pub delay: u64,

    /// Number of concurrent workers
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Retries for throttled (429/503) responses
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout: u64,

    /// User-Agent sent with every request
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Treat rule warnings as errors
    #[arg(long)]
    pub strict: bool,

    /// Path glob to leave out of the analysis (repeatable)
    #[arg(long = "ignore", value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Rule id to disable (repeatable)
    #[arg(long = "disable-rule", value_name = "ID")]
    pub disable_rule: Vec<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: String,

    /// Save the JSON report to a file
    #[arg(short, long)]
    pub save: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not crawl URLs disallowed by robots.txt
    #[arg(long)]
    pub respect_robots_txt: bool,

    /// Do not seed the crawl from the sitemap
    #[arg(long)]
    pub no_sitemap: bool,

    /// Skip external link and image verification
    #[arg(long)]
    pub no_external: bool,

    /// Allow loopback and private network targets (local dev servers)
    #[arg(long)]
    pub allow_private: bool,

    /// Exit with an error when the site score is below this value
    #[arg(long, value_name = "SCORE")]
    pub fail_under: Option<u32>,

    /// Path to configuration file (JSON, TOML, or YAML)
    #[arg(long)]
    pub config: Option<String>,
}

impl Cli {
    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            max_pages: self.max_pages,
            max_depth: self.depth,
            delay_ms: self.delay,
            concurrency: self.concurrency,
            retries: self.retries,
            timeout_ms: self.timeout,
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            strict: self.strict,
            ignore_patterns: self.ignore.clone(),
            disabled_rules: self.disable_rule.clone(),
            use_sitemap: !self.no_sitemap,
            respect_robots_txt: self.respect_robots_txt,
            check_external_links: !self.no_external,
            allow_private_network: self.allow_private,
            ..CrawlOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_crawl_options() {
        let cli = Cli::parse_from(["seo-audit", "https://example.com"]);
        let options = cli.crawl_options();
        let defaults = CrawlOptions::default();

        assert_eq!(options.max_pages, defaults.max_pages);
        assert_eq!(options.max_depth, defaults.max_depth);
        assert_eq!(options.delay_ms, defaults.delay_ms);
        assert_eq!(options.concurrency, defaults.concurrency);
        assert_eq!(options.retries, defaults.retries);
        assert_eq!(options.timeout_ms, defaults.timeout_ms);
        assert_eq!(options.user_agent, defaults.user_agent);
        assert!(options.use_sitemap);
        assert!(options.check_external_links);
    }

    #[test]
    fn test_repeatable_flags() {
        let cli = Cli::parse_from([
            "seo-audit",
            "https://example.com",
            "--ignore",
            "/admin/**",
            "--ignore",
            "/drafts/*",
            "--disable-rule",
            "hreflang",
            "--no-sitemap",
            "--strict",
        ]);
        let options = cli.crawl_options();

        assert_eq!(options.ignore_patterns, vec!["/admin/**", "/drafts/*"]);
        assert_eq!(options.disabled_rules, vec!["hreflang"]);
        assert!(!options.use_sitemap);
        assert!(options.strict);
    }
}
