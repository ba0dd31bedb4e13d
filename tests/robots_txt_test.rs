mod server;

use seo_audit::crawler::{CrawlOptions, CrawlScheduler};
use seo_audit::http_client::DEFAULT_USER_AGENT;
use seo_audit::robots::RobotsClient;
use seo_audit::safe_fetch::{AddressPolicy, SafeFetcher};
use server::{Route, TestSite, html_page};
use std::time::Duration;
use url::Url;

const ROBOTS: &str = "User-agent: *
Disallow: /admin
Disallow: /secret
Disallow: /private/
Allow: /private/public

User-agent: seo-audit
Disallow: /no-audit

Sitemap: {origin}/sitemap.xml
";

fn local_fetcher() -> SafeFetcher {
    SafeFetcher::new(
        Duration::from_secs(5),
        DEFAULT_USER_AGENT,
        AddressPolicy {
            allow_private: true,
        },
    )
    .expect("Failed to build fetcher")
}

fn robots_route(status: u16, body: &str) -> Route {
    Route::with_status(status)
        .content_type("text/plain")
        .body(body)
}

fn site() -> TestSite {
    let links = ["/admin", "/secret", "/private/file", "/private/public", "/allowed"]
        .iter()
        .map(|p| format!(r#"<a href="{p}">{p}</a>"#))
        .collect::<String>();

    TestSite::new()
        .route("/robots.txt", robots_route(200, ROBOTS))
        .page("/", html_page("Home", &links))
        .page("/admin", html_page("Admin", ""))
        .page("/secret", html_page("Secret", ""))
        .page("/private/file", html_page("Private", ""))
        .page("/private/public", html_page("Public", ""))
        .page("/allowed", html_page("Allowed", ""))
}

#[tokio::test]
async fn test_robots_client_fetches_and_parses() {
    let (base_url, hits) = site().start().await;
    let origin = Url::parse(&base_url).unwrap();

    let robots = RobotsClient::new(local_fetcher())
        .fetch(&origin)
        .await
        .expect("robots.txt should be found");

    assert_eq!(hits.get("/robots.txt"), 1);
    assert_eq!(robots.sitemaps(), [format!("{}/sitemap.xml", base_url)]);

    assert!(!robots.is_allowed("/admin", "Mozilla/5.0 (compatible; OtherBot/1.0)"));
    assert!(!robots.is_allowed("/private/file", "OtherBot"));
    assert!(robots.is_allowed("/private/public", "OtherBot"));
    assert!(robots.is_allowed("/allowed", "OtherBot"));

    // a named group replaces the wildcard group entirely
    assert!(!robots.is_allowed("/no-audit", DEFAULT_USER_AGENT));
    assert!(robots.is_allowed("/admin", DEFAULT_USER_AGENT));
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let (base_url, _) = TestSite::new()
        .page("/", html_page("Home", ""))
        .start()
        .await;
    let origin = Url::parse(&base_url).unwrap();

    assert!(RobotsClient::new(local_fetcher()).fetch(&origin).await.is_none());
}

#[tokio::test]
async fn test_robots_server_error_allows_everything() {
    let (base_url, _) = TestSite::new()
        .route("/robots.txt", robots_route(500, "Server Error"))
        .start()
        .await;
    let origin = Url::parse(&base_url).unwrap();

    assert!(RobotsClient::new(local_fetcher()).fetch(&origin).await.is_none());
}

#[tokio::test]
async fn test_unreachable_robots_allows_everything() {
    let origin = Url::parse("http://127.0.0.1:9").unwrap();
    assert!(RobotsClient::new(local_fetcher()).fetch(&origin).await.is_none());
}

#[tokio::test]
async fn test_robots_blocked_by_address_policy() {
    let (base_url, hits) = site().start().await;
    let origin = Url::parse(&base_url).unwrap();

    let strict = SafeFetcher::new(
        Duration::from_secs(5),
        DEFAULT_USER_AGENT,
        AddressPolicy::default(),
    )
    .unwrap();

    assert!(RobotsClient::new(strict).fetch(&origin).await.is_none());
    assert_eq!(hits.get("/robots.txt"), 0);
}

#[tokio::test]
async fn test_crawl_honours_allow_inside_disallowed_directory() {
    let (base_url, hits) = site().start().await;

    let options = CrawlOptions {
        delay_ms: 0,
        use_sitemap: false,
        check_external_links: false,
        verify_assets: false,
        allow_private_network: true,
        respect_robots_txt: true,
        user_agent: "Mozilla/5.0 (compatible; OtherBot/1.0)".to_string(),
        ..Default::default()
    };
    let result = CrawlScheduler::new(&base_url, options)
        .unwrap()
        .crawl()
        .await;

    for blocked in ["/admin", "/secret", "/private/file"] {
        assert_eq!(hits.get(blocked), 0, "{} should not be fetched", blocked);
        assert!(result.skipped_urls.contains(&format!("{}{}", base_url, blocked)));
    }
    assert_eq!(hits.get("/private/public"), 1);
    assert_eq!(hits.get("/allowed"), 1);
    assert_eq!(result.pages.len(), 3);
}
