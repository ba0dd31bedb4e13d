use crate::safe_fetch::{AddressPolicy, PolicyResolver};
use reqwest::{Client, ClientBuilder, header};
use std::sync::Arc;
use std::time::Duration;

/// Crawler identity sent on page fetches unless the caller overrides it.
pub const DEFAULT_USER_AGENT: &str =
    concat!("seo-audit/", env!("CARGO_PKG_VERSION"), " (+https://github.com/seo-audit)");

/// Browser identity used when an origin refuses HEAD or bot agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15";

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const CONNECTION: &str = "keep-alive";

/// Creates the reqwest client every outbound request goes through.
///
/// Redirects are disabled here: [`crate::safe_fetch::SafeFetcher`] follows them by
/// hand so each hop is re-validated against the address policy. Hostnames are
/// resolved by [`PolicyResolver`] under the same policy.
pub fn build_http_client(
    timeout: Duration,
    user_agent: &str,
    policy: AddressPolicy,
) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static(ACCEPT_LANGUAGE),
    );
    headers.insert(
        header::CONNECTION,
        header::HeaderValue::from_static(CONNECTION),
    );

    ClientBuilder::new()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(reqwest::redirect::Policy::none())
        .dns_resolver(Arc::new(PolicyResolver::new(policy)))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}
