//! The only path to the network.
//!
//! Every request the crate makes (pages, sitemaps, robots.txt, assets, link
//! checks) goes through [`SafeFetcher::fetch`], which:
//!
//! 1. rejects non-HTTP(S) schemes and denylisted hostnames,
//! 2. rejects IP literals in private, loopback or link-local ranges,
//! 3. resolves hostnames through [`PolicyResolver`], so every address the client
//!    connects to is the address that was checked (no DNS rebinding window),
//! 4. sends the request with redirects disabled in the client,
//! 5. follows 3xx responses by hand, repeating 1-3 for each hop.

use crate::error::FetchError;
use crate::http_client::{DEFAULT_USER_AGENT, build_http_client};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Client, Method, Response, StatusCode, header};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use url::{Host, Url};

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata",
    "kubernetes.default",
];

const BLOCKED_HOST_SUFFIXES: &[&str] = &[".local", ".internal", ".corp", ".lan"];

const BLOCKED_V4: &[(Ipv4Addr, u8, &str)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8, "unspecified"),
    (Ipv4Addr::new(127, 0, 0, 0), 8, "loopback"),
    (Ipv4Addr::new(10, 0, 0, 0), 8, "private"),
    (Ipv4Addr::new(172, 16, 0, 0), 12, "private"),
    (Ipv4Addr::new(192, 168, 0, 0), 16, "private"),
    (Ipv4Addr::new(169, 254, 0, 0), 16, "link-local"),
    (Ipv4Addr::new(100, 64, 0, 0), 10, "shared address space"),
    (Ipv4Addr::new(198, 18, 0, 0), 15, "benchmarking"),
];

const BLOCKED_V6: &[(Ipv6Addr, u8, &str)] = &[
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 128, "unspecified"),
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1), 128, "loopback"),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10, "link-local"),
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7, "unique-local"),
];

fn v4_in_range(ip: Ipv4Addr, base: Ipv4Addr, prefix: u8) -> bool {
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    (u32::from(ip) & mask) == (u32::from(base) & mask)
}

fn v6_in_range(ip: Ipv6Addr, base: Ipv6Addr, prefix: u8) -> bool {
    let mask = if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    };
    (u128::from(ip) & mask) == (u128::from(base) & mask)
}

/// Returns the denylist category an address falls into, if any.
/// IPv4-mapped IPv6 addresses are judged by their embedded IPv4 address.
pub fn blocked_ip_reason(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => BLOCKED_V4
            .iter()
            .find(|(base, prefix, _)| v4_in_range(v4, *base, *prefix))
            .map(|(_, _, label)| *label),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return blocked_ip_reason(IpAddr::V4(mapped));
            }
            BLOCKED_V6
                .iter()
                .find(|(base, prefix, _)| v6_in_range(v6, *base, *prefix))
                .map(|(_, _, label)| *label)
        }
    }
}

/// Returns why a hostname is denylisted, if it is.
pub fn blocked_hostname_reason(host: &str) -> Option<&'static str> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if BLOCKED_HOSTNAMES.contains(&host.as_str()) {
        return Some("denylisted hostname");
    }

    BLOCKED_HOST_SUFFIXES
        .iter()
        .any(|suffix| host.ends_with(suffix))
        .then_some("internal hostname suffix")
}

/// Decides which targets may be contacted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressPolicy {
    /// Skip the host/IP denylist. The scheme check still applies.
    pub allow_private: bool,
}

impl AddressPolicy {
    /// Syntactic checks that need no DNS: scheme, hostname denylist, IP literals.
    pub fn check_url(&self, url: &Url) -> Result<(), FetchError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(FetchError::UnsupportedScheme(scheme.to_string())),
        }

        let host = url.host().ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;

        if self.allow_private {
            return Ok(());
        }

        let reason = match &host {
            Host::Domain(domain) => blocked_hostname_reason(domain),
            Host::Ipv4(ip) => blocked_ip_reason(IpAddr::V4(*ip)),
            Host::Ipv6(ip) => blocked_ip_reason(IpAddr::V6(*ip)),
        };

        match reason {
            Some(reason) => Err(FetchError::BlockedAddress {
                host: host.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Resolves `host` and rejects it if any resolved address is blocked.
    pub async fn resolve_host(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, FetchError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| FetchError::Dns {
                host: host.to_string(),
                source,
            })?
            .collect();

        if !self.allow_private {
            for addr in &addrs {
                if let Some(reason) = blocked_ip_reason(addr.ip()) {
                    return Err(FetchError::BlockedAddress {
                        host: format!("{} -> {}", host, addr.ip()),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        Ok(addrs)
    }
}

/// DNS resolver installed in the HTTP client. Connections only ever go to
/// addresses that passed the policy.
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver {
    policy: AddressPolicy,
}

impl PolicyResolver {
    pub fn new(policy: AddressPolicy) -> Self {
        Self { policy }
    }
}

impl Resolve for PolicyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let policy = self.policy;
        Box::pin(async move {
            let addrs = policy.resolve_host(name.as_str(), 0).await?;
            Ok::<Addrs, Box<dyn std::error::Error + Send + Sync>>(Box::new(addrs.into_iter()))
        })
    }
}

/// Recovers a resolver rejection from the client's error chain.
fn surface_policy_error(err: reqwest::Error) -> FetchError {
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        if let Some(FetchError::BlockedAddress { host, reason }) = inner.downcast_ref::<FetchError>() {
            return FetchError::BlockedAddress {
                host: host.clone(),
                reason: reason.clone(),
            };
        }
        source = inner.source();
    }
    FetchError::Request(err)
}

/// Per-request knobs for [`SafeFetcher::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub user_agent: Option<String>,
    pub max_redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            user_agent: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn head() -> Self {
        Self {
            method: Method::HEAD,
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// A response whose every hop passed the address policy.
#[derive(Debug)]
pub struct SafeResponse {
    response: Response,
    final_url: Url,
    redirect_chain: Vec<String>,
}

impl SafeResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    /// Hops taken to reach the final URL, formatted as `"301 → https://..."`.
    pub fn redirect_chain(&self) -> &[String] {
        &self.redirect_chain
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<String> {
        self.header(header::CONTENT_TYPE).map(|s| s.to_string())
    }

    pub async fn text(self) -> Result<String, FetchError> {
        Ok(self.response.text().await?)
    }

    pub async fn bytes(self) -> Result<Vec<u8>, FetchError> {
        Ok(self.response.bytes().await?.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct SafeFetcher {
    client: Client,
    policy: AddressPolicy,
}

impl SafeFetcher {
    pub fn new(timeout: Duration, user_agent: &str, policy: AddressPolicy) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(timeout, user_agent, policy)?,
            policy,
        })
    }

    /// A fetcher with the crate's default identity and a strict address policy.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::new(Duration::from_secs(15), DEFAULT_USER_AGENT, AddressPolicy::default())
    }

    pub fn policy(&self) -> AddressPolicy {
        self.policy
    }

    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<SafeResponse, FetchError> {
        self.fetch_following(url, options, |_| true).await
    }

    /// Like [`fetch`](Self::fetch), but asks `follow` before each redirect hop.
    /// A declined hop ends the fetch with the 3xx response, and `final_url`
    /// names the target that was not requested.
    pub async fn fetch_following(
        &self,
        url: &str,
        options: &FetchOptions,
        follow: impl Fn(&Url) -> bool,
    ) -> Result<SafeResponse, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut redirect_chain = Vec::new();
        let mut remaining = options.max_redirects;

        loop {
            self.policy.check_url(&current)?;

            let mut request = self.client.request(options.method.clone(), current.clone());
            if let Some(user_agent) = &options.user_agent {
                request = request.header(header::USER_AGENT, user_agent);
            }

            tracing::debug!(url = %current, method = %options.method, "Sending request");
            let response = request.send().await.map_err(surface_policy_error)?;
            let status = response.status();

            let location = status
                .is_redirection()
                .then(|| response.headers().get(header::LOCATION))
                .flatten()
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_string());

            let Some(location) = location else {
                return Ok(SafeResponse {
                    response,
                    final_url: current,
                    redirect_chain,
                });
            };

            if remaining == 0 {
                return Err(FetchError::TooManyRedirects(options.max_redirects));
            }

            let next = current.join(&location).map_err(|e| FetchError::InvalidUrl {
                url: location.clone(),
                reason: e.to_string(),
            })?;
            redirect_chain.push(format!("{} → {}", status.as_u16(), next));
            if !follow(&next) {
                return Ok(SafeResponse {
                    response,
                    final_url: next,
                    redirect_chain,
                });
            }
            remaining -= 1;
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_blocked_ipv4_ranges() {
        for addr in [
            "127.0.0.1",
            "127.255.255.254",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "100.127.255.255",
            "198.18.0.1",
            "198.19.255.255",
        ] {
            assert!(blocked_ip_reason(ip(addr)).is_some(), "{} should be blocked", addr);
        }
    }

    #[test]
    fn test_public_ipv4_allowed() {
        for addr in ["8.8.8.8", "172.32.0.1", "100.128.0.1", "198.20.0.1", "93.184.216.34"] {
            assert!(blocked_ip_reason(ip(addr)).is_none(), "{} should be allowed", addr);
        }
    }

    #[test]
    fn test_blocked_ipv6_ranges() {
        for addr in ["::1", "fe80::1", "febf::1", "fc00::1", "fd12:3456::1"] {
            assert!(blocked_ip_reason(ip(addr)).is_some(), "{} should be blocked", addr);
        }
        assert!(blocked_ip_reason(ip("2606:4700::1111")).is_none());
    }

    #[test]
    fn test_ipv4_mapped_ipv6_blocked() {
        assert_eq!(blocked_ip_reason(ip("::ffff:127.0.0.1")), Some("loopback"));
        assert_eq!(blocked_ip_reason(ip("::ffff:169.254.169.254")), Some("link-local"));
        assert!(blocked_ip_reason(ip("::ffff:8.8.8.8")).is_none());
    }

    #[test]
    fn test_blocked_hostnames() {
        for host in [
            "localhost",
            "LOCALHOST.",
            "metadata.google.internal",
            "metadata",
            "kubernetes.default",
            "printer.local",
            "db.corp",
            "nas.lan",
        ] {
            assert!(blocked_hostname_reason(host).is_some(), "{} should be blocked", host);
        }
        assert!(blocked_hostname_reason("example.com").is_none());
        assert!(blocked_hostname_reason("localhost.example.com").is_none());
    }

    #[test]
    fn test_policy_check_url() {
        let policy = AddressPolicy::default();
        let check = |s: &str| policy.check_url(&Url::parse(s).unwrap());

        assert!(check("https://example.com/").is_ok());
        assert!(matches!(
            check("http://127.0.0.1/"),
            Err(FetchError::BlockedAddress { .. })
        ));
        assert!(matches!(
            check("http://[::ffff:10.0.0.1]/"),
            Err(FetchError::BlockedAddress { .. })
        ));
        assert!(matches!(
            check("ftp://example.com/"),
            Err(FetchError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            check("file:///etc/passwd"),
            Err(FetchError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_allow_private_keeps_scheme_check() {
        let policy = AddressPolicy { allow_private: true };
        assert!(policy.check_url(&Url::parse("http://127.0.0.1:8080/").unwrap()).is_ok());
        assert!(policy.check_url(&Url::parse("gopher://127.0.0.1/").unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_resolve_host_rejects_private_addresses() {
        let strict = AddressPolicy::default();
        assert!(matches!(
            strict.resolve_host("localhost", 80).await,
            Err(FetchError::BlockedAddress { .. })
        ));

        let permissive = AddressPolicy { allow_private: true };
        let addrs = permissive.resolve_host("localhost", 80).await.unwrap();
        assert!(addrs.iter().all(|addr| addr.ip().is_loopback()));
    }

    #[tokio::test]
    async fn test_client_resolver_applies_policy() {
        let name: Name = "localhost".parse().unwrap();
        let err = PolicyResolver::new(AddressPolicy::default())
            .resolve(name)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::BlockedAddress { .. })
        ));

        let name: Name = "localhost".parse().unwrap();
        let addrs: Vec<SocketAddr> = PolicyResolver::new(AddressPolicy { allow_private: true })
            .resolve(name)
            .await
            .unwrap()
            .collect();
        assert!(!addrs.is_empty());
    }
}
