use thiserror::Error;

/// Failures surfaced by [`crate::safe_fetch::SafeFetcher`].
///
/// Security rejections (`UnsupportedScheme`, `BlockedAddress`, `TooManyRedirects`)
/// are final for the request that produced them and are never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{0}': only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("Blocked address: {host} ({reason})")]
    BlockedAddress { host: String, reason: String },

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("DNS resolution failed for {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl FetchError {
    /// True for rejections made by the address policy rather than the network.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            FetchError::UnsupportedScheme(_)
                | FetchError::BlockedAddress { .. }
                | FetchError::TooManyRedirects(_)
        )
    }
}
