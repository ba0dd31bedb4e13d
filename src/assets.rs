use crate::link_checker::{LinkChecker, LinkVerdict};
use crate::models::{AssetCheck, AssetKind, ResolvedMetadata};
use crate::safe_fetch::SafeFetcher;
use url::Url;

/// Confirms that URLs referenced from metadata resolve to the right kind of resource.
#[derive(Debug, Clone)]
pub struct AssetVerifier {
    checker: LinkChecker,
}

impl AssetVerifier {
    pub fn new(fetcher: SafeFetcher) -> Self {
        Self {
            checker: LinkChecker::new(fetcher),
        }
    }

    /// Absolute URLs to verify, resolved against the page they were found on.
    pub fn targets(metadata: &ResolvedMetadata, page_url: &Url) -> Vec<(AssetKind, String)> {
        let mut targets = Vec::new();
        let mut push = |kind: AssetKind, raw: Option<&str>| {
            let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
                return;
            };
            match page_url.join(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    targets.push((kind, url.to_string()))
                }
                _ => tracing::debug!(value = %raw, "Skipping unresolvable asset reference"),
            }
        };

        push(AssetKind::OgImage, metadata.og_image.as_deref());
        push(AssetKind::Favicon, metadata.favicon.as_deref());
        push(AssetKind::Canonical, metadata.canonical.as_deref());
        for href in metadata.alternates.iter().flat_map(|a| a.values()) {
            push(AssetKind::Hreflang, Some(href.as_str()));
        }

        targets
    }

    pub async fn verify(&self, metadata: &ResolvedMetadata, page_url: &Url) -> Vec<AssetCheck> {
        let targets = Self::targets(metadata, page_url);
        let mut urls: Vec<String> = targets.iter().map(|(_, url)| url.clone()).collect();
        urls.sort();
        urls.dedup();
        let results = self.checker.check_all(&urls).await;

        targets
            .into_iter()
            .map(|(kind, url)| {
                let Some(check) = results.get(&url) else {
                    return AssetCheck {
                        kind,
                        url,
                        status: None,
                        content_type: None,
                        ok: false,
                        message: Some("not checked".to_string()),
                    };
                };

                let (ok, message) = match &check.verdict {
                    LinkVerdict::Ok { .. } => {
                        if content_type_acceptable(kind, check.content_type.as_deref()) {
                            (true, None)
                        } else {
                            (
                                false,
                                Some(format!(
                                    "Unexpected content type {}",
                                    check.content_type.as_deref().unwrap_or("unknown")
                                )),
                            )
                        }
                    }
                    LinkVerdict::BotBlocked { .. } => {
                        (true, Some("Origin refuses automated requests".to_string()))
                    }
                    LinkVerdict::Broken { status, error } => (
                        false,
                        Some(error.clone().unwrap_or_else(|| match status {
                            Some(code) => format!("HTTP {}", code),
                            None => "Unreachable".to_string(),
                        })),
                    ),
                };

                AssetCheck {
                    kind,
                    url,
                    status: check.status(),
                    content_type: check.content_type.clone(),
                    ok,
                    message,
                }
            })
            .collect()
    }
}

/// A missing Content-Type is given the benefit of the doubt.
pub fn content_type_acceptable(kind: AssetKind, content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match kind {
        AssetKind::OgImage => mime.starts_with("image/"),
        AssetKind::Favicon => mime.starts_with("image/") || mime == "application/octet-stream",
        AssetKind::Canonical | AssetKind::Hreflang => {
            mime == "text/html" || mime == "application/xhtml+xml"
        }
    }
}
