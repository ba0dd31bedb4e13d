use regex::Regex;
use url::Url;

/// File extensions that identify static assets rather than pages.
const ASSET_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "ico", "bmp", "tif", "tiff", "css", "js",
    "mjs", "map", "json", "xml", "txt", "pdf", "zip", "gz", "tar", "rar", "7z", "mp3", "mp4",
    "m4a", "webm", "ogg", "wav", "avi", "mov", "woff", "woff2", "ttf", "otf", "eot", "exe", "dmg",
    "apk", "csv", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "rss", "atom",
];

/// Canonical form used for the visited set and link comparisons:
/// fragment and empty query removed, trailing slash removed except on the root path.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    if normalized.query() == Some("") {
        normalized.set_query(None);
    }

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
        if normalized.path().is_empty() {
            normalized.set_path("/");
        }
    }

    normalized.to_string()
}

/// Parses and normalizes, returning `None` for anything that is not an absolute URL.
pub fn normalize_url_str(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| normalize_url(&u))
}

pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// True when the URL path ends in a well-known static-asset extension.
pub fn is_asset_url(url: &Url) -> bool {
    let Some(last_segment) = url.path_segments().and_then(|mut segments| segments.next_back())
    else {
        return false;
    };

    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        _ => false,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// True when both hosts name the same site, ignoring case and a `www.` prefix.
pub fn is_same_site(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(a), Some(b)) => strip_www(a).eq_ignore_ascii_case(strip_www(b)),
        _ => false,
    }
}

/// Maps `url` onto `base`'s origin (scheme, host and port) when both name the
/// same site. Returns `None` when it belongs to another site.
pub fn rewrite_to_origin(url: &Url, base: &Url) -> Option<Url> {
    if !is_same_site(url, base) {
        return None;
    }
    if is_same_origin(url, base) {
        return Some(url.clone());
    }

    let mut rewritten = url.clone();
    rewritten.set_scheme(base.scheme()).ok()?;
    rewritten.set_host(base.host_str()).ok()?;
    rewritten.set_port(base.port()).ok()?;
    Some(rewritten)
}

/// Compiled path globs: `*` matches within one segment, `**` across segments.
#[derive(Debug, Clone, Default)]
pub struct IgnorePatterns {
    patterns: Vec<Regex>,
}

impl IgnorePatterns {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| {
                let glob = glob.as_ref();
                match Regex::new(&glob_to_regex(glob)) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %glob, error = %e, "Ignoring invalid ignore pattern");
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    /// Matches against the URL's path; unparseable URLs never match.
    pub fn matches_url(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.matches_path(u.path()))
            .unwrap_or(false)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                regex.push_str(".*");
            } else {
                regex.push_str("[^/]*");
            }
        } else {
            regex.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
        }
    }

    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_normalize_url_strips_fragment_and_trailing_slash() {
        assert_eq!(
            normalize_url(&url("https://example.com/about/#team")),
            "https://example.com/about"
        );
        assert_eq!(normalize_url(&url("https://example.com/")), "https://example.com/");
        assert_eq!(normalize_url(&url("https://example.com")), "https://example.com/");
        assert_eq!(
            normalize_url(&url("https://example.com/a/?q=1")),
            "https://example.com/a?q=1"
        );
        assert_eq!(normalize_url(&url("https://example.com/b?")), "https://example.com/b");
    }

    #[test]
    fn test_is_asset_url() {
        assert!(is_asset_url(&url("https://example.com/logo.PNG")));
        assert!(is_asset_url(&url("https://example.com/static/app.js?v=3")));
        assert!(is_asset_url(&url("https://example.com/files/report.pdf")));
        assert!(!is_asset_url(&url("https://example.com/blog/post")));
        assert!(!is_asset_url(&url("https://example.com/page.html")));
        assert!(!is_asset_url(&url("https://example.com/.well-known")));
        assert!(!is_asset_url(&url("https://example.com/")));
    }

    #[test]
    fn test_same_origin() {
        assert!(is_same_origin(
            &url("https://example.com/a"),
            &url("https://example.com:443/b")
        ));
        assert!(!is_same_origin(
            &url("https://example.com/"),
            &url("http://example.com/")
        ));
        assert!(!is_same_origin(
            &url("http://127.0.0.1:8080/"),
            &url("http://127.0.0.1:8081/")
        ));
    }

    #[test]
    fn test_rewrite_to_origin() {
        let base = url("https://example.com/");

        assert_eq!(
            rewrite_to_origin(&url("https://www.example.com/pricing"), &base).map(|u| u.to_string()),
            Some("https://example.com/pricing".to_string())
        );
        assert_eq!(
            rewrite_to_origin(&url("https://example.com/docs"), &base).map(|u| u.to_string()),
            Some("https://example.com/docs".to_string())
        );
        assert!(rewrite_to_origin(&url("https://other.com/docs"), &base).is_none());

        let www_base = url("https://www.example.com/");
        assert_eq!(
            rewrite_to_origin(&url("https://example.com/x"), &www_base).map(|u| u.to_string()),
            Some("https://www.example.com/x".to_string())
        );
    }

    #[test]
    fn test_rewrite_to_origin_aligns_scheme_and_port() {
        let base = url("https://example.com/");

        assert_eq!(
            rewrite_to_origin(&url("http://example.com/docs"), &base).map(|u| u.to_string()),
            Some("https://example.com/docs".to_string())
        );
        assert_eq!(
            rewrite_to_origin(&url("https://example.com:8443/docs"), &base).map(|u| u.to_string()),
            Some("https://example.com/docs".to_string())
        );

        let local = url("http://127.0.0.1:4000/");
        let rewritten = rewrite_to_origin(&url("http://127.0.0.1:9999/a?b=1"), &local).unwrap();
        assert!(is_same_origin(&rewritten, &local));
        assert_eq!(rewritten.as_str(), "http://127.0.0.1:4000/a?b=1");
    }

    #[test]
    fn test_is_same_site() {
        assert!(is_same_site(&url("http://www.example.com/"), &url("https://example.com:8443/")));
        assert!(is_same_site(&url("http://127.0.0.1:1/"), &url("http://127.0.0.1:2/")));
        assert!(!is_same_site(&url("https://example.org/"), &url("https://example.com/")));
    }

    #[test]
    fn test_ignore_patterns_single_segment() {
        let patterns = IgnorePatterns::new(&["/blog/*"]);
        assert!(patterns.matches_path("/blog/first-post"));
        assert!(!patterns.matches_path("/blog/2024/first-post"));
        assert!(!patterns.matches_path("/docs/intro"));
    }

    #[test]
    fn test_ignore_patterns_cross_segment() {
        let patterns = IgnorePatterns::new(&["/admin/**", "**/*.php"]);
        assert!(patterns.matches_path("/admin/users/42"));
        assert!(patterns.matches_path("/legacy/index.php"));
        assert!(!patterns.matches_path("/administrator"));
        assert!(patterns.matches_url("https://example.com/admin/settings?tab=1"));
    }
}
