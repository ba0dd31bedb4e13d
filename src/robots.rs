use crate::safe_fetch::{FetchOptions, SafeFetcher};
use url::Url;

/// A single Allow or Disallow line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: String,
    allow: bool,
}

/// User-agent lines followed by the rules that apply to them
#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// A parsed robots.txt file
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
    sitemaps: Vec<String>,
}

impl RobotsTxt {
    /// Parses robots.txt content. Unknown directives and malformed lines are ignored.
    pub fn parse(content: &str) -> Self {
        let mut robots = RobotsTxt::default();
        let mut current: Option<Group> = None;

        for raw_line in content.lines() {
            let line = raw_line.split('#').next().unwrap_or_default().trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match field.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // an empty value names no agent but still opens a group
                    let agent = (!value.is_empty()).then(|| value.to_ascii_lowercase());
                    // consecutive User-agent lines share one group
                    match current.as_mut() {
                        Some(group) if group.rules.is_empty() => group.agents.extend(agent),
                        _ => {
                            if let Some(done) = current.take() {
                                robots.groups.push(done);
                            }
                            current = Some(Group {
                                agents: agent.into_iter().collect(),
                                rules: vec![],
                            });
                        }
                    }
                }
                directive @ ("allow" | "disallow") => {
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    // an empty Disallow allows everything; record nothing
                    if !value.is_empty() {
                        group.rules.push(Rule {
                            pattern: value.to_string(),
                            allow: directive == "allow",
                        });
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        robots.sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        if let Some(done) = current {
            robots.groups.push(done);
        }

        robots
    }

    /// Sitemap URLs declared anywhere in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Checks a path (with optional query) for the given user agent.
    ///
    /// Groups naming the agent take precedence over `*`. Among matching rules
    /// the longest pattern wins and Allow wins ties.
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        let agent = user_agent
            .split('/')
            .next()
            .unwrap_or(user_agent)
            .trim()
            .to_ascii_lowercase();

        let specific: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| {
                g.agents
                    .iter()
                    .any(|a| !a.is_empty() && a != "*" && agent.contains(a.as_str()))
            })
            .collect();

        let groups = if specific.is_empty() {
            self.groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect()
        } else {
            specific
        };

        let mut verdict: Option<(usize, bool)> = None;
        for rule in groups.iter().flat_map(|g| g.rules.iter()) {
            if !path_matches(&rule.pattern, path) {
                continue;
            }
            let specificity = rule.pattern.chars().count();
            verdict = match verdict {
                Some((best, _)) if specificity < best => verdict,
                Some((best, allowed)) if specificity == best => Some((best, allowed || rule.allow)),
                _ => Some((specificity, rule.allow)),
            };
        }

        verdict.is_none_or(|(_, allowed)| allowed)
    }

    pub fn is_url_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        self.is_allowed(&path, user_agent)
    }
}

/// Glob match used by robots.txt: `*` matches any run of characters and a
/// trailing `$` anchors the pattern to the end of the path. Without `$` the
/// pattern is a prefix match.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let pieces: Vec<&str> = pattern.split('*').collect();
    let Some(first) = pieces.first() else {
        return false;
    };
    if !path.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    if pieces.len() == 1 {
        return !anchored || path.len() == pos;
    }

    let last = pieces.len() - 1;
    for (i, piece) in pieces.iter().enumerate().skip(1) {
        if i == last && anchored {
            return path.len() >= pos + piece.len() && path.ends_with(piece);
        }
        match path[pos..].find(piece) {
            Some(offset) => pos += offset + piece.len(),
            None => return false,
        }
    }

    true
}

/// Fetches robots.txt through the safe fetcher
#[derive(Debug, Clone)]
pub struct RobotsClient {
    fetcher: SafeFetcher,
}

impl RobotsClient {
    pub fn new(fetcher: SafeFetcher) -> Self {
        Self { fetcher }
    }

    /// Gets the robots.txt URL for a site
    pub fn robots_url(origin: &Url) -> Url {
        let mut url = origin.clone();
        url.set_path("/robots.txt");
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Returns `None` when the file is missing or unreachable, which callers
    /// treat as "everything allowed".
    pub async fn fetch(&self, origin: &Url) -> Option<RobotsTxt> {
        let robots_url = Self::robots_url(origin);

        let response = match self.fetcher.fetch(robots_url.as_str(), &FetchOptions::get()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "Failed to fetch robots.txt");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::info!(
                url = %robots_url,
                status = %response.status(),
                "robots.txt not found, allowing all paths"
            );
            return None;
        }

        match response.text().await {
            Ok(content) => Some(RobotsTxt::parse(&content)),
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "Failed to read robots.txt");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matches_prefix() {
        assert!(path_matches("/admin", "/admin"));
        assert!(path_matches("/admin", "/admin/page"));
        assert!(!path_matches("/admin", "/user"));
    }

    #[test]
    fn test_path_matches_wildcard() {
        assert!(path_matches("/admin/*", "/admin/page"));
        assert!(path_matches("/admin/*", "/admin/"));
        assert!(path_matches("/*.php", "/index.php"));
        assert!(path_matches("/*.php", "/admin/index.php?x=1"));
        assert!(path_matches("/*/drafts/*", "/blog/drafts/one"));
        assert!(!path_matches("/*/drafts/*", "/blog/published/one"));
    }

    #[test]
    fn test_path_matches_end_marker() {
        assert!(path_matches("/admin$", "/admin"));
        assert!(!path_matches("/admin$", "/admin/"));
        assert!(path_matches("/*.pdf$", "/files/report.pdf"));
        assert!(!path_matches("/*.pdf$", "/files/report.pdf?dl=1"));
    }

    #[test]
    fn test_parse_groups_and_sitemaps() {
        let robots = RobotsTxt::parse(
            r#"
# comment line
User-agent: *
Disallow: /admin
Disallow: /private/
Allow: /private/public

USER-AGENT: googlebot
user-agent: seo-audit
Disallow: /secret   # trailing comment

Sitemap: https://example.com/sitemap.xml
sitemap: https://example.com/news.xml
"#,
        );

        assert_eq!(robots.groups.len(), 2);
        assert_eq!(robots.groups[1].agents, vec!["googlebot", "seo-audit"]);
        assert_eq!(
            robots.sitemaps(),
            ["https://example.com/sitemap.xml", "https://example.com/news.xml"]
        );
    }

    #[test]
    fn test_is_allowed_precedence() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /private/\nAllow: /private/public\nDisallow: /admin\n",
        );

        assert!(!robots.is_allowed("/admin", "seo-audit/0.1"));
        assert!(!robots.is_allowed("/private/file", "seo-audit/0.1"));
        assert!(robots.is_allowed("/private/public", "seo-audit/0.1"));
        assert!(robots.is_allowed("/public", "seo-audit/0.1"));
    }

    #[test]
    fn test_specific_agent_overrides_wildcard() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /\n\nUser-agent: seo-audit\nDisallow: /drafts\n",
        );

        assert!(robots.is_allowed("/pricing", "seo-audit/0.1 (+https://x)"));
        assert!(!robots.is_allowed("/drafts/1", "seo-audit/0.1"));
        assert!(!robots.is_allowed("/pricing", "OtherBot/2.0"));
    }

    #[test]
    fn test_empty_disallow_allows_all() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(robots.is_allowed("/anything", "seo-audit"));
    }

    #[test]
    fn test_empty_user_agent_matches_nobody() {
        let robots = RobotsTxt::parse("User-agent:\nDisallow: /\n\nUser-agent: *\nDisallow: /private\n");

        assert!(robots.is_allowed("/pricing", "seo-audit/0.1"));
        assert!(robots.is_allowed("/pricing", "OtherBot/2.0"));
        assert!(!robots.is_allowed("/private/x", "seo-audit/0.1"));
    }
}
