use crate::http_client::BROWSER_USER_AGENT;
use crate::safe_fetch::{FetchOptions, SafeFetcher};
use futures::future::join_all;
use reqwest::StatusCode;
use std::collections::HashMap;

/// Requests in flight at once during verification.
pub const CHECK_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkVerdict {
    Ok { status: u16 },
    Broken { status: Option<u16>, error: Option<String> },
    /// 403 even for a browser-like GET: the origin refuses bots, the resource may exist.
    BotBlocked { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheck {
    pub url: String,
    pub verdict: LinkVerdict,
    pub content_type: Option<String>,
}

impl LinkCheck {
    pub fn is_broken(&self) -> bool {
        matches!(self.verdict, LinkVerdict::Broken { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match &self.verdict {
            LinkVerdict::Ok { status } | LinkVerdict::BotBlocked { status } => Some(*status),
            LinkVerdict::Broken { status, .. } => *status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkChecker {
    fetcher: SafeFetcher,
}

impl LinkChecker {
    pub fn new(fetcher: SafeFetcher) -> Self {
        Self { fetcher }
    }

    /// Checks every URL, `CHECK_BATCH_SIZE` at a time.
    pub async fn check_all(&self, urls: &[String]) -> HashMap<String, LinkCheck> {
        let mut results = HashMap::with_capacity(urls.len());

        for batch in urls.chunks(CHECK_BATCH_SIZE) {
            let checks = join_all(batch.iter().map(|url| self.check(url))).await;
            for check in checks {
                results.insert(check.url.clone(), check);
            }
        }

        results
    }

    /// HEAD first. Many origins reject HEAD or bot agents, so a 403/405 is
    /// retried as a GET with a browser User-Agent before judging the link.
    pub async fn check(&self, url: &str) -> LinkCheck {
        let head = match self.fetcher.fetch(url, &FetchOptions::head()).await {
            Ok(response) => response,
            Err(e) => {
                return LinkCheck {
                    url: url.to_string(),
                    verdict: LinkVerdict::Broken {
                        status: None,
                        error: Some(e.to_string()),
                    },
                    content_type: None,
                };
            }
        };

        let status = head.status();
        if status != StatusCode::FORBIDDEN && status != StatusCode::METHOD_NOT_ALLOWED {
            return LinkCheck {
                url: url.to_string(),
                verdict: verdict_for(status),
                content_type: head.content_type(),
            };
        }

        tracing::debug!(url = %url, status = %status, "HEAD refused, retrying as browser GET");
        let options = FetchOptions::get().with_user_agent(BROWSER_USER_AGENT);
        match self.fetcher.fetch(url, &options).await {
            Ok(get) if get.status() == StatusCode::FORBIDDEN => LinkCheck {
                url: url.to_string(),
                verdict: LinkVerdict::BotBlocked { status: 403 },
                content_type: get.content_type(),
            },
            Ok(get) => LinkCheck {
                url: url.to_string(),
                verdict: verdict_for(get.status()),
                content_type: get.content_type(),
            },
            Err(e) => LinkCheck {
                url: url.to_string(),
                verdict: LinkVerdict::Broken {
                    status: Some(status.as_u16()),
                    error: Some(e.to_string()),
                },
                content_type: None,
            },
        }
    }
}

fn verdict_for(status: StatusCode) -> LinkVerdict {
    if status.as_u16() >= 400 {
        LinkVerdict::Broken {
            status: Some(status.as_u16()),
            error: None,
        }
    } else {
        LinkVerdict::Ok {
            status: status.as_u16(),
        }
    }
}
