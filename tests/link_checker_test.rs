mod server;

use seo_audit::http_client::DEFAULT_USER_AGENT;
use seo_audit::link_checker::{LinkChecker, LinkVerdict};
use seo_audit::safe_fetch::{AddressPolicy, SafeFetcher};
use server::{Route, TestSite};
use std::time::Duration;

fn local_checker() -> LinkChecker {
    let fetcher = SafeFetcher::new(
        Duration::from_secs(5),
        DEFAULT_USER_AGENT,
        AddressPolicy {
            allow_private: true,
        },
    )
    .expect("Failed to build fetcher");
    LinkChecker::new(fetcher)
}

async fn link_site() -> String {
    let (base_url, _) = TestSite::new()
        .route("/ok", Route::html("OK"))
        .route("/not-found", Route::with_status(404))
        .route("/server-error", Route::with_status(500))
        .route("/head-refused", Route::html("fine for GET").forbid_head())
        .route("/forbidden", Route::with_status(403))
        .route("/moved", Route::redirect("/ok"))
        .start()
        .await;
    base_url
}

#[tokio::test]
async fn test_working_and_broken_links() {
    let base_url = link_site().await;
    let checker = local_checker();

    let ok = checker.check(&format!("{}/ok", base_url)).await;
    assert_eq!(ok.verdict, LinkVerdict::Ok { status: 200 });
    assert!(!ok.is_broken());

    let missing = checker.check(&format!("{}/not-found", base_url)).await;
    assert!(missing.is_broken());
    assert_eq!(missing.status(), Some(404));

    let error = checker.check(&format!("{}/server-error", base_url)).await;
    assert!(error.is_broken());
    assert_eq!(error.status(), Some(500));
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let base_url = link_site().await;
    let check = local_checker().check(&format!("{}/moved", base_url)).await;
    assert_eq!(check.verdict, LinkVerdict::Ok { status: 200 });
}

#[tokio::test]
async fn test_head_refusal_falls_back_to_get() {
    let base_url = link_site().await;
    let check = local_checker()
        .check(&format!("{}/head-refused", base_url))
        .await;

    assert_eq!(check.verdict, LinkVerdict::Ok { status: 200 });
    assert!(!check.is_broken());
}

#[tokio::test]
async fn test_forbidden_after_get_is_bot_blocked() {
    let base_url = link_site().await;
    let check = local_checker()
        .check(&format!("{}/forbidden", base_url))
        .await;

    assert_eq!(check.verdict, LinkVerdict::BotBlocked { status: 403 });
    assert!(!check.is_broken());
}

#[tokio::test]
async fn test_check_all_covers_every_url() {
    let base_url = link_site().await;
    let urls: Vec<String> = (0..23)
        .map(|i| {
            if i % 2 == 0 {
                format!("{}/ok?i={}", base_url, i)
            } else {
                format!("{}/missing-{}", base_url, i)
            }
        })
        .collect();

    let results = local_checker().check_all(&urls).await;

    assert_eq!(results.len(), urls.len());
    assert_eq!(results.values().filter(|c| c.is_broken()).count(), 11);
}

#[tokio::test]
async fn test_private_targets_rejected_without_opt_in() {
    let base_url = link_site().await;
    let checker = LinkChecker::new(SafeFetcher::with_defaults().unwrap());

    let check = checker.check(&format!("{}/ok", base_url)).await;
    match check.verdict {
        LinkVerdict::Broken {
            status: None,
            error: Some(error),
        } => assert!(error.contains("Blocked address")),
        other => panic!("expected a blocked verdict, got {:?}", other),
    }
}
