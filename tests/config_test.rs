mod server;

use assert_cmd::cargo;
use predicates::prelude::*;
use server::{TestSite, html_page};
use std::fs;
use tempfile::tempdir;

const LOCAL_CONFIG: &str = r#"{
    "max_pages": 1,
    "delay": 0,
    "output": "json",
    "sitemap": false,
    "external": false,
    "allow_private": true
}"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_json_config_drives_the_crawl() {
    let (base_url, _) = TestSite::new()
        .page("/", html_page("Config driven crawl", r#"<a href="/next">next</a>"#))
        .page("/next", html_page("Next", ""))
        .start()
        .await;

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("seo-audit.json");
    fs::write(&config_path, LOCAL_CONFIG).unwrap();

    let output = cargo::cargo_bin_cmd!("seo-audit")
        .arg(&base_url)
        .arg("--config")
        .arg(&config_path)
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{:?}", output);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["totalPages"], 1);
    assert_eq!(report["pages"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_flag_overrides_config() {
    let (base_url, _) = TestSite::new()
        .page("/", html_page("Config driven crawl", r#"<a href="/next">next</a>"#))
        .page("/next", html_page("Next", ""))
        .start()
        .await;

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("seo-audit.json");
    fs::write(&config_path, LOCAL_CONFIG).unwrap();

    let output = cargo::cargo_bin_cmd!("seo-audit")
        .arg(&base_url)
        .arg("--config")
        .arg(&config_path)
        .args(["--max-pages", "2"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "{:?}", output);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["totalPages"], 2);
}

#[test]
fn test_yaml_config_fail_under_gate() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("seo-audit.yaml");
    // Port 9 on loopback: nothing is scored, so the score is 0.
    fs::write(
        &config_path,
        "delay: 0\nsitemap: false\nexternal: false\nallow_private: true\nfail_under: 50\noutput: json\n",
    )
    .unwrap();

    cargo::cargo_bin_cmd!("seo-audit")
        .arg("http://127.0.0.1:9/")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("below the required 50"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    cargo::cargo_bin_cmd!("seo-audit")
        .arg("https://example.com")
        .args(["--config", "/definitely/not/here/seo-audit.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_unsupported_config_extension_is_an_error() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("seo-audit.ini");
    fs::write(&config_path, "depth=1").unwrap();

    cargo::cargo_bin_cmd!("seo-audit")
        .arg("https://example.com")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported config file format"));
}
