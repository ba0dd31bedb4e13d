use crate::models::{CrawlAnalysis, CrawlResult, CrawledPage, Grade, RuleStatus, ValidationResult};
use crate::url_utils::IgnorePatterns;
use anyhow::{Context, Result};
use colored::*;
use std::fs::File;
use std::io::Write;
use std::time::Duration;
use url::Url;

/// Rows shown per section in the text report.
const TEXT_REPORT_LIMIT: usize = 10;

pub struct Reporter;

impl Reporter {
    /// Aggregates page results into the final report.
    ///
    /// Only pages that were scored count toward the totals: errored pages and
    /// pages matching an ignore pattern are listed but not averaged.
    pub fn build_result(
        start_url: &Url,
        pages: Vec<CrawledPage>,
        skipped_urls: Vec<String>,
        analysis: CrawlAnalysis,
        ignore: &IgnorePatterns,
        duration: Duration,
    ) -> CrawlResult {
        let scored: Vec<&ValidationResult> = pages
            .iter()
            .filter(|p| p.is_ok() && !ignore.matches_url(&p.url))
            .filter_map(|p| p.validation.as_ref())
            .collect();

        let score = Self::average_score(&scored);

        CrawlResult {
            start_url: start_url.to_string(),
            domain: start_url.host_str().unwrap_or_default().to_string(),
            total_pages: scored.len(),
            passed_pages: scored.iter().filter(|v| v.errors.is_empty()).count(),
            errored_pages: pages.iter().filter(|p| p.is_failed()).count(),
            score,
            grade: Grade::from_score(score),
            critical_errors: scored.iter().map(|v| v.critical_error_count()).sum(),
            optional_errors: scored.iter().map(|v| v.optional_error_count()).sum(),
            warnings: scored.iter().map(|v| v.warnings.len()).sum(),
            skipped_urls,
            duration_ms: duration.as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
            analysis,
            pages,
        }
    }

    /// Rounded mean of page scores; a crawl that scored nothing gets 0.
    pub fn average_score(results: &[&ValidationResult]) -> u32 {
        if results.is_empty() {
            return 0;
        }
        let total: u32 = results.iter().map(|v| v.score).sum();
        (total as f64 / results.len() as f64).round() as u32
    }

    pub fn print_text_report(result: &CrawlResult) {
        println!("\n{}", "=".repeat(80).bright_blue());
        println!("{}", "SEO Audit Report".bright_cyan().bold());
        println!("{}", "=".repeat(80).bright_blue());
        println!();

        println!("{}: {}", "Start URL".bright_white().bold(), result.start_url);
        println!("{}: {}", "Timestamp".bright_white().bold(), result.timestamp);
        println!(
            "{}: {:.1}s",
            "Duration".bright_white().bold(),
            result.duration_ms as f64 / 1000.0
        );
        println!();

        println!("{}", "Summary".bright_yellow().bold().underline());
        println!(
            "  Score:             {} ({})",
            colored_score(result.score),
            colored_grade(result.grade)
        );
        println!(
            "  Pages Scored:      {}",
            result.total_pages.to_string().bright_green()
        );
        println!(
            "  Pages Passed:      {}",
            result.passed_pages.to_string().bright_green()
        );
        println!("  Pages Errored:     {}", count(result.errored_pages, Color::BrightRed));
        println!("  Critical Errors:   {}", count(result.critical_errors, Color::BrightRed));
        println!("  Optional Errors:   {}", count(result.optional_errors, Color::Yellow));
        println!("  Warnings:          {}", count(result.warnings, Color::Yellow));
        println!(
            "  Skipped URLs:      {}",
            result.skipped_urls.len().to_string().bright_cyan()
        );
        println!();

        Self::print_analysis(&result.analysis);
        Self::print_pages(&result.pages);

        println!();
        println!("{}", "=".repeat(80).bright_blue());
    }

    fn print_analysis(analysis: &CrawlAnalysis) {
        println!("{}", "Site-wide Findings".bright_yellow().bold().underline());

        for (label, groups) in [
            ("Duplicate titles", &analysis.duplicate_titles),
            ("Duplicate descriptions", &analysis.duplicate_descriptions),
        ] {
            if groups.is_empty() {
                continue;
            }
            println!("  {} ({})", label.bright_white().bold(), groups.len());
            for group in groups.iter().take(TEXT_REPORT_LIMIT) {
                println!("    \"{}\"", group.value);
                for url in &group.urls {
                    println!("      {}", url.dimmed());
                }
            }
        }

        if !analysis.broken_internal_links.is_empty() {
            println!(
                "  {} ({})",
                "Broken internal links".bright_white().bold(),
                analysis.broken_internal_links.len()
            );
            for link in analysis.broken_internal_links.iter().take(TEXT_REPORT_LIMIT) {
                println!(
                    "    {} {} -> {}",
                    status_label(link.status),
                    link.from,
                    link.to
                );
            }
        }

        if !analysis.broken_external_links.is_empty() {
            println!(
                "  {} ({})",
                "Broken external links".bright_white().bold(),
                analysis.broken_external_links.len()
            );
            for link in analysis.broken_external_links.iter().take(TEXT_REPORT_LIMIT) {
                println!(
                    "    {} {} -> {}",
                    status_label(link.status),
                    link.from,
                    link.to
                );
            }
        }

        if !analysis.bot_blocked_links.is_empty() {
            println!(
                "  {} ({})",
                "Likely bot-blocked links".bright_white().bold(),
                analysis.bot_blocked_links.len()
            );
        }

        if !analysis.broken_images.is_empty() {
            println!(
                "  {} ({})",
                "Broken images".bright_white().bold(),
                analysis.broken_images.len()
            );
            for image in analysis.broken_images.iter().take(TEXT_REPORT_LIMIT) {
                println!("    {} {} on {}", status_label(image.status), image.src, image.page);
            }
        }

        let lists: [(&str, Vec<&str>); 5] = [
            (
                "Orphan pages",
                analysis.orphan_pages.iter().map(String::as_str).collect(),
            ),
            (
                "Thin content",
                analysis
                    .thin_content
                    .iter()
                    .filter(|p| !p.is_app_page)
                    .map(|p| p.url.as_str())
                    .collect(),
            ),
            (
                "Missing or multiple H1",
                analysis.h1_issues.iter().map(|i| i.url.as_str()).collect(),
            ),
            (
                "Not in sitemap",
                analysis.not_in_sitemap.iter().map(String::as_str).collect(),
            ),
            (
                "Blocked by robots.txt",
                analysis.robots_blocked.iter().map(String::as_str).collect(),
            ),
        ];
        for (label, urls) in lists {
            if urls.is_empty() {
                continue;
            }
            println!("  {} ({})", label.bright_white().bold(), urls.len());
            for url in urls.iter().take(TEXT_REPORT_LIMIT) {
                println!("    {}", url);
            }
        }

        let failed_assets: Vec<_> = analysis.asset_checks.iter().filter(|a| !a.ok).collect();
        if !failed_assets.is_empty() {
            println!(
                "  {} ({})",
                "Asset problems".bright_white().bold(),
                failed_assets.len()
            );
            for asset in failed_assets {
                println!(
                    "    [{:?}] {} {}",
                    asset.kind,
                    asset.url,
                    asset.message.as_deref().unwrap_or_default().dimmed()
                );
            }
        }

        if !analysis.slowest_pages.is_empty() {
            println!("  {}", "Slowest pages".bright_white().bold());
            for page in analysis.slowest_pages.iter().take(5) {
                println!("    {:>6} ms  {}", page.response_time_ms, page.url);
            }
        }

        println!();
    }

    fn print_pages(pages: &[CrawledPage]) {
        let mut pages_with_issues: Vec<&CrawledPage> = pages
            .iter()
            .filter(|p| {
                p.is_failed()
                    || p.validation
                        .as_ref()
                        .is_some_and(|v| !v.errors.is_empty() || !v.warnings.is_empty())
            })
            .collect();
        pages_with_issues.sort_by_key(|p| p.depth);

        if pages_with_issues.is_empty() {
            return;
        }

        println!("{}", "Pages with Issues".bright_yellow().bold().underline());
        for page in pages_with_issues {
            println!();
            println!("  {} {}", "URL:".bright_white().bold(), page.url);
            println!("    Status: {}", status_label(page.status));
            println!("    Depth:  {}", page.depth);

            if let Some(error) = &page.error {
                println!("    Error:  {}", error.bright_red());
                continue;
            }

            if let Some(validation) = &page.validation {
                println!(
                    "    Score:  {} ({})",
                    colored_score(validation.score),
                    colored_grade(validation.grade)
                );
                for rule in validation.errors.iter().chain(&validation.warnings) {
                    let tag = match rule.status {
                        RuleStatus::Error => "ERROR".bright_red(),
                        RuleStatus::Warn => "WARN ".yellow(),
                        RuleStatus::Pass => "PASS ".bright_green(),
                    };
                    println!(
                        "      [{}] {}: {}",
                        tag,
                        rule.name,
                        rule.message.as_deref().unwrap_or_default()
                    );
                }
            }
        }
    }

    pub fn save_json_report(result: &CrawlResult, filename: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(result)?;
        let mut file =
            File::create(filename).with_context(|| format!("Failed to create {}", filename))?;
        file.write_all(json.as_bytes())?;
        eprintln!("Report saved to: {}", filename.bright_green());
        Ok(())
    }
}

fn count(value: usize, color: Color) -> ColoredString {
    if value > 0 {
        value.to_string().color(color)
    } else {
        value.to_string().bright_green()
    }
}

fn colored_score(score: u32) -> ColoredString {
    match score {
        90.. => score.to_string().bright_green().bold(),
        70..=89 => score.to_string().yellow().bold(),
        _ => score.to_string().bright_red().bold(),
    }
}

fn colored_grade(grade: Grade) -> ColoredString {
    match grade {
        Grade::A | Grade::B => grade.to_string().bright_green(),
        Grade::C | Grade::D => grade.to_string().yellow(),
        Grade::F => grade.to_string().bright_red(),
    }
}

fn status_label(status: Option<u16>) -> ColoredString {
    status
        .map(|code| {
            if code < 300 {
                code.to_string().bright_green()
            } else if code < 400 {
                code.to_string().yellow()
            } else {
                code.to_string().bright_red()
            }
        })
        .unwrap_or_else(|| "N/A".dimmed())
}
