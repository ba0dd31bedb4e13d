pub mod analyzer;
pub mod assets;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod error;
pub mod extractor;
pub mod http_client;
pub mod link_checker;
pub mod metadata;
pub mod models;
pub mod reporter;
pub mod robots;
pub mod rules;
pub mod safe_fetch;
pub mod sitemap;
pub mod url_utils;
pub mod validator;

use anyhow::{Context, Result};
use cli::Cli;
use colored::*;
use config::Config;
use crawler::CrawlScheduler;
use indicatif::{ProgressBar, ProgressStyle};
use models::CrawledPage;
use reporter::Reporter;
use std::sync::Arc;

pub use crawler::CrawlOptions;
pub use models::{CrawlResult, ResolvedMetadata, ValidationResult};
pub use validator::{RuleEngine, ValidateOptions, validate_metadata, validate_with_rules};

pub async fn run(args: Cli) -> Result<()> {
    let args = match Config::load(args.config.as_deref())? {
        Some(config) => config.merge_with_cli(&args),
        None => args,
    };
    let json_output = args.output == "json";

    if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
        anyhow::bail!("URL must start with http:// or https://");
    }

    if !json_output {
        println!("{}", "SEO Audit".bright_cyan().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!();
        println!("{} {}", "Starting crawl:".bright_white().bold(), args.url);
        println!("{} {}", "Max depth:".bright_white().bold(), args.depth);
        println!("{} {}", "Max pages:".bright_white().bold(), args.max_pages);
        println!();
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner:.cyan} Crawled {pos} pages {msg}")
            .context("Invalid progress bar template")?,
    );
    if json_output {
        progress.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut options = args.crawl_options();
    let bar = progress.clone();
    options.on_page = Some(Arc::new(move |page: &CrawledPage| {
        bar.inc(1);
        bar.set_message(page.url.clone());
    }));

    let scheduler = CrawlScheduler::new(&args.url, options).context("Failed to start crawl")?;
    let result = scheduler.crawl().await;
    progress.finish_and_clear();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        Reporter::print_text_report(&result);
    }

    if let Some(filename) = &args.save {
        Reporter::save_json_report(&result, filename)?;
    }

    if let Some(threshold) = args.fail_under
        && result.score < threshold
    {
        anyhow::bail!(
            "Site score {} is below the required {}",
            result.score,
            threshold
        );
    }

    Ok(())
}
