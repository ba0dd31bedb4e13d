use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::{
    Cli, DEFAULT_CONCURRENCY, DEFAULT_DELAY_MS, DEFAULT_DEPTH, DEFAULT_MAX_PAGES, DEFAULT_OUTPUT,
    DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS,
};

/// File stem in the working directory and directory name under the user config home.
const CONFIG_NAME: &str = "seo-audit";

/// Configuration file structure that mirrors CLI arguments
/// All fields are optional to allow partial configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Maximum number of pages to crawl
    pub max_pages: Option<usize>,

    /// Maximum crawl depth
    pub depth: Option<usize>,

    /// Politeness delay in milliseconds
    pub delay: Option<u64>,

    /// Number of concurrent workers
    pub concurrency: Option<usize>,

    /// Retries for throttled responses
    pub retries: Option<u32>,

    /// Request timeout in milliseconds
    pub timeout: Option<u64>,

    pub user_agent: Option<String>,

    /// Treat rule warnings as errors
    pub strict: Option<bool>,

    /// Path globs left out of the analysis
    pub ignore: Option<Vec<String>>,

    /// Rule ids to disable
    pub disable_rules: Option<Vec<String>>,

    /// Output format: text or json
    pub output: Option<String>,

    /// Save report to file
    pub save: Option<String>,

    pub verbose: Option<bool>,

    pub respect_robots_txt: Option<bool>,

    /// Seed the crawl from the sitemap
    pub sitemap: Option<bool>,

    /// Verify external links and images
    pub external: Option<bool>,

    pub allow_private: Option<bool>,

    /// Minimum acceptable site score
    pub fail_under: Option<u32>,
}

/// Configuration file format based on file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                _ => None,
            })
    }

    /// Get file extensions for this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yaml", "yml"],
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let format = ConfigFormat::from_path(path)
            .with_context(|| format!("Unsupported config file format: {}", path.display()))?;

        let config = match format {
            ConfigFormat::Json => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            ConfigFormat::Toml => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
        };

        Ok(config)
    }

    /// Candidate config files in priority order: the working directory, then
    /// the user config directory (`$XDG_CONFIG_HOME` or `~/.config`).
    pub fn default_paths() -> Vec<PathBuf> {
        let formats = [ConfigFormat::Json, ConfigFormat::Toml, ConfigFormat::Yaml];
        let mut paths = Vec::new();

        for format in &formats {
            for ext in format.extensions() {
                paths.push(PathBuf::from(format!("{}.{}", CONFIG_NAME, ext)));
            }
        }

        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")));

        if let Some(config_home) = config_home {
            let app_dir = config_home.join(CONFIG_NAME);
            for format in &formats {
                for ext in format.extensions() {
                    paths.push(app_dir.join(format!("config.{}", ext)));
                }
            }
        }

        paths
    }

    /// Returns the first configuration file found, or None if no config exists
    pub fn from_default_paths() -> Result<Option<Self>> {
        for path in Self::default_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Ok(Some(Self::from_file(&path)?));
            }
        }
        Ok(None)
    }

    /// An explicit path must exist; otherwise the default locations are searched.
    pub fn load(explicit: Option<&str>) -> Result<Option<Self>> {
        match explicit {
            Some(path) => Self::from_file(Path::new(path)).map(Some),
            None => Self::from_default_paths(),
        }
    }

    /// Merge this configuration with CLI arguments.
    /// Flags given on the command line win over file values, which win over defaults.
    pub fn merge_with_cli(&self, cli: &Cli) -> Cli {
        Cli {
            url: cli.url.clone(),
            max_pages: pick(cli.max_pages, DEFAULT_MAX_PAGES, self.max_pages),
            depth: pick(cli.depth, DEFAULT_DEPTH, self.depth),
            delay: pick(cli.delay, DEFAULT_DELAY_MS, self.delay),
            concurrency: pick(cli.concurrency, DEFAULT_CONCURRENCY, self.concurrency),
            retries: pick(cli.retries, DEFAULT_RETRIES, self.retries),
            timeout: pick(cli.timeout, DEFAULT_TIMEOUT_MS, self.timeout),
            user_agent: cli.user_agent.clone().or_else(|| self.user_agent.clone()),
            strict: cli.strict || self.strict.unwrap_or(false),
            ignore: pick_list(&cli.ignore, &self.ignore),
            disable_rule: pick_list(&cli.disable_rule, &self.disable_rules),
            output: pick(cli.output.clone(), DEFAULT_OUTPUT.to_string(), self.output.clone()),
            save: cli.save.clone().or_else(|| self.save.clone()),
            verbose: cli.verbose || self.verbose.unwrap_or(false),
            respect_robots_txt: cli.respect_robots_txt || self.respect_robots_txt.unwrap_or(false),
            no_sitemap: cli.no_sitemap || self.sitemap == Some(false),
            no_external: cli.no_external || self.external == Some(false),
            allow_private: cli.allow_private || self.allow_private.unwrap_or(false),
            fail_under: cli.fail_under.or(self.fail_under),
            config: cli.config.clone(),
        }
    }
}

/// A CLI value equal to its default counts as "not given".
fn pick<T: PartialEq>(cli: T, default: T, file: Option<T>) -> T {
    if cli != default {
        return cli;
    }
    file.unwrap_or(cli)
}

fn pick_list(cli: &[String], file: &Option<Vec<String>>) -> Vec<String> {
    if !cli.is_empty() {
        return cli.to_vec();
    }
    file.clone().unwrap_or_default()
}
