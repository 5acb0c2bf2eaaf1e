use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub defaults: RegistrationDefaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Settings for one scheduling cycle.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on domains admitted per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Only domains registered with this crawl method are selected.
    #[serde(default = "default_indexing_type")]
    pub indexing_type: String,
    /// A domain left RUNNING longer than this is reset to PENDING.
    #[serde(default = "default_stuck_timeout_secs")]
    pub stuck_timeout_secs: i64,
    #[serde(default = "default_unverified_grace_days")]
    pub unverified_grace_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            indexing_type: default_indexing_type(),
            stuck_timeout_secs: default_stuck_timeout_secs(),
            unverified_grace_days: default_unverified_grace_days(),
        }
    }
}

impl SchedulerConfig {
    pub fn stuck_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_timeout_secs)
    }

    pub fn unverified_grace(&self) -> chrono::Duration {
        chrono::Duration::days(self.unverified_grace_days)
    }
}

fn default_batch_size() -> usize {
    16
}
fn default_indexing_type() -> String {
    "spider/default".to_string()
}
fn default_stuck_timeout_secs() -> i64 {
    6 * 60 * 60
}
fn default_unverified_grace_days() -> i64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_concurrent_sites")]
    pub concurrent_sites: usize,
    /// Capacity of the channel between the fetch engine and extraction.
    #[serde(default = "default_page_buffer")]
    pub page_buffer: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrent_sites: default_concurrent_sites(),
            page_buffer: default_page_buffer(),
        }
    }
}

fn default_concurrent_sites() -> usize {
    4
}
fn default_page_buffer() -> usize {
    64
}

/// Values applied to newly registered domains when not given explicitly.
#[derive(Debug, Deserialize, Clone)]
pub struct RegistrationDefaults {
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_frequency_days")]
    pub frequency_days: i64,
    #[serde(default = "default_site_category")]
    pub site_category: String,
}

impl Default for RegistrationDefaults {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            frequency_days: default_frequency_days(),
            site_category: default_site_category(),
        }
    }
}

fn default_page_limit() -> u32 {
    50
}
fn default_frequency_days() -> i64 {
    28
}
fn default_site_category() -> String {
    "independent website".to_string()
}

impl Config {
    /// Configuration for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/sidx.sqlite"),
            },
            scheduler: SchedulerConfig::default(),
            crawl: CrawlConfig::default(),
            defaults: RegistrationDefaults::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.scheduler.batch_size == 0 {
        anyhow::bail!("scheduler.batch_size must be >= 1");
    }
    if config.scheduler.indexing_type.trim().is_empty() {
        anyhow::bail!("scheduler.indexing_type must not be empty");
    }
    if config.scheduler.stuck_timeout_secs <= 0 {
        anyhow::bail!("scheduler.stuck_timeout_secs must be > 0");
    }
    if config.scheduler.unverified_grace_days < 1 {
        anyhow::bail!("scheduler.unverified_grace_days must be >= 1");
    }

    if config.crawl.concurrent_sites == 0 {
        anyhow::bail!("crawl.concurrent_sites must be >= 1");
    }
    if config.crawl.page_buffer == 0 {
        anyhow::bail!("crawl.page_buffer must be >= 1");
    }

    if config.defaults.page_limit == 0 {
        anyhow::bail!("defaults.page_limit must be >= 1");
    }
    if config.defaults.frequency_days < 1 {
        anyhow::bail!("defaults.frequency_days must be >= 1");
    }

    Ok(config)
}
