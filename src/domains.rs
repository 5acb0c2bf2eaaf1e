//! Registry management commands: `sidx domain`, `sidx filter`,
//! `sidx subdomains`.

use anyhow::{bail, Result};
use chrono::Utc;

use crate::config::Config;
use crate::db;
use crate::registry::sqlite::NewDomain;
use crate::registry::SqliteRegistry;

/// Options for `sidx domain add`; `None` falls back to `[defaults]`.
#[derive(Debug, Clone, Default)]
pub struct AddDomainArgs {
    pub domain: String,
    pub home_page: Option<String>,
    pub page_limit: Option<u32>,
    pub frequency_days: Option<i64>,
    pub category: Option<String>,
    pub indexing_type: Option<String>,
    pub owner_verified: bool,
    pub verification_required: bool,
    pub api_enabled: bool,
    pub private: bool,
}

impl AddDomainArgs {
    fn into_new_domain(self, config: &Config) -> Result<NewDomain> {
        let domain = self.domain.trim().to_ascii_lowercase();
        if domain.is_empty() || domain.contains('/') {
            bail!("invalid domain: '{}'", self.domain);
        }
        let home_page = self
            .home_page
            .unwrap_or_else(|| format!("https://{}/", domain));
        if url::Url::parse(&home_page).is_err() {
            bail!("invalid home page URL: '{}'", home_page);
        }
        let frequency_days = self.frequency_days.unwrap_or(config.defaults.frequency_days);
        if frequency_days < 1 {
            bail!("--frequency-days must be >= 1");
        }

        Ok(NewDomain {
            domain,
            home_page,
            page_limit: self.page_limit.unwrap_or(config.defaults.page_limit),
            owner_verified: self.owner_verified,
            verification_required: self.verification_required,
            site_category: self
                .category
                .unwrap_or_else(|| config.defaults.site_category.clone()),
            api_enabled: self.api_enabled,
            include_in_public_search: !self.private,
            indexing_type: self
                .indexing_type
                .unwrap_or_else(|| config.scheduler.indexing_type.clone()),
            indexing_frequency: chrono::Duration::days(frequency_days),
        })
    }
}

pub async fn run_domain_add(config: &Config, args: AddDomainArgs) -> Result<()> {
    let new = args.into_new_domain(config)?;
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    registry.add_domain(&new, Utc::now()).await?;

    println!("domain {}", new.domain);
    println!("  home page: {}", new.home_page);
    println!("  page limit: {}", new.page_limit);
    println!("  frequency: {} days", new.indexing_frequency.num_days());
    println!("ok");

    pool.close().await;
    Ok(())
}

pub async fn run_domain_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    let domains = registry.list_domains().await?;

    println!(
        "{:<32} {:<10} {:<9} {:<8} UPDATED",
        "DOMAIN", "STATUS", "VERIFIED", "ENABLED"
    );
    for d in &domains {
        println!(
            "{:<32} {:<10} {:<9} {:<8} {}",
            d.domain,
            d.status,
            d.owner_verified,
            d.indexing_enabled,
            d.status_updated_at.format("%Y-%m-%dT%H:%M:%SZ")
        );
    }

    pool.close().await;
    Ok(())
}

pub async fn run_filter_add(
    config: &Config,
    domain: &str,
    action: &str,
    filter_type: &str,
    value: &str,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    if registry.domain(domain).await?.is_none() {
        pool.close().await;
        bail!("domain not registered: {}", domain);
    }
    registry.add_filter(domain, action, filter_type, value).await?;
    println!("filter {} {}={} on {}", action, filter_type, value, domain);

    pool.close().await;
    Ok(())
}

pub async fn run_subdomains_add(config: &Config, domain: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    registry
        .add_subdomain_aware_domain(&domain.trim().to_ascii_lowercase())
        .await?;
    println!("subdomains of {} now count as distinct sites", domain);

    pool.close().await;
    Ok(())
}
