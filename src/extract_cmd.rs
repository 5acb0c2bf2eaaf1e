//! `sidx extract`: run the extractor on a saved page and print the record.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::domain::{extract_domain, same_page};
use crate::extractor::extract_page;
use crate::models::{CommonConfig, DocumentKind, FetchedPage, SiteConfig};
use crate::registry::{Registry, SqliteRegistry};

#[derive(Debug, Clone)]
pub struct ExtractArgs<'a> {
    pub file: &'a Path,
    pub url: &'a str,
    pub domain: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub xml: bool,
}

/// Cycle configuration for an offline extraction: the registry's when a
/// database exists, otherwise just the page's own domain.
async fn common_for(config: Option<&Config>, domain: &str) -> Result<CommonConfig> {
    if let Some(cfg) = config.filter(|c| c.db.path.exists()) {
        let pool = db::connect(cfg).await?;
        let registry = SqliteRegistry::new(pool.clone());
        let common = CommonConfig {
            domains_for_indexed_links: registry.indexed_domains().await?,
            domains_allowing_subdomains: registry.subdomain_aware_domains().await?,
        };
        pool.close().await;
        return Ok(common);
    }
    Ok(CommonConfig {
        domains_for_indexed_links: vec![domain.to_string()],
        domains_allowing_subdomains: Vec::new(),
    })
}

pub async fn run_extract(config: Option<&Config>, args: ExtractArgs<'_>) -> Result<()> {
    let body = std::fs::read_to_string(args.file)
        .with_context(|| format!("Failed to read page: {}", args.file.display()))?;

    let domain = match args.domain {
        Some(d) => d.to_string(),
        None => match extract_domain(args.url, &[]) {
            Some(d) => d,
            None => bail!("cannot derive a domain from '{}'; pass --domain", args.url),
        },
    };

    let mut headers = HashMap::new();
    if let Some(ct) = args.content_type {
        headers.insert("Content-Type".to_string(), ct.to_string());
    }
    let page = FetchedPage {
        url: args.url.to_string(),
        headers,
        body,
        kind: if args.xml {
            DocumentKind::Xml
        } else {
            DocumentKind::Html
        },
    };

    let home_page = format!("https://{}/", domain);
    let site = SiteConfig {
        domain: domain.clone(),
        home_page: home_page.clone(),
        date_domain_added: Utc::now(),
        page_limit: 1,
        owner_verified: false,
        site_category: config
            .map(|c| c.defaults.site_category.clone())
            .unwrap_or_else(|| Config::minimal().defaults.site_category),
        api_enabled: false,
        include_in_public_search: true,
        feed_entry_urls: HashSet::new(),
        web_feed: None,
        exclusions: Vec::new(),
        indexed_inlinks: HashMap::new(),
    };
    let common = common_for(config, &domain).await?;

    match extract_page(&page, &site, &common, same_page(args.url, &home_page))? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("null"),
    }
    Ok(())
}
