//! `sidx ingest`: index one admitted site from fetched pages on stdin.
//!
//! An external crawler runs `sidx schedule`, crawls each admitted site, and
//! pipes the pages (one JSON [`FetchedPage`](crate::models::FetchedPage)
//! per line) into `sidx ingest <domain> --plan <plan.json>`. Pages are
//! extracted and indexed, then the site's lease is completed.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::crawl::{crawl_admitted, CrawlContext, JsonLinesEngine};
use crate::db;
use crate::index::SqliteIndex;
use crate::progress::ProgressMode;
use crate::registry::SqliteRegistry;
use crate::scheduler::CyclePlan;

pub fn load_plan(path: &Path) -> Result<CyclePlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse plan file: {}", path.display()))
}

pub async fn run_ingest(
    config: &Config,
    domain: &str,
    plan_path: &Path,
    progress: ProgressMode,
) -> Result<()> {
    let plan = load_plan(plan_path)?;
    let Some(admitted) = plan.site(domain).cloned() else {
        bail!("domain {} is not admitted in {}", domain, plan_path.display());
    };

    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    let index = SqliteIndex::new(pool.clone());
    let engine = JsonLinesEngine::new(tokio::io::BufReader::new(tokio::io::stdin()));
    let reporter = progress.reporter();

    let ctx = CrawlContext {
        engine: &engine,
        sink: &index,
        progress: reporter.as_ref(),
        page_buffer: config.crawl.page_buffer,
    };

    let outcome = crawl_admitted(ctx, &registry, admitted, Arc::new(plan.common)).await?;
    pool.close().await;

    let Some(report) = outcome.report else {
        bail!("crawl of {} failed; it stays RUNNING until the stuck sweep", domain);
    };

    println!("ingest {}", domain);
    println!("  pages read: {}", report.pages_seen);
    println!("  indexed: {}", report.indexed);
    println!("  excluded: {}", report.excluded);
    println!("  failed: {}", report.failed);
    if let Some(feed) = &report.feed {
        println!("  web feed: {} ({} entries)", feed.url, feed.entry_urls.len());
    }
    if outcome.completed {
        println!("  status: COMPLETE");
    } else {
        println!("  status: lease lost, not completed");
    }
    println!("ok");

    Ok(())
}
