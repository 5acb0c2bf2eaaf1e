//! `sidx sweep` and `sidx schedule`.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::index::SqliteIndex;
use crate::models::CrawlStatus;
use crate::registry::SqliteRegistry;
use crate::scheduler::Scheduler;

/// Maintenance only: reset stuck crawls and expire unverified domains.
pub async fn run_sweep(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    let index = SqliteIndex::new(pool.clone());
    let scheduler = Scheduler::new(&registry, &index, &config.scheduler);

    let now = Utc::now();
    let reset = scheduler.recover_stuck(now).await?;
    let expired = scheduler.expire_unverified(now).await?;

    println!("sweep");
    println!("  reset to PENDING: {}", reset.len());
    for domain in &reset {
        println!("    {}", domain);
    }
    println!("  expired unverified: {}", expired);
    println!("ok");

    pool.close().await;
    Ok(())
}

#[derive(Serialize)]
struct Candidate {
    domain: String,
    status: CrawlStatus,
    owner_verified: bool,
    page_limit: u32,
}

/// Run a scheduling cycle and print its plan as JSON on stdout.
///
/// With `dry_run` nothing is written: the due batch is printed without
/// maintenance or admission.
pub async fn run_schedule(config: &Config, dry_run: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone());
    let index = SqliteIndex::new(pool.clone());
    let scheduler = Scheduler::new(&registry, &index, &config.scheduler);
    let now = Utc::now();

    if dry_run {
        let batch = scheduler
            .select_batch(config.scheduler.batch_size, now)
            .await?;
        let candidates: Vec<Candidate> = batch
            .into_iter()
            .map(|d| Candidate {
                domain: d.domain,
                status: d.status,
                owner_verified: d.owner_verified,
                page_limit: d.indexing_page_limit,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else {
        let plan = scheduler.plan_cycle(now).await?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
    }

    pool.close().await;
    Ok(())
}
