//! Index lookups: `sidx get` and `sidx inlinks`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::index::{LinkGraph, SqliteIndex};

/// Print the stored record for `url` as JSON.
pub async fn run_get(config: &Config, url: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let index = SqliteIndex::new(pool.clone());
    let page = index.get_page(url).await?;
    pool.close().await;

    match page {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => bail!("page not indexed: {}", url),
    }
}

/// Print the inlink map for `domain`: one target per line, followed by the
/// pages linking to it.
pub async fn run_inlinks(config: &Config, domain: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let index = SqliteIndex::new(pool.clone());
    let map = index.inlinks_for(domain).await?;
    pool.close().await;

    let mut targets: Vec<_> = map.into_iter().collect();
    targets.sort_by(|a, b| a.0.cmp(&b.0));

    println!("--- Inlinks to {} ({}) ---", domain, targets.len());
    for (target, sources) in targets {
        println!("{}", target);
        for source in sources {
            println!("  <- {}", source);
        }
    }
    Ok(())
}
