use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Registered domains and their crawl status
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS domains (
            domain TEXT PRIMARY KEY,
            home_page TEXT NOT NULL,
            date_domain_added INTEGER NOT NULL,
            indexing_page_limit INTEGER NOT NULL,
            owner_verified INTEGER NOT NULL DEFAULT 0,
            verification_required INTEGER NOT NULL DEFAULT 0,
            site_category TEXT NOT NULL,
            api_enabled INTEGER NOT NULL DEFAULT 0,
            include_in_public_search INTEGER NOT NULL DEFAULT 1,
            indexing_type TEXT NOT NULL DEFAULT 'spider/default',
            indexing_enabled INTEGER NOT NULL DEFAULT 1,
            indexing_current_status TEXT NOT NULL DEFAULT 'PENDING',
            indexing_status_last_updated INTEGER NOT NULL,
            indexing_frequency_secs INTEGER NOT NULL,
            indexing_lease TEXT,
            web_feed TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS domain_feed_links (
            domain TEXT NOT NULL,
            url TEXT NOT NULL,
            PRIMARY KEY (domain, url),
            FOREIGN KEY (domain) REFERENCES domains(domain)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexing_filters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL,
            action TEXT NOT NULL,
            type TEXT NOT NULL,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexing_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            logged_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subdomain_aware_domains (
            domain TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Search index: one serialized record per page
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            url TEXT PRIMARY KEY,
            domain TEXT NOT NULL,
            record_json TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS page_outlinks (
            source_url TEXT NOT NULL,
            source_domain TEXT NOT NULL,
            target_url TEXT NOT NULL,
            target_host TEXT NOT NULL,
            PRIMARY KEY (source_url, target_url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='pages_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE pages_fts USING fts5(
                url UNINDEXED,
                title,
                description,
                tags,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_domains_due ON domains(indexing_current_status, owner_verified)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_filters_domain ON indexing_filters(domain)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_outlinks_target ON page_outlinks(target_host)")
        .execute(pool)
        .await?;

    Ok(())
}
