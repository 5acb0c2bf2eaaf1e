//! SQLite-backed [`Registry`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use super::Registry;
use crate::models::{CrawlStatus, DomainConfig, FilterRow};

const DOMAIN_COLUMNS: &str = "domain, home_page, date_domain_added, indexing_page_limit, \
    owner_verified, verification_required, site_category, api_enabled, include_in_public_search, \
    indexing_type, indexing_enabled, indexing_current_status, indexing_status_last_updated, \
    indexing_frequency_secs, web_feed";

/// A registration as submitted, before any crawl.
#[derive(Debug, Clone)]
pub struct NewDomain {
    pub domain: String,
    pub home_page: String,
    pub page_limit: u32,
    pub owner_verified: bool,
    pub verification_required: bool,
    pub site_category: String,
    pub api_enabled: bool,
    pub include_in_public_search: bool,
    pub indexing_type: String,
    pub indexing_frequency: chrono::Duration,
}

pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a domain as PENDING, or update the registration details of
    /// an existing one without touching its crawl status.
    pub async fn add_domain(&self, new: &NewDomain, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO domains (domain, home_page, date_domain_added, indexing_page_limit,
                owner_verified, verification_required, site_category, api_enabled,
                include_in_public_search, indexing_type, indexing_enabled,
                indexing_current_status, indexing_status_last_updated, indexing_frequency_secs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 'PENDING', ?, ?)
            ON CONFLICT(domain) DO UPDATE SET
                home_page = excluded.home_page,
                indexing_page_limit = excluded.indexing_page_limit,
                owner_verified = excluded.owner_verified,
                verification_required = excluded.verification_required,
                site_category = excluded.site_category,
                api_enabled = excluded.api_enabled,
                include_in_public_search = excluded.include_in_public_search,
                indexing_type = excluded.indexing_type,
                indexing_frequency_secs = excluded.indexing_frequency_secs
            "#,
        )
        .bind(&new.domain)
        .bind(&new.home_page)
        .bind(now.timestamp())
        .bind(new.page_limit as i64)
        .bind(new.owner_verified)
        .bind(new.verification_required)
        .bind(&new.site_category)
        .bind(new.api_enabled)
        .bind(new.include_in_public_search)
        .bind(&new.indexing_type)
        .bind(now.timestamp())
        .bind(new.indexing_frequency.num_seconds())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to register domain {}", new.domain))?;

        Ok(())
    }

    pub async fn add_filter(&self, domain: &str, action: &str, filter_type: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT INTO indexing_filters (domain, action, type, value) VALUES (?, ?, ?, ?)")
            .bind(domain)
            .bind(action)
            .bind(filter_type)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_subdomain_aware_domain(&self, domain: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO subdomain_aware_domains (domain) VALUES (?)")
            .bind(domain)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_domains(&self) -> Result<Vec<DomainConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM domains ORDER BY domain ASC",
            DOMAIN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    pub async fn domain(&self, domain: &str) -> Result<Option<DomainConfig>> {
        let row = sqlx::query(&format!("SELECT {} FROM domains WHERE domain = ?", DOMAIN_COLUMNS))
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Status transitions of `domain`, oldest first, as (status, message).
    pub async fn status_history(&self, domain: &str) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT status, message FROM indexing_log WHERE domain = ? ORDER BY id ASC",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("status"), r.get("message")))
            .collect())
    }

    async fn log_status(
        &self,
        domain: &str,
        status: CrawlStatus,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO indexing_log (domain, status, message, logged_at) VALUES (?, ?, ?, ?)")
            .bind(domain)
            .bind(status.as_str())
            .bind(message)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn feed_links(&self, domain: &str) -> Result<HashSet<String>> {
        let links: Vec<String> = sqlx::query_scalar("SELECT url FROM domain_feed_links WHERE domain = ?")
            .bind(domain)
            .fetch_all(&self.pool)
            .await?;
        Ok(links.into_iter().collect())
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<DomainConfig>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut domain = row_to_domain(&row)?;
            domain.feed_entry_urls = self.feed_links(&domain.domain).await?;
            out.push(domain);
        }
        Ok(out)
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn row_to_domain(row: &SqliteRow) -> Result<DomainConfig> {
    let status: String = row.get("indexing_current_status");
    let page_limit: i64 = row.get("indexing_page_limit");
    Ok(DomainConfig {
        domain: row.get("domain"),
        home_page: row.get("home_page"),
        date_domain_added: ts(row.get("date_domain_added")),
        indexing_page_limit: u32::try_from(page_limit).unwrap_or(0),
        owner_verified: row.get("owner_verified"),
        verification_required: row.get("verification_required"),
        site_category: row.get("site_category"),
        api_enabled: row.get("api_enabled"),
        include_in_public_search: row.get("include_in_public_search"),
        indexing_type: row.get("indexing_type"),
        indexing_enabled: row.get("indexing_enabled"),
        status: status.parse()?,
        status_updated_at: ts(row.get("indexing_status_last_updated")),
        indexing_frequency: chrono::Duration::seconds(row.get("indexing_frequency_secs")),
        feed_entry_urls: HashSet::new(),
        web_feed: row.get("web_feed"),
    })
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn reset_stuck(
        &self,
        timeout: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let cutoff = (now - timeout).timestamp();
        let reset: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE domains SET
                indexing_current_status = 'PENDING',
                indexing_status_last_updated = ?,
                indexing_lease = NULL
            WHERE indexing_current_status = 'RUNNING' AND indexing_status_last_updated < ?
            RETURNING domain
            "#,
        )
        .bind(now.timestamp())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for domain in &reset {
            self.log_status(domain, CrawlStatus::Pending, "reset after stuck RUNNING job", now)
                .await?;
        }
        Ok(reset)
    }

    async fn expire_unverified(&self, grace: chrono::Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = (now - grace).timestamp();
        let expired: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE domains SET indexing_enabled = 0
            WHERE verification_required = 1
              AND owner_verified = 0
              AND indexing_enabled = 1
              AND date_domain_added < ?
            RETURNING domain
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for domain in &expired {
            tracing::info!(%domain, "disabled indexing, ownership not verified within grace period");
        }
        Ok(expired.len() as u64)
    }

    async fn select_due(
        &self,
        indexing_type: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainConfig>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM domains
            WHERE indexing_type = ?
              AND indexing_enabled = 1
              AND (indexing_current_status = 'PENDING'
                   OR (indexing_current_status = 'COMPLETE'
                       AND ? - indexing_status_last_updated > indexing_frequency_secs))
            ORDER BY CASE indexing_current_status WHEN 'PENDING' THEN 0 ELSE 1 END,
                     owner_verified DESC,
                     indexing_status_last_updated ASC,
                     domain ASC
            LIMIT ?
            "#,
            DOMAIN_COLUMNS
        ))
        .bind(indexing_type)
        .bind(now.timestamp())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn try_admit(
        &self,
        domain: &str,
        expected: CrawlStatus,
        seen_at: DateTime<Utc>,
        lease: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !expected.can_transition_to(CrawlStatus::Running) {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE domains SET
                indexing_current_status = 'RUNNING',
                indexing_status_last_updated = ?,
                indexing_lease = ?
            WHERE domain = ?
              AND indexing_current_status = ?
              AND indexing_status_last_updated = ?
            "#,
        )
        .bind(now.timestamp())
        .bind(lease)
        .bind(domain)
        .bind(expected.as_str())
        .bind(seen_at.timestamp())
        .execute(&self.pool)
        .await?;

        let admitted = result.rows_affected() == 1;
        if admitted {
            self.log_status(domain, CrawlStatus::Running, "", now).await?;
        }
        Ok(admitted)
    }

    async fn mark_complete(
        &self,
        domain: &str,
        lease: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE domains SET
                indexing_current_status = 'COMPLETE',
                indexing_status_last_updated = ?,
                indexing_lease = NULL
            WHERE domain = ? AND indexing_current_status = 'RUNNING' AND indexing_lease = ?
            "#,
        )
        .bind(now.timestamp())
        .bind(domain)
        .bind(lease)
        .execute(&self.pool)
        .await?;

        let completed = result.rows_affected() == 1;
        if completed {
            self.log_status(domain, CrawlStatus::Complete, message, now).await?;
        }
        Ok(completed)
    }

    async fn filters_for(&self, domain: &str) -> Result<Vec<FilterRow>> {
        let rows = sqlx::query(
            "SELECT domain, type, value, action FROM indexing_filters WHERE domain = ? ORDER BY id ASC",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FilterRow {
                domain: row.get("domain"),
                filter_type: row.get("type"),
                value: row.get("value"),
                action: row.get("action"),
            })
            .collect())
    }

    async fn indexed_domains(&self) -> Result<Vec<String>> {
        let domains: Vec<String> = sqlx::query_scalar("SELECT domain FROM domains ORDER BY domain ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(domains)
    }

    async fn subdomain_aware_domains(&self) -> Result<Vec<String>> {
        let domains: Vec<String> =
            sqlx::query_scalar("SELECT domain FROM subdomain_aware_domains ORDER BY domain ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(domains)
    }

    async fn record_web_feed(
        &self,
        domain: &str,
        feed_url: &str,
        entry_urls: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE domains SET web_feed = ? WHERE domain = ?")
            .bind(feed_url)
            .bind(domain)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM domain_feed_links WHERE domain = ?")
            .bind(domain)
            .execute(&mut *tx)
            .await?;

        for url in entry_urls {
            sqlx::query("INSERT OR IGNORE INTO domain_feed_links (domain, url) VALUES (?, ?)")
                .bind(domain)
                .bind(url)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
