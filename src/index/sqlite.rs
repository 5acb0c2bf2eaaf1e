use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::{LinkGraph, PageSink};
use crate::domain::host_of;
use crate::models::PageRecord;

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The stored record for `url`, as JSON.
    pub async fn get_page(&self, url: &str) -> Result<Option<serde_json::Value>> {
        let json: Option<String> = sqlx::query_scalar("SELECT record_json FROM pages WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        match json {
            Some(j) => Ok(Some(
                serde_json::from_str(&j).with_context(|| format!("Corrupt record for {}", url))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn page_count(&self, domain: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE domain = ?")
            .bind(domain)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl PageSink for SqliteIndex {
    async fn put(&self, record: &PageRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pages (url, domain, record_json, indexed_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                domain = excluded.domain,
                record_json = excluded.record_json,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&record.url)
        .bind(&record.domain)
        .bind(&json)
        .bind(record.indexed_date.timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pages_fts WHERE url = ?")
            .bind(&record.url)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO pages_fts (url, title, description, tags, content) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.url)
        .bind(record.title.as_deref().unwrap_or(""))
        .bind(record.description.as_deref().unwrap_or(""))
        .bind(record.tags.join(" "))
        .bind(record.content.as_deref().unwrap_or(""))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM page_outlinks WHERE source_url = ?")
            .bind(&record.url)
            .execute(&mut *tx)
            .await?;
        for target in &record.indexed_outlinks {
            let Some(host) = host_of(target) else {
                continue;
            };
            sqlx::query(
                "INSERT OR IGNORE INTO page_outlinks (source_url, source_domain, target_url, target_host) VALUES (?, ?, ?, ?)",
            )
            .bind(&record.url)
            .bind(&record.domain)
            .bind(target)
            .bind(host)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl LinkGraph for SqliteIndex {
    async fn inlinks_for(&self, domain: &str) -> Result<HashMap<String, Vec<String>>> {
        let rows = sqlx::query(
            r#"
            SELECT target_url, source_url FROM page_outlinks
            WHERE (target_host = ?
                   OR substr(target_host, -(length(?) + 1)) = '.' || ?)
              AND source_domain <> ?
            ORDER BY target_url ASC, source_url ASC
            "#,
        )
        .bind(domain)
        .bind(domain)
        .bind(domain)
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            map.entry(row.get("target_url"))
                .or_default()
                .push(row.get("source_url"));
        }
        Ok(map)
    }
}
