//! In-process [`Registry`] over a locked map. Used by tests and by callers
//! that build a plan without a database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{due_order, Registry};
use crate::models::{CrawlStatus, DomainConfig, FilterRow};

#[derive(Default)]
struct State {
    domains: HashMap<String, DomainConfig>,
    leases: HashMap<String, String>,
    filters: Vec<FilterRow>,
    subdomain_aware: Vec<String>,
    log: Vec<(String, CrawlStatus, String)>,
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: RwLock<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_domain(&self, domain: DomainConfig) {
        let mut state = self.state.write().await;
        state.domains.insert(domain.domain.clone(), domain);
    }

    pub async fn insert_filter(&self, filter: FilterRow) {
        self.state.write().await.filters.push(filter);
    }

    pub async fn insert_subdomain_aware(&self, domain: &str) {
        self.state.write().await.subdomain_aware.push(domain.to_string());
    }

    pub async fn get(&self, domain: &str) -> Option<DomainConfig> {
        self.state.read().await.domains.get(domain).cloned()
    }

    /// Status transitions of `domain`, oldest first.
    pub async fn status_history(&self, domain: &str) -> Vec<CrawlStatus> {
        self.state
            .read()
            .await
            .log
            .iter()
            .filter(|(d, _, _)| d == domain)
            .map(|(_, s, _)| *s)
            .collect()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn reset_stuck(
        &self,
        timeout: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let mut reset = Vec::new();
        for d in state.domains.values_mut() {
            if d.status == CrawlStatus::Running && d.status_updated_at < now - timeout {
                d.status = CrawlStatus::Pending;
                d.status_updated_at = now;
                reset.push(d.domain.clone());
            }
        }
        reset.sort();
        for domain in &reset {
            state.leases.remove(domain);
            state.log.push((
                domain.clone(),
                CrawlStatus::Pending,
                "reset after stuck RUNNING job".into(),
            ));
        }
        Ok(reset)
    }

    async fn expire_unverified(&self, grace: chrono::Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut expired = 0;
        for d in state.domains.values_mut() {
            if d.verification_required
                && !d.owner_verified
                && d.indexing_enabled
                && d.date_domain_added < now - grace
            {
                d.indexing_enabled = false;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn select_due(
        &self,
        indexing_type: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainConfig>> {
        let state = self.state.read().await;
        let mut due: Vec<DomainConfig> = state
            .domains
            .values()
            .filter(|d| d.is_due(indexing_type, now))
            .cloned()
            .collect();
        due.sort_by(due_order);
        due.truncate(limit);
        Ok(due)
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
        let mut state = self.state.write().await;
        let Some(row) = state.domains.get_mut(domain) else {
            return Ok(false);
        };
        if row.status != expected || row.status_updated_at != seen_at {
            return Ok(false);
        }
        row.status = CrawlStatus::Running;
        row.status_updated_at = now;
        state.leases.insert(domain.to_string(), lease.to_string());
        state
            .log
            .push((domain.to_string(), CrawlStatus::Running, String::new()));
        Ok(true)
    }

    async fn mark_complete(
        &self,
        domain: &str,
        lease: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.leases.get(domain).map(String::as_str) != Some(lease) {
            return Ok(false);
        }
        let Some(row) = state.domains.get_mut(domain) else {
            return Ok(false);
        };
        if row.status != CrawlStatus::Running {
            return Ok(false);
        }
        row.status = CrawlStatus::Complete;
        row.status_updated_at = now;
        state.leases.remove(domain);
        state
            .log
            .push((domain.to_string(), CrawlStatus::Complete, message.to_string()));
        Ok(true)
    }

    async fn filters_for(&self, domain: &str) -> Result<Vec<FilterRow>> {
        let state = self.state.read().await;
        Ok(state
            .filters
            .iter()
            .filter(|f| f.domain == domain)
            .cloned()
            .collect())
    }

    async fn indexed_domains(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut domains: Vec<String> = state.domains.keys().cloned().collect();
        domains.sort();
        Ok(domains)
    }

    async fn subdomain_aware_domains(&self) -> Result<Vec<String>> {
        Ok(self.state.read().await.subdomain_aware.clone())
    }

    async fn record_web_feed(
        &self,
        domain: &str,
        feed_url: &str,
        entry_urls: &[String],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(row) = state.domains.get_mut(domain) {
            row.web_feed = Some(feed_url.to_string());
            row.feed_entry_urls = entry_urls.iter().cloned().collect();
        }
        Ok(())
    }
}
