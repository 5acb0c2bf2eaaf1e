//! Crawl admission.
//!
//! One cycle runs maintenance (stuck-job reset, unverified expiry), selects
//! a bounded batch of due domains, admits each with a test-and-set to
//! RUNNING, and assembles the per-site and cycle-wide configuration that
//! extraction consumes. Admission is the first write for a domain and
//! happens before any network activity.
//!
//! A registry failure anywhere in [`Scheduler::plan_cycle`] abandons the
//! cycle. Domains admitted before the failure stay RUNNING until a later
//! cycle's stuck sweep resets them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::index::LinkGraph;
use crate::models::{CommonConfig, DomainConfig, Exclusion, FilterRow, SiteConfig};
use crate::registry::Registry;

/// Filter action honoured by extraction; other actions are stored only.
pub const EXCLUDE_ACTION: &str = "exclude";

/// Proof of admission for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub domain: String,
    pub lease: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmittedSite {
    pub lease: String,
    pub site: SiteConfig,
}

/// Everything one cycle hands to the crawl side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CyclePlan {
    #[serde(default)]
    pub reset: Vec<String>,
    #[serde(default)]
    pub expired: u64,
    pub common: CommonConfig,
    pub sites: Vec<AdmittedSite>,
}

impl CyclePlan {
    pub fn site(&self, domain: &str) -> Option<&AdmittedSite> {
        self.sites.iter().find(|s| s.site.domain == domain)
    }
}

pub struct Scheduler<'a> {
    registry: &'a dyn Registry,
    links: &'a dyn LinkGraph,
    config: &'a SchedulerConfig,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        registry: &'a dyn Registry,
        links: &'a dyn LinkGraph,
        config: &'a SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            links,
            config,
        }
    }

    pub fn registry(&self) -> &'a dyn Registry {
        self.registry
    }

    pub async fn recover_stuck(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let reset = self
            .registry
            .reset_stuck(self.config.stuck_timeout(), now)
            .await?;
        for domain in &reset {
            tracing::warn!(%domain, "reset stuck crawl to PENDING");
        }
        Ok(reset)
    }

    pub async fn expire_unverified(&self, now: DateTime<Utc>) -> Result<u64> {
        self.registry
            .expire_unverified(self.config.unverified_grace(), now)
            .await
    }

    /// Due domains in priority order, at most `max_count`.
    pub async fn select_batch(&self, max_count: usize, now: DateTime<Utc>) -> Result<Vec<DomainConfig>> {
        self.registry
            .select_due(&self.config.indexing_type, max_count, now)
            .await
    }

    /// Test-and-set `row` to RUNNING. `None` when another scheduler moved
    /// the row first.
    pub async fn admit(&self, row: &DomainConfig, now: DateTime<Utc>) -> Result<Option<Admission>> {
        let lease = Uuid::new_v4().to_string();
        if self
            .registry
            .try_admit(&row.domain, row.status, row.status_updated_at, &lease, now)
            .await?
        {
            Ok(Some(Admission {
                domain: row.domain.clone(),
                lease,
            }))
        } else {
            tracing::info!(domain = %row.domain, "lost admission race, skipping");
            Ok(None)
        }
    }

    pub async fn load_common(&self) -> Result<CommonConfig> {
        Ok(CommonConfig {
            domains_for_indexed_links: self.registry.indexed_domains().await?,
            domains_allowing_subdomains: self.registry.subdomain_aware_domains().await?,
        })
    }

    /// Run one full admission cycle.
    pub async fn plan_cycle(&self, now: DateTime<Utc>) -> Result<CyclePlan> {
        let reset = self.recover_stuck(now).await?;
        let expired = self.expire_unverified(now).await?;
        let batch = self.select_batch(self.config.batch_size, now).await?;

        let mut admitted = Vec::with_capacity(batch.len());
        for row in batch {
            if let Some(admission) = self.admit(&row, now).await? {
                admitted.push((row, admission));
            }
        }

        let common = self.load_common().await?;

        let mut sites = Vec::with_capacity(admitted.len());
        for (row, admission) in admitted {
            let filters = self.registry.filters_for(&row.domain).await?;
            let inlinks = self.links.inlinks_for(&row.domain).await?;
            sites.push(AdmittedSite {
                lease: admission.lease,
                site: build_site_config(&row, &filters, inlinks),
            });
        }

        tracing::info!(
            reset = reset.len(),
            expired,
            admitted = sites.len(),
            "scheduling cycle planned"
        );

        Ok(CyclePlan {
            reset,
            expired,
            common,
            sites,
        })
    }
}

pub fn build_site_config(
    row: &DomainConfig,
    filters: &[FilterRow],
    inlinks: HashMap<String, Vec<String>>,
) -> SiteConfig {
    let exclusions = filters
        .iter()
        .filter(|f| f.domain == row.domain && f.action == EXCLUDE_ACTION)
        .map(|f| Exclusion {
            exclusion_type: f.filter_type.clone(),
            exclusion_value: f.value.clone(),
        })
        .collect();

    SiteConfig {
        domain: row.domain.clone(),
        home_page: row.home_page.clone(),
        date_domain_added: row.date_domain_added,
        page_limit: row.indexing_page_limit,
        owner_verified: row.owner_verified,
        site_category: row.site_category.clone(),
        api_enabled: row.api_enabled,
        include_in_public_search: row.include_in_public_search,
        feed_entry_urls: row.feed_entry_urls.clone(),
        web_feed: row.web_feed.clone(),
        exclusions,
        indexed_inlinks: inlinks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_page;
    use crate::index::{MemoryIndex, PageSink};
    use crate::models::{CrawlStatus, DocumentKind, FetchedPage};
    use crate::registry::MemoryRegistry;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn row(name: &str, status: CrawlStatus, verified: bool) -> DomainConfig {
        DomainConfig {
            domain: name.to_string(),
            home_page: format!("https://{}/", name),
            date_domain_added: t0() - chrono::Duration::days(100),
            indexing_page_limit: 10,
            owner_verified: verified,
            verification_required: false,
            site_category: "independent website".into(),
            api_enabled: false,
            include_in_public_search: true,
            indexing_type: "spider/default".into(),
            indexing_enabled: true,
            status,
            status_updated_at: t0() - chrono::Duration::days(60),
            indexing_frequency: chrono::Duration::days(28),
            feed_entry_urls: HashSet::new(),
            web_feed: None,
        }
    }

    fn config(batch_size: usize) -> SchedulerConfig {
        SchedulerConfig {
            batch_size,
            ..SchedulerConfig::default()
        }
    }

    #[tokio::test]
    async fn batch_is_capped_and_pending_ranks_first() {
        let reg = MemoryRegistry::new();
        for i in 0..5 {
            reg.insert_domain(row(&format!("done{}.com", i), CrawlStatus::Complete, true))
                .await;
        }
        reg.insert_domain(row("new.com", CrawlStatus::Pending, false)).await;
        reg.insert_domain(row("newverified.com", CrawlStatus::Pending, true)).await;

        let idx = MemoryIndex::new();
        let cfg = config(3);
        let scheduler = Scheduler::new(&reg, &idx, &cfg);
        let batch = scheduler.select_batch(cfg.batch_size, t0()).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].domain, "newverified.com");
        assert_eq!(batch[1].domain, "new.com");
        assert_eq!(batch[2].status, CrawlStatus::Complete);
    }

    #[tokio::test]
    async fn running_domain_not_reselected_until_sweep() {
        let reg = MemoryRegistry::new();
        reg.insert_domain(row("a.com", CrawlStatus::Pending, false)).await;
        let idx = MemoryIndex::new();
        let cfg = config(16);
        let scheduler = Scheduler::new(&reg, &idx, &cfg);

        let plan = scheduler.plan_cycle(t0()).await.unwrap();
        assert_eq!(plan.sites.len(), 1);

        // Next cycle one hour later: still RUNNING, not selected
        let again = scheduler
            .plan_cycle(t0() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(again.sites.is_empty());
        assert!(again.reset.is_empty());

        // Past the stuck timeout the sweep resets it and it is admitted again
        let later = scheduler
            .plan_cycle(t0() + chrono::Duration::hours(7))
            .await
            .unwrap();
        assert_eq!(later.reset, vec!["a.com"]);
        assert_eq!(later.sites.len(), 1);
        assert_ne!(later.sites[0].lease, plan.sites[0].lease);

        assert_eq!(
            reg.status_history("a.com").await,
            vec![CrawlStatus::Running, CrawlStatus::Pending, CrawlStatus::Running]
        );
    }

    #[tokio::test]
    async fn lost_race_is_skipped() {
        let reg = MemoryRegistry::new();
        reg.insert_domain(row("a.com", CrawlStatus::Pending, false)).await;
        let idx = MemoryIndex::new();
        let cfg = config(16);
        let scheduler = Scheduler::new(&reg, &idx, &cfg);

        let batch = scheduler.select_batch(16, t0()).await.unwrap();
        // A concurrent scheduler admits first
        assert!(reg
            .try_admit("a.com", CrawlStatus::Pending, batch[0].status_updated_at, "other", t0())
            .await
            .unwrap());
        assert!(scheduler.admit(&batch[0], t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn row_completed_elsewhere_is_skipped() {
        let reg = MemoryRegistry::new();
        reg.insert_domain(row("a.com", CrawlStatus::Complete, false)).await;
        let idx = MemoryIndex::new();
        let cfg = config(16);
        let scheduler = Scheduler::new(&reg, &idx, &cfg);

        let batch = scheduler.select_batch(16, t0()).await.unwrap();
        assert_eq!(batch.len(), 1);

        // Another scheduler crawls the site to completion in between
        let other = scheduler.admit(&batch[0], t0()).await.unwrap().unwrap();
        let done = t0() + chrono::Duration::minutes(10);
        assert!(reg.mark_complete("a.com", &other.lease, "", done).await.unwrap());

        assert!(scheduler.admit(&batch[0], done).await.unwrap().is_none());
        assert_eq!(
            reg.status_history("a.com").await,
            vec![CrawlStatus::Running, CrawlStatus::Complete]
        );
    }

    #[tokio::test]
    async fn plan_attaches_filters_and_inlinks() {
        let reg = MemoryRegistry::new();
        reg.insert_domain(row("a.com", CrawlStatus::Pending, false)).await;
        reg.insert_domain(row("b.org", CrawlStatus::Running, false)).await;
        reg.insert_subdomain_aware("github.io").await;
        for (action, value) in [("exclude", "blog"), ("include", "page")] {
            reg.insert_filter(FilterRow {
                domain: "a.com".into(),
                filter_type: "type".into(),
                value: value.into(),
                action: action.into(),
            })
            .await;
        }

        let idx = MemoryIndex::new();
        let linking_page = FetchedPage {
            url: "https://b.org/p".into(),
            headers: HashMap::new(),
            body: r#"<html><body><a href="https://a.com/x">x</a></body></html>"#.into(),
            kind: DocumentKind::Html,
        };
        let b = build_site_config(&row("b.org", CrawlStatus::Running, false), &[], HashMap::new());
        let common = CommonConfig {
            domains_for_indexed_links: vec!["a.com".into()],
            domains_allowing_subdomains: vec![],
        };
        let linking = extract_page(&linking_page, &b, &common, false).unwrap().unwrap();
        idx.put(&linking).await.unwrap();

        let cfg = config(16);
        let scheduler = Scheduler::new(&reg, &idx, &cfg);
        let plan = scheduler.plan_cycle(t0()).await.unwrap();

        assert_eq!(plan.common.domains_for_indexed_links, vec!["a.com", "b.org"]);
        assert_eq!(plan.common.domains_allowing_subdomains, vec!["github.io"]);
        let site = &plan.site("a.com").unwrap().site;
        assert_eq!(
            site.exclusions,
            vec![Exclusion {
                exclusion_type: "type".into(),
                exclusion_value: "blog".into()
            }]
        );
        assert_eq!(site.indexed_inlinks["https://a.com/x"], vec!["https://b.org/p"]);
    }

    #[test]
    fn build_site_config_copies_row() {
        let mut r = row("a.com", CrawlStatus::Pending, true);
        r.web_feed = Some("https://a.com/feed.xml".into());
        r.feed_entry_urls.insert("https://a.com/1".into());
        let site = build_site_config(&r, &[], HashMap::new());
        assert_eq!(site.page_limit, 10);
        assert!(site.owner_verified);
        assert!(site.exclusions.is_empty());
        assert!(site.feed_entry_urls.contains("https://a.com/1"));
        assert_eq!(site.web_feed.as_deref(), Some("https://a.com/feed.xml"));
    }
}
