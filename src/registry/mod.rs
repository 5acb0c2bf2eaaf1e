//! Domain registry abstraction.
//!
//! The [`Registry`] trait is the only path to registration rows, filter
//! rows and crawl status. Status changes are single conditional updates;
//! the scheduler relies on that atomicity for its test-and-set admission.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`reset_stuck`](Registry::reset_stuck) | RUNNING past a timeout → PENDING |
//! | [`expire_unverified`](Registry::expire_unverified) | Disable lapsed unverified registrations |
//! | [`select_due`](Registry::select_due) | Domains due for crawling, prioritised |
//! | [`try_admit`](Registry::try_admit) | Test-and-set to RUNNING with a lease |
//! | [`mark_complete`](Registry::mark_complete) | RUNNING → COMPLETE for the lease holder |
//! | [`filters_for`](Registry::filters_for) | Filter rows of one domain |
//! | [`indexed_domains`](Registry::indexed_domains) | Every registered domain |
//! | [`subdomain_aware_domains`](Registry::subdomain_aware_domains) | Domains whose subdomains are distinct sites |
//! | [`record_web_feed`](Registry::record_web_feed) | Remember a site's feed and its entries |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CrawlStatus, DomainConfig, FilterRow};

pub use memory::MemoryRegistry;
pub use sqlite::SqliteRegistry;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Reset every domain RUNNING since before `now - timeout` to PENDING.
    ///
    /// Returns the domains that were reset.
    async fn reset_stuck(&self, timeout: chrono::Duration, now: DateTime<Utc>)
        -> Result<Vec<String>>;

    /// Disable domains that still await owner verification more than
    /// `grace` after registering. Returns how many were disabled.
    async fn expire_unverified(&self, grace: chrono::Duration, now: DateTime<Utc>) -> Result<u64>;

    /// Domains due for crawling at `now`, PENDING before COMPLETE, then
    /// owner-verified before not, capped at `limit`.
    async fn select_due(
        &self,
        indexing_type: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainConfig>>;

    /// Atomically move `domain` from `expected` to RUNNING and stamp `lease`.
    ///
    /// `seen_at` is the status timestamp of the row the caller selected.
    /// Returns `false` when the row has moved since (another status, or the
    /// same status set again by a crawl that ran in between), or when
    /// `expected` may not move to RUNNING at all.
    async fn try_admit(
        &self,
        domain: &str,
        expected: CrawlStatus,
        seen_at: DateTime<Utc>,
        lease: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Move `domain` from RUNNING to COMPLETE if `lease` is still current.
    async fn mark_complete(
        &self,
        domain: &str,
        lease: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn filters_for(&self, domain: &str) -> Result<Vec<FilterRow>>;

    async fn indexed_domains(&self) -> Result<Vec<String>>;

    async fn subdomain_aware_domains(&self) -> Result<Vec<String>>;

    /// Store the site's web feed and the URLs of its entries, replacing
    /// whatever was recorded before.
    async fn record_web_feed(&self, domain: &str, feed_url: &str, entry_urls: &[String])
        -> Result<()>;
}

/// Registry ordering: PENDING first, then owner-verified, then the oldest
/// status update, then name.
pub(crate) fn due_order(a: &DomainConfig, b: &DomainConfig) -> std::cmp::Ordering {
    let rank = |d: &DomainConfig| match d.status {
        CrawlStatus::Pending => 0,
        _ => 1,
    };
    rank(a)
        .cmp(&rank(b))
        .then(b.owner_verified.cmp(&a.owner_verified))
        .then(a.status_updated_at.cmp(&b.status_updated_at))
        .then(a.domain.cmp(&b.domain))
}
