//! Core data models used throughout the indexer.
//!
//! [`DomainConfig`] and [`FilterRow`] mirror registry rows. [`SiteConfig`]
//! and [`CommonConfig`] are the read-only per-cycle views threaded into
//! extraction. [`PageRecord`] is what the search index receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Crawl status of a registered domain.
///
/// Normal flow moves PENDING → RUNNING → COMPLETE → RUNNING → ... Only the
/// stuck-job sweep moves RUNNING back to PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrawlStatus {
    Pending,
    Running,
    Complete,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Pending => "PENDING",
            CrawlStatus::Running => "RUNNING",
            CrawlStatus::Complete => "COMPLETE",
        }
    }

    /// Whether the normal (non-sweep) flow may move from `self` to `next`.
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        matches!(
            (self, next),
            (CrawlStatus::Pending, CrawlStatus::Running)
                | (CrawlStatus::Running, CrawlStatus::Complete)
                | (CrawlStatus::Complete, CrawlStatus::Running)
        )
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CrawlStatus::Pending),
            "RUNNING" => Ok(CrawlStatus::Running),
            "COMPLETE" => Ok(CrawlStatus::Complete),
            other => anyhow::bail!("unknown crawl status: '{}'", other),
        }
    }
}

/// A registered domain as stored in the registry.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    pub domain: String,
    pub home_page: String,
    pub date_domain_added: DateTime<Utc>,
    pub indexing_page_limit: u32,
    pub owner_verified: bool,
    pub verification_required: bool,
    pub site_category: String,
    pub api_enabled: bool,
    pub include_in_public_search: bool,
    pub indexing_type: String,
    pub indexing_enabled: bool,
    pub status: CrawlStatus,
    pub status_updated_at: DateTime<Utc>,
    pub indexing_frequency: chrono::Duration,
    pub feed_entry_urls: HashSet<String>,
    pub web_feed: Option<String>,
}

impl DomainConfig {
    /// Selection predicate for a scheduling cycle at `now`.
    pub fn is_due(&self, indexing_type: &str, now: DateTime<Utc>) -> bool {
        if self.indexing_type != indexing_type || !self.indexing_enabled {
            return false;
        }
        match self.status {
            CrawlStatus::Pending => true,
            CrawlStatus::Complete => now - self.status_updated_at > self.indexing_frequency,
            CrawlStatus::Running => false,
        }
    }
}

/// A filter row as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRow {
    pub domain: String,
    pub filter_type: String,
    pub value: String,
    pub action: String,
}

/// An `exclude` filter reduced to the part extraction consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub exclusion_type: String,
    pub exclusion_value: String,
}

/// Per-domain configuration for one scheduling cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub domain: String,
    pub home_page: String,
    pub date_domain_added: DateTime<Utc>,
    pub page_limit: u32,
    pub owner_verified: bool,
    pub site_category: String,
    pub api_enabled: bool,
    pub include_in_public_search: bool,
    #[serde(default)]
    pub feed_entry_urls: HashSet<String>,
    #[serde(default)]
    pub web_feed: Option<String>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    /// Page URL on this domain → URLs on other indexed domains linking to it.
    #[serde(default)]
    pub indexed_inlinks: HashMap<String, Vec<String>>,
}

/// Cycle-wide configuration shared read-only by every site in a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonConfig {
    /// Every registered domain; outlinks outside this set are dropped.
    pub domains_for_indexed_links: Vec<String>,
    /// Domains whose subdomains count as distinct sites (e.g. `github.io`).
    pub domains_allowing_subdomains: Vec<String>,
}

/// How the fetch engine classified a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Html,
    Xml,
    Other,
}

/// One page as delivered by the fetch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub body: String,
    pub kind: DocumentKind,
}

impl FetchedPage {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The search-index record for one page.
///
/// List fields are never absent; each `*_count` is `None` exactly when its
/// list is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub domain: String,
    pub is_home: bool,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub page_type: Option<String>,
    #[serde(serialize_with = "serialize_opt_date")]
    pub page_last_modified: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_opt_date")]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_date")]
    pub indexed_date: DateTime<Utc>,
    pub site_category: String,
    pub owner_verified: bool,
    pub contains_adverts: bool,
    pub public: bool,
    pub in_web_feed: bool,
    pub web_feed: Option<String>,
    pub language: Option<String>,
    pub language_primary: Option<String>,
    pub indexed_inlinks: Vec<String>,
    pub indexed_inlinks_count: Option<usize>,
    pub indexed_inlink_domains: Vec<String>,
    pub indexed_inlink_domains_count: Option<usize>,
    pub indexed_outlinks: Vec<String>,
    /// Set only on syndication feeds that yielded at least one entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_web_feed: Option<bool>,
}

/// Index date format, always UTC.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn serialize_date<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&date.format(DATE_FORMAT).to_string())
}

fn serialize_opt_date<S: Serializer>(
    date: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(d) => serialize_date(d, s),
        None => s.serialize_none(),
    }
}

/// Count for a list field: `None` when empty.
pub fn count_or_none<T>(items: &[T]) -> Option<usize> {
    if items.is_empty() {
        None
    } else {
        Some(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_round_trips_through_str() {
        for s in [CrawlStatus::Pending, CrawlStatus::Running, CrawlStatus::Complete] {
            assert_eq!(s.as_str().parse::<CrawlStatus>().unwrap(), s);
        }
        assert!("DONE".parse::<CrawlStatus>().is_err());
    }

    #[test]
    fn running_to_pending_is_not_a_normal_transition() {
        assert!(CrawlStatus::Pending.can_transition_to(CrawlStatus::Running));
        assert!(CrawlStatus::Running.can_transition_to(CrawlStatus::Complete));
        assert!(CrawlStatus::Complete.can_transition_to(CrawlStatus::Running));
        assert!(!CrawlStatus::Running.can_transition_to(CrawlStatus::Pending));
        assert!(!CrawlStatus::Pending.can_transition_to(CrawlStatus::Complete));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "text/html".to_string());
        let page = FetchedPage {
            url: "https://example.com/".into(),
            headers,
            body: String::new(),
            kind: DocumentKind::Html,
        };
        assert_eq!(page.header("content-type"), Some("text/html"));
        assert_eq!(page.header("last-modified"), None);
    }

    #[test]
    fn count_is_none_for_empty() {
        let empty: Vec<String> = vec![];
        assert_eq!(count_or_none(&empty), None);
        assert_eq!(count_or_none(&["a"]), Some(1));
    }

    #[test]
    fn complete_domain_due_only_after_frequency() {
        let updated = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let domain = DomainConfig {
            domain: "example.com".into(),
            home_page: "https://example.com/".into(),
            date_domain_added: updated,
            indexing_page_limit: 10,
            owner_verified: false,
            verification_required: false,
            site_category: "independent website".into(),
            api_enabled: false,
            include_in_public_search: true,
            indexing_type: "spider/default".into(),
            indexing_enabled: true,
            status: CrawlStatus::Complete,
            status_updated_at: updated,
            indexing_frequency: chrono::Duration::days(7),
            feed_entry_urls: HashSet::new(),
            web_feed: None,
        };
        assert!(!domain.is_due("spider/default", updated + chrono::Duration::days(7)));
        assert!(domain.is_due("spider/default", updated + chrono::Duration::days(8)));
        assert!(!domain.is_due("api/default", updated + chrono::Duration::days(8)));
    }
}
