//! Page-to-record extraction.
//!
//! [`extract_page`] maps one fetched page plus its site and cycle
//! configuration to a [`PageRecord`], or to `None` when a type exclusion
//! applies. It is a pure function of its inputs and safe to call from any
//! number of concurrent fetch completions.
//!
//! Step order matters:
//!
//! 1. detect the page type
//! 2. apply type exclusions (nothing else is computed for excluded pages)
//! 3. envelope fields shared by every document kind
//! 4. link-graph fields
//! 5. markup-only fields, or the feed marker for XML documents

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::dates::parse_utc;
use crate::domain::{extract_domain, host_in_domains};
use crate::feed;
use crate::markup::{parse_tags, Markup};
use crate::models::{
    count_or_none, CommonConfig, DocumentKind, FetchedPage, PageRecord, SiteConfig,
};

/// The only filter type extraction interprets.
pub const EXCLUSION_TYPE: &str = "type";

/// Faults that drop a single page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid page url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported document kind for {0}")]
    Unsupported(String),
}

/// A record plus what the crawl side needs from the same parse.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: PageRecord,
    /// Entry links when the page is a web feed, otherwise empty.
    pub feed_entries: Vec<String>,
}

/// Extract a record, stamping it with the current time.
pub fn extract_page(
    page: &FetchedPage,
    site: &SiteConfig,
    common: &CommonConfig,
    is_home: bool,
) -> Result<Option<PageRecord>, ExtractError> {
    extract_page_at(page, site, common, is_home, Utc::now())
}

/// Extract a record with an explicit extraction timestamp.
pub fn extract_page_at(
    page: &FetchedPage,
    site: &SiteConfig,
    common: &CommonConfig,
    is_home: bool,
    now: DateTime<Utc>,
) -> Result<Option<PageRecord>, ExtractError> {
    Ok(extract_document_at(page, site, common, is_home, now)?.map(|e| e.record))
}

/// Like [`extract_page`], also returning a feed's entry links.
pub fn extract_document(
    page: &FetchedPage,
    site: &SiteConfig,
    common: &CommonConfig,
    is_home: bool,
) -> Result<Option<Extraction>, ExtractError> {
    extract_document_at(page, site, common, is_home, Utc::now())
}

fn extract_document_at(
    page: &FetchedPage,
    site: &SiteConfig,
    common: &CommonConfig,
    is_home: bool,
    now: DateTime<Utc>,
) -> Result<Option<Extraction>, ExtractError> {
    if page.kind == DocumentKind::Other {
        return Err(ExtractError::Unsupported(page.url.clone()));
    }
    let base = Url::parse(&page.url).map_err(|source| ExtractError::InvalidUrl {
        url: page.url.clone(),
        source,
    })?;

    let markup = match page.kind {
        DocumentKind::Html => Some(Markup::parse(&page.body)),
        _ => None,
    };

    // 1. Type detection
    let page_type = markup.as_ref().and_then(Markup::page_type);

    // 2. Exclusion check
    if let Some(ref detected) = page_type {
        if is_excluded(site, detected) {
            tracing::info!(url = %page.url, page_type = %detected, "excluding page on type exclusion list");
            return Ok(None);
        }
    }

    let xml = match page.kind {
        DocumentKind::Xml => Some(feed::parse(&page.body)),
        _ => None,
    };

    // 3. Envelope
    let title = match (&markup, &xml) {
        (Some(m), _) => m.title(),
        (None, Some(x)) => x.title.clone(),
        _ => None,
    };
    let content_type = page
        .header("Content-Type")
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_string())
        .filter(|ct| !ct.is_empty());
    let page_last_modified = page.header("Last-Modified").and_then(parse_utc);
    let in_web_feed = site.feed_entry_urls.contains(&page.url);
    let web_feed = if in_web_feed {
        site.web_feed.clone()
    } else {
        None
    };

    if is_home {
        tracing::debug!(url = %page.url, "home page");
    }

    let mut record = PageRecord {
        url: page.url.clone(),
        domain: site.domain.clone(),
        is_home,
        title,
        author: None,
        description: None,
        tags: Vec::new(),
        content: None,
        content_type,
        page_type: None,
        page_last_modified,
        published_date: None,
        indexed_date: now,
        site_category: site.site_category.clone(),
        owner_verified: site.owner_verified,
        contains_adverts: false,
        public: site.include_in_public_search,
        in_web_feed,
        web_feed,
        language: None,
        language_primary: None,
        indexed_inlinks: Vec::new(),
        indexed_inlinks_count: None,
        indexed_inlink_domains: Vec::new(),
        indexed_inlink_domains_count: None,
        indexed_outlinks: Vec::new(),
        is_web_feed: None,
    };

    // 4. Link graph
    apply_link_graph(&mut record, markup.as_ref(), &base, site, common);

    // 5. Markup-only fields, 6. feed marker
    let mut feed_entries = Vec::new();
    if let Some(m) = &markup {
        record.page_type = page_type;
        record.author = m.author();
        record.description = m.description();
        record.tags = parse_tags(m.keywords().as_deref());
        record.content = m.content();
        record.published_date = m.published().as_deref().and_then(parse_utc);
        record.contains_adverts = m.contains_adverts();
        record.language = m.language();
        record.language_primary = record
            .language
            .as_deref()
            .map(|l| l.chars().take(2).collect());
    } else if let Some(x) = &xml {
        record.page_type = x.root.clone();
        if x.is_feed() {
            record.is_web_feed = Some(true);
            feed_entries = x.entry_links();
        }
    }

    Ok(Some(Extraction {
        record,
        feed_entries,
    }))
}

fn is_excluded(site: &SiteConfig, page_type: &str) -> bool {
    site.exclusions
        .iter()
        .any(|e| e.exclusion_type == EXCLUSION_TYPE && e.exclusion_value == page_type)
}

fn apply_link_graph(
    record: &mut PageRecord,
    markup: Option<&Markup>,
    base: &Url,
    site: &SiteConfig,
    common: &CommonConfig,
) {
    let inlinks = site
        .indexed_inlinks
        .get(&record.url)
        .cloned()
        .unwrap_or_default();

    let mut inlink_domains: Vec<String> = Vec::new();
    for inlink in &inlinks {
        if let Some(d) = extract_domain(inlink, &common.domains_allowing_subdomains) {
            if !inlink_domains.contains(&d) {
                inlink_domains.push(d);
            }
        }
    }

    record.indexed_inlinks_count = count_or_none(&inlinks);
    record.indexed_inlinks = inlinks;
    record.indexed_inlink_domains_count = count_or_none(&inlink_domains);
    record.indexed_inlink_domains = inlink_domains;

    if common.domains_for_indexed_links.is_empty() {
        return;
    }
    if let Some(m) = markup {
        record.indexed_outlinks = m
            .links(base)
            .into_iter()
            .filter(|link| {
                link.host_str()
                    .is_some_and(|h| host_in_domains(&h.to_ascii_lowercase(), &common.domains_for_indexed_links))
            })
            .map(String::from)
            .collect();
    }
}
