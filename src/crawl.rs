//! Crawl orchestration glue.
//!
//! A [`FetchEngine`] walks one site and pushes pages into a bounded channel.
//! [`crawl_site`] drains the channel, enforces the site's page ceiling, and
//! runs every extraction on the blocking pool so that a faulty page (an
//! extraction error or a panic) drops only that page. [`run_cycle`] ties a
//! scheduling cycle to the crawls of its admitted sites.
//!
//! A site whose engine fails is left RUNNING; the next cycle's stuck sweep
//! returns it to PENDING.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Mutex};

use crate::domain::same_page;
use crate::extractor::{extract_document, Extraction};
use crate::index::PageSink;
use crate::models::{CommonConfig, FetchedPage, SiteConfig};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::registry::Registry;
use crate::scheduler::{AdmittedSite, Scheduler};

/// Source of fetched pages for one site.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Fetch pages reachable from `seed`, at most `page_limit`, sending each
    /// into `tx`. A closed channel means the consumer stopped; return then.
    async fn fetch_site(
        &self,
        seed: &str,
        page_limit: u32,
        tx: mpsc::Sender<FetchedPage>,
    ) -> Result<()>;
}

/// Faults that abort one site's crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch engine failed for {domain}: {reason}")]
    Engine { domain: String, reason: String },
    #[error("search index rejected {url}: {reason}")]
    Sink { url: String, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WebFeed {
    pub url: String,
    pub entry_urls: Vec<String>,
}

/// Counters for one site's crawl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub domain: String,
    pub pages_seen: u64,
    pub indexed: u64,
    pub excluded: u64,
    pub failed: u64,
    pub ceiling_reached: bool,
    pub feed: Option<WebFeed>,
}

impl CrawlReport {
    pub fn summary(&self) -> String {
        format!(
            "{} pages: {} indexed, {} excluded, {} failed",
            self.pages_seen, self.indexed, self.excluded, self.failed
        )
    }
}

/// Collaborators shared by every site crawl in a cycle.
#[derive(Clone, Copy)]
pub struct CrawlContext<'a> {
    pub engine: &'a dyn FetchEngine,
    pub sink: &'a dyn PageSink,
    pub progress: &'a dyn IngestProgressReporter,
    /// Capacity of the engine → extraction channel.
    pub page_buffer: usize,
}

pub async fn crawl_site(
    ctx: CrawlContext<'_>,
    site: Arc<SiteConfig>,
    common: Arc<CommonConfig>,
) -> Result<CrawlReport, CrawlError> {
    let limit = site.page_limit as u64;
    let (tx, mut rx) = mpsc::channel::<FetchedPage>(ctx.page_buffer.max(1));

    ctx.progress.report(IngestProgressEvent::Started {
        domain: site.domain.clone(),
        limit: site.page_limit,
    });

    let producer = ctx.engine.fetch_site(&site.home_page, site.page_limit, tx);

    let consumer_site = Arc::clone(&site);
    let consumer = async move {
        let site = consumer_site;
        let mut report = CrawlReport {
            domain: site.domain.clone(),
            ..CrawlReport::default()
        };

        while report.pages_seen < limit {
            let Some(page) = rx.recv().await else {
                break;
            };
            report.pages_seen += 1;

            let url = page.url.clone();
            let is_home = same_page(&page.url, &site.home_page);
            let page_site = Arc::clone(&site);
            let page_common = Arc::clone(&common);
            let outcome = tokio::task::spawn_blocking(move || {
                extract_document(&page, &page_site, &page_common, is_home)
            })
            .await;

            match outcome {
                Ok(Ok(Some(Extraction {
                    record,
                    feed_entries,
                }))) => {
                    ctx.sink.put(&record).await.map_err(|e| CrawlError::Sink {
                        url: url.clone(),
                        reason: format!("{:#}", e),
                    })?;
                    report.indexed += 1;
                    if report.feed.is_none() && !feed_entries.is_empty() {
                        report.feed = Some(WebFeed {
                            url,
                            entry_urls: feed_entries,
                        });
                    }
                }
                Ok(Ok(None)) => report.excluded += 1,
                Ok(Err(e)) => {
                    tracing::warn!(%url, error = %e, "dropping page");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(%url, error = %e, "extraction panicked, dropping page");
                    report.failed += 1;
                }
            }

            ctx.progress.report(IngestProgressEvent::Page {
                domain: site.domain.clone(),
                n: report.pages_seen,
                limit: site.page_limit,
            });
        }

        report.ceiling_reached = report.pages_seen >= limit;
        Ok::<_, CrawlError>(report)
    };

    let (fetched, consumed) = tokio::join!(producer, consumer);
    let report = consumed?;

    if let Err(e) = fetched {
        // An engine that trips over the channel closing at the ceiling did
        // nothing wrong.
        if !report.ceiling_reached {
            return Err(CrawlError::Engine {
                domain: site.domain.clone(),
                reason: format!("{:#}", e),
            });
        }
        tracing::debug!(domain = %site.domain, error = %e, "engine stopped after ceiling");
    }

    ctx.progress.report(IngestProgressEvent::Finished {
        domain: site.domain.clone(),
        indexed: report.indexed,
        excluded: report.excluded,
        failed: report.failed,
    });
    tracing::info!(domain = %site.domain, "{}", report.summary());
    Ok(report)
}

/// What became of one admitted site.
#[derive(Debug, Serialize)]
pub struct SiteOutcome {
    pub domain: String,
    /// Set when the crawl finished; `None` when it failed.
    pub report: Option<CrawlReport>,
    /// True when the lease was still held and the domain is now COMPLETE.
    pub completed: bool,
}

/// Crawl an admitted site and complete its lease.
///
/// A crawl failure is logged and leaves the domain RUNNING. Only registry
/// errors are returned.
pub async fn crawl_admitted(
    ctx: CrawlContext<'_>,
    registry: &dyn Registry,
    admitted: AdmittedSite,
    common: Arc<CommonConfig>,
) -> Result<SiteOutcome> {
    let AdmittedSite { lease, site } = admitted;
    let domain = site.domain.clone();

    let report = match crawl_site(ctx, Arc::new(site), common).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(%domain, error = %e, "crawl failed, domain stays RUNNING");
            return Ok(SiteOutcome {
                domain,
                report: None,
                completed: false,
            });
        }
    };

    if let Some(feed) = &report.feed {
        registry
            .record_web_feed(&domain, &feed.url, &feed.entry_urls)
            .await?;
    }

    let completed = registry
        .mark_complete(&domain, &lease, &report.summary(), Utc::now())
        .await?;
    if !completed {
        tracing::warn!(%domain, "lease no longer held, not marking complete");
    }

    Ok(SiteOutcome {
        domain,
        report: Some(report),
        completed,
    })
}

/// Plan a cycle and crawl every admitted site, `concurrent_sites` at a time.
pub async fn run_cycle(
    scheduler: &Scheduler<'_>,
    ctx: CrawlContext<'_>,
    concurrent_sites: usize,
) -> Result<Vec<SiteOutcome>> {
    let plan = scheduler.plan_cycle(Utc::now()).await?;
    let common = Arc::new(plan.common);
    let registry = scheduler.registry();

    let outcomes: Vec<Result<SiteOutcome>> = stream::iter(plan.sites)
        .map(|admitted| crawl_admitted(ctx, registry, admitted, Arc::clone(&common)))
        .buffer_unordered(concurrent_sites.max(1))
        .collect()
        .await;

    outcomes.into_iter().collect()
}

/// Reads pages as JSON lines, one [`FetchedPage`] per line.
///
/// Lets an external crawler pipe its output into the indexer. Malformed
/// lines are skipped. The input is consumed by the first site fetched.
pub struct JsonLinesEngine<R> {
    reader: Mutex<Option<R>>,
}

impl<R> JsonLinesEngine<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
        }
    }
}

#[async_trait]
impl<R> FetchEngine for JsonLinesEngine<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn fetch_site(
        &self,
        seed: &str,
        page_limit: u32,
        tx: mpsc::Sender<FetchedPage>,
    ) -> Result<()> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.take() else {
            anyhow::bail!("page input already consumed");
        };
        tracing::debug!(%seed, "reading fetched pages from input");

        let mut lines = reader.lines();
        let mut sent = 0u32;
        while sent < page_limit {
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let page: FetchedPage = match serde_json::from_str(&line) {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed page line");
                    continue;
                }
            };
            if tx.send(page).await.is_err() {
                break;
            }
            sent += 1;
        }
        Ok(())
    }
}
