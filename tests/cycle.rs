//! Full cycles against a SQLite database: schedule, crawl, index, and the
//! link graph feeding the next cycle.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tempfile::TempDir;
use tokio::sync::mpsc;

use site_indexer::config::Config;
use site_indexer::crawl::{run_cycle, CrawlContext, FetchEngine};
use site_indexer::index::SqliteIndex;
use site_indexer::models::{CrawlStatus, DocumentKind, FetchedPage};
use site_indexer::progress::NoProgress;
use site_indexer::registry::sqlite::NewDomain;
use site_indexer::registry::SqliteRegistry;
use site_indexer::scheduler::Scheduler;
use site_indexer::{db, migrate};

/// Serves canned pages per seed URL.
struct CannedSites {
    sites: HashMap<String, Vec<FetchedPage>>,
}

#[async_trait]
impl FetchEngine for CannedSites {
    async fn fetch_site(
        &self,
        seed: &str,
        page_limit: u32,
        tx: mpsc::Sender<FetchedPage>,
    ) -> Result<()> {
        let pages = self.sites.get(seed).cloned().unwrap_or_default();
        for page in pages.into_iter().take(page_limit as usize) {
            if tx.send(page).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn html(url: &str, body: &str) -> FetchedPage {
    FetchedPage {
        url: url.into(),
        headers: HashMap::from([
            ("content-type".to_string(), "text/html".to_string()),
            (
                "last-modified".to_string(),
                "Wed, 21 Oct 2015 07:28:00 GMT".to_string(),
            ),
        ]),
        body: body.into(),
        kind: DocumentKind::Html,
    }
}

fn new_domain(name: &str) -> NewDomain {
    NewDomain {
        domain: name.into(),
        home_page: format!("https://{}/", name),
        page_limit: 5,
        owner_verified: false,
        verification_required: false,
        site_category: "independent website".into(),
        api_enabled: false,
        include_in_public_search: true,
        indexing_type: "spider/default".into(),
        indexing_frequency: chrono::Duration::days(28),
    }
}

async fn setup() -> (TempDir, Config, SqliteRegistry, SqliteIndex) {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::minimal();
    cfg.db.path = tmp.path().join("cycle.sqlite");
    let pool = db::connect(&cfg).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (
        tmp,
        cfg,
        SqliteRegistry::new(pool.clone()),
        SqliteIndex::new(pool),
    )
}

#[tokio::test]
async fn cycle_indexes_pages_and_feeds_inlinks_forward() {
    let (_tmp, cfg, registry, index) = setup().await;
    let now = Utc::now();
    registry.add_domain(&new_domain("alice.net"), now).await.unwrap();
    registry.add_domain(&new_domain("bob.org"), now).await.unwrap();

    let engine = CannedSites {
        sites: HashMap::from([
            (
                "https://alice.net/".to_string(),
                vec![
                    html(
                        "https://alice.net/",
                        r#"<html><body><main>Alice <a href="https://bob.org/about">Bob</a></main></body></html>"#,
                    ),
                    html("https://alice.net/notes", "<p>Notes</p>"),
                ],
            ),
            (
                "https://bob.org/".to_string(),
                vec![html(
                    "https://bob.org/about",
                    "<html><body><article>About Bob</article></body></html>",
                )],
            ),
        ]),
    };

    let scheduler = Scheduler::new(&registry, &index, &cfg.scheduler);
    let ctx = CrawlContext {
        engine: &engine,
        sink: &index,
        progress: &NoProgress,
        page_buffer: cfg.crawl.page_buffer,
    };

    let outcomes = run_cycle(&scheduler, ctx, 2).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.completed));

    for d in ["alice.net", "bob.org"] {
        let row = registry.domain(d).await.unwrap().unwrap();
        assert_eq!(row.status, CrawlStatus::Complete);
        let history = registry.status_history(d).await.unwrap();
        let statuses: Vec<&str> = history.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(statuses, vec!["RUNNING", "COMPLETE"]);
    }

    let alice = index.get_page("https://alice.net/").await.unwrap().unwrap();
    assert_eq!(alice["is_home"], true);
    assert_eq!(alice["page_last_modified"], "2015-10-21T07:28:00Z");
    assert_eq!(alice["indexed_outlinks"], serde_json::json!(["https://bob.org/about"]));

    // Nothing is due until the frequency elapses
    let again = scheduler.plan_cycle(Utc::now()).await.unwrap();
    assert!(again.sites.is_empty());

    // After it does, bob.org's site config carries alice's inlink
    let later = Utc::now() + chrono::Duration::days(29);
    let plan = scheduler.plan_cycle(later).await.unwrap();
    let bob = &plan.site("bob.org").unwrap().site;
    assert_eq!(
        bob.indexed_inlinks["https://bob.org/about"],
        vec!["https://alice.net/"]
    );
}
