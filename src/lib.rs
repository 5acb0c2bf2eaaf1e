//! # Site Indexer
//!
//! Crawl admission and page-to-record extraction for a search index of
//! small, independently registered websites.
//!
//! The scheduler decides which registered domains are due for a (re)crawl
//! and admits them with a test-and-set on their crawl status. An external
//! fetch engine walks each admitted site; every fetched page is turned into
//! a typed [`PageRecord`](models::PageRecord) that carries a cross-domain
//! link graph bounded to the indexed corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  plan   ┌─────────────┐  pages  ┌───────────┐
//! │ Scheduler  │───────▶│ FetchEngine │───────▶│ Extractor │
//! │ (registry) │         │ (external)  │         │ (blocking)│
//! └─────┬──────┘         └─────────────┘         └─────┬─────┘
//!       │ inlinks                                      │ records
//!       └──────────────── SQLite index ◀───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sidx init                         # create database
//! sidx domain add example.com       # register a site
//! sidx schedule > plan.json         # admit due sites
//! crawler example.com | sidx ingest example.com --plan plan.json
//! sidx get https://example.com/
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Registry rows, per-cycle configuration, page records |
//! | [`registry`] | Domain registry trait, SQLite and in-memory stores |
//! | [`scheduler`] | Maintenance sweeps, batch selection, admission |
//! | [`extractor`] | Page-to-record extraction |
//! | [`markup`] | HTML field readers |
//! | [`feed`] | Syndication feed reader |
//! | [`domain`] | Host and domain helpers |
//! | [`index`] | Search index sink and link graph |
//! | [`crawl`] | Fetch engine seam and per-site orchestration |
//! | [`progress`] | Ingest progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod crawl;
pub mod dates;
pub mod db;
pub mod domain;
pub mod domains;
pub mod extract_cmd;
pub mod extractor;
pub mod feed;
pub mod get;
pub mod index;
pub mod ingest;
pub mod markup;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod registry;
pub mod schedule_cmd;
pub mod scheduler;
