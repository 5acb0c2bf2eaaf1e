//! Search-index boundary.
//!
//! [`PageSink`] receives finished records. [`LinkGraph`] answers the
//! per-domain inlink map that extraction consults. [`SqliteIndex`] is the
//! bundled implementation of both; [`MemoryIndex`] backs tests.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::PageRecord;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

#[async_trait]
pub trait PageSink: Send + Sync {
    /// Store `record`, replacing any earlier record for the same URL.
    async fn put(&self, record: &PageRecord) -> Result<()>;
}

#[async_trait]
pub trait LinkGraph: Send + Sync {
    /// Page URL on `domain` (or its subdomains) → URLs on other domains that
    /// link to it.
    async fn inlinks_for(&self, domain: &str) -> Result<HashMap<String, Vec<String>>>;
}
