use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{LinkGraph, PageSink};
use crate::domain::{host_matches, host_of};
use crate::models::PageRecord;

/// Records kept in insertion order, keyed by URL.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<Vec<PageRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<PageRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl PageSink for MemoryIndex {
    async fn put(&self, record: &PageRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.retain(|r| r.url != record.url);
        records.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl LinkGraph for MemoryIndex {
    async fn inlinks_for(&self, domain: &str) -> Result<HashMap<String, Vec<String>>> {
        let records = self.records.read().await;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for source in records.iter().filter(|r| r.domain != domain) {
            for target in &source.indexed_outlinks {
                let on_domain = host_of(target)
                    .map(|h| host_matches(&h, domain))
                    .unwrap_or(false);
                if on_domain {
                    map.entry(target.clone()).or_default().push(source.url.clone());
                }
            }
        }
        Ok(map)
    }
}
