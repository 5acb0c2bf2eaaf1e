//! Crawl ingestion progress reporting.
//!
//! Reports how many pages of a site have been processed against its page
//! ceiling while `sidx ingest` runs. Progress goes to **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;

/// A single progress event for one site.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Crawl admitted and waiting for the first page.
    Started { domain: String, limit: u32 },
    /// `n` pages processed out of at most `limit`.
    Page { domain: String, n: u64, limit: u32 },
    /// Site finished.
    Finished {
        domain: String,
        indexed: u64,
        excluded: u64,
        failed: u64,
    },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest example.com  12 / 50 pages".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Started { domain, limit } => {
                format!("ingest {}  started (limit {} pages)\n", domain, format_number(*limit as u64))
            }
            IngestProgressEvent::Page { domain, n, limit } => format!(
                "ingest {}  {} / {} pages\n",
                domain,
                format_number(*n),
                format_number(*limit as u64)
            ),
            IngestProgressEvent::Finished {
                domain,
                indexed,
                excluded,
                failed,
            } => format!(
                "ingest {}  done: {} indexed, {} excluded, {} failed\n",
                domain,
                format_number(*indexed),
                format_number(*excluded),
                format_number(*failed)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Started { domain, limit } => serde_json::json!({
                "event": "progress",
                "domain": domain,
                "phase": "started",
                "limit": limit
            }),
            IngestProgressEvent::Page { domain, n, limit } => serde_json::json!({
                "event": "progress",
                "domain": domain,
                "phase": "page",
                "n": n,
                "limit": limit
            }),
            IngestProgressEvent::Finished {
                domain,
                indexed,
                excluded,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "domain": domain,
                "phase": "finished",
                "indexed": indexed,
                "excluded": excluded,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
