//! Syndication feed reading (RSS 2.0, RSS 1.0/RDF, Atom).
//!
//! Only what indexing needs: the root element name, the first title, and
//! the entries. Parsing is lenient; on malformed XML whatever was read
//! before the error is kept.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Root elements recognised as feeds (local names).
const FEED_ROOTS: &[&str] = &["rss", "feed", "RDF"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub id: Option<String>,
}

/// Summary of an XML document.
#[derive(Debug, Clone, Default)]
pub struct XmlSummary {
    /// Qualified name of the root element, e.g. `rss` or `rdf:RDF`.
    pub root: Option<String>,
    /// Text of the first `title` element anywhere in the document.
    pub title: Option<String>,
    /// Entries that carried at least a title, link or id. Empty unless the
    /// root is a feed root.
    pub entries: Vec<FeedEntry>,
}

impl XmlSummary {
    pub fn is_feed(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Entry links, in feed order.
    pub fn entry_links(&self) -> Vec<String> {
        self.entries.iter().filter_map(|e| e.link.clone()).collect()
    }
}

pub fn parse(xml: &str) -> XmlSummary {
    let mut summary = XmlSummary::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut is_feed = false;
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut entry: Option<FeedEntry> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = local_name(&e);
                if stack.is_empty() {
                    summary.root = Some(qualified_name(&e));
                    is_feed = FEED_ROOTS.contains(&local.as_str());
                }
                if is_feed && (local == "item" || local == "entry") {
                    entry = Some(FeedEntry::default());
                }
                if local == "link" {
                    if let Some(current) = entry.as_mut() {
                        take_atom_link(&e, current);
                    }
                }
                text.clear();
                stack.push(local);
            }
            Ok(Event::Empty(e)) => {
                if stack.is_empty() {
                    summary.root = Some(qualified_name(&e));
                }
                if local_name(&e) == "link" {
                    if let Some(current) = entry.as_mut() {
                        take_atom_link(&e, current);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                text.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(&c));
            }
            Ok(Event::End(_)) => {
                let Some(local) = stack.pop() else {
                    break;
                };
                let value = text.trim().to_string();
                text.clear();

                if local == "title" && summary.title.is_none() && !value.is_empty() {
                    summary.title = Some(value.clone());
                }

                if local == "item" || local == "entry" {
                    if let Some(done) = entry.take() {
                        if done.title.is_some() || done.link.is_some() || done.id.is_some() {
                            summary.entries.push(done);
                        }
                    }
                } else if let Some(current) = entry.as_mut() {
                    if value.is_empty() {
                        continue;
                    }
                    match local.as_str() {
                        "title" if current.title.is_none() => current.title = Some(value),
                        "link" if current.link.is_none() => current.link = Some(value),
                        "guid" | "id" if current.id.is_none() => current.id = Some(value),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopping at malformed XML");
                break;
            }
            _ => {}
        }
    }

    summary
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Atom `<link href=".." rel="alternate"/>`; a missing `rel` means alternate.
fn take_atom_link(e: &BytesStart<'_>, entry: &mut FeedEntry) {
    if entry.link.is_some() {
        return;
    }
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().unwrap_or_default().into_owned();
        match attr.key.as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }
    if matches!(rel.as_deref(), None | Some("alternate")) {
        entry.link = href.filter(|h| !h.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>My Blog</title>
  <link>https://example.com/</link>
  <item><title>One</title><link>https://example.com/1</link></item>
  <item><title><![CDATA[Two & more]]></title><link>https://example.com/2</link></item>
  <item><guid>urn:3</guid></item>
</channel></rss>"#;

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <entry><title>A</title><link rel="alternate" href="https://example.org/a"/><id>tag:a</id></entry>
  <entry><title>B</title><link rel="edit" href="https://example.org/edit/b"/><link href="https://example.org/b"/></entry>
</feed>"#;

    #[test]
    fn rss_entries_and_channel_title() {
        let s = parse(RSS);
        assert_eq!(s.root.as_deref(), Some("rss"));
        assert_eq!(s.title.as_deref(), Some("My Blog"));
        assert_eq!(s.entries.len(), 3);
        assert_eq!(s.entries[1].title.as_deref(), Some("Two & more"));
        assert_eq!(
            s.entry_links(),
            vec!["https://example.com/1", "https://example.com/2"]
        );
        assert!(s.is_feed());
    }

    #[test]
    fn atom_alternate_links() {
        let s = parse(ATOM);
        assert_eq!(s.root.as_deref(), Some("feed"));
        assert_eq!(
            s.entry_links(),
            vec!["https://example.org/a", "https://example.org/b"]
        );
    }

    #[test]
    fn feed_without_entries_is_not_a_feed() {
        let s = parse("<rss><channel><title>Empty</title></channel></rss>");
        assert!(!s.is_feed());
        assert_eq!(s.title.as_deref(), Some("Empty"));
    }

    #[test]
    fn non_feed_xml_keeps_root_name() {
        let s = parse(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><url><loc>x</loc></url></urlset>"#);
        assert_eq!(s.root.as_deref(), Some("urlset"));
        assert!(s.entries.is_empty());
    }

    #[test]
    fn malformed_xml_keeps_parsed_entries() {
        let s = parse("<rss><channel><item><title>Ok</title></item><item><title>Broken</channel>");
        assert_eq!(s.entries.len(), 1);
    }
}
