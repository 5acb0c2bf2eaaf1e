//! Field lookups over a parsed HTML document.
//!
//! Every accessor degrades to `None` (or an empty list) when its source is
//! missing; none of them fail.

use ego_tree::iter::Edge;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

/// Subtrees removed before taking page content.
const NON_CONTENT: &[&str] = &["nav", "header", "footer"];
/// Elements whose text is never rendered.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Marker class of the one ad network recognised.
const AD_MARKER_CLASS: &str = "adsbygoogle";

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static META: Lazy<Selector> = Lazy::new(|| selector("meta"));
static ARTICLE_TYPE: Lazy<Selector> = Lazy::new(|| selector("article[data-post-type]"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static MAIN: Lazy<Selector> = Lazy::new(|| selector("main"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static LINKS: Lazy<Selector> = Lazy::new(|| selector("a[href], area[href]"));
static ITEMPROP_PUBLISHED: Lazy<Selector> = Lazy::new(|| selector("[itemprop=\"datePublished\"]"));
static ADVERTS: Lazy<Selector> = Lazy::new(|| selector("ins[class]"));

pub struct Markup {
    doc: Html,
}

impl Markup {
    pub fn parse(body: &str) -> Self {
        Self {
            doc: Html::parse_document(body),
        }
    }

    pub fn title(&self) -> Option<String> {
        self.doc
            .select(&TITLE)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Content of the first `<meta {attr}="{value}">`.
    pub fn meta(&self, attr: &str, value: &str) -> Option<String> {
        self.doc
            .select(&META)
            .find(|el| {
                el.value()
                    .attr(attr)
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case(value))
            })
            .and_then(|el| el.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    }

    /// Open Graph type, else an article's `data-post-type`.
    pub fn page_type(&self) -> Option<String> {
        self.meta("property", "og:type").or_else(|| {
            self.doc
                .select(&ARTICLE_TYPE)
                .next()
                .and_then(|el| el.value().attr("data-post-type"))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        })
    }

    pub fn author(&self) -> Option<String> {
        self.meta("name", "author")
    }

    pub fn description(&self) -> Option<String> {
        self.meta("name", "description")
            .or_else(|| self.meta("property", "og:description"))
    }

    pub fn keywords(&self) -> Option<String> {
        self.meta("name", "keywords")
            .or_else(|| self.meta("property", "article:tag"))
    }

    /// Raw published date from the first source present.
    pub fn published(&self) -> Option<String> {
        self.meta("property", "article:published_time")
            .or_else(|| self.meta("name", "dc.date.issued"))
            .or_else(|| {
                self.doc.select(&ITEMPROP_PUBLISHED).find_map(|el| {
                    el.value()
                        .attr("content")
                        .or_else(|| el.value().attr("datetime"))
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty())
                })
            })
    }

    pub fn contains_adverts(&self) -> bool {
        self.doc.select(&ADVERTS).any(|el| {
            el.value()
                .attr("class")
                .is_some_and(|c| c.contains(AD_MARKER_CLASS))
        })
    }

    /// The root element's `lang` attribute, verbatim.
    pub fn language(&self) -> Option<String> {
        self.doc
            .root_element()
            .value()
            .attr("lang")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    }

    /// Visible text of the page body with navigation chrome removed.
    ///
    /// Prefers a `<main>`, then an `<article>`, then the whole body. A
    /// `<main>` or `<article>` that sits inside removed chrome is ignored.
    pub fn content(&self) -> Option<String> {
        let body = self.doc.select(&BODY).next()?;
        let root = body
            .select(&MAIN)
            .find(|el| !inside_non_content(el))
            .or_else(|| body.select(&ARTICLE).find(|el| !inside_non_content(el)))
            .unwrap_or(body);

        let text = visible_text(root);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Absolute http(s) link targets in document order, fragments removed,
    /// each target listed once.
    pub fn links(&self, base: &Url) -> Vec<Url> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for el in self.doc.select(&LINKS) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Ok(mut target) = base.join(href.trim()) else {
                continue;
            };
            if target.scheme() != "http" && target.scheme() != "https" {
                continue;
            }
            target.set_fragment(None);
            if seen.insert(target.as_str().to_string()) {
                out.push(target);
            }
        }
        out
    }
}

fn inside_non_content(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| NON_CONTENT.contains(&e.name()))
    })
}

fn is_skipped(name: &str) -> bool {
    NON_CONTENT.contains(&name) || INVISIBLE.contains(&name)
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    // Depth inside a skipped subtree; iterative so deep nesting cannot
    // exhaust the stack.
    let mut skip = 0usize;
    for edge in root.traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Element(e) if skip > 0 || is_skipped(e.name()) => skip += 1,
                Node::Text(t) if skip == 0 => {
                    for word in t.split_whitespace() {
                        if !out.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(word);
                    }
                }
                _ => {}
            },
            Edge::Close(node) => {
                if node.value().is_element() && skip > 0 {
                    skip -= 1;
                }
            }
        }
    }
    out
}

/// Split a keywords value into tags.
///
/// Comma-delimited per the HTML spec, but some sites use spaces: with no
/// comma and more than one space the value is split on whitespace instead.
/// Each tag is left-trimmed. A missing value gives an empty list.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if raw.matches(',').count() == 0 && raw.matches(' ').count() > 1 {
        raw.split_whitespace().map(str::to_string).collect()
    } else {
        raw.split(',').map(|t| t.trim_start().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_comma_delimited() {
        assert_eq!(parse_tags(Some("a, b,c")), vec!["a", "b", "c"]);
    }

    #[test]
    fn tags_space_delimited() {
        assert_eq!(parse_tags(Some("a b c")), vec!["a", "b", "c"]);
    }

    #[test]
    fn tags_any_comma_forces_comma_split() {
        assert_eq!(parse_tags(Some("a,b c")), vec!["a", "b c"]);
    }

    #[test]
    fn tags_single_space_stays_one_tag() {
        assert_eq!(parse_tags(Some("open source")), vec!["open source"]);
    }

    #[test]
    fn tags_absent_is_empty() {
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn content_prefers_main_and_drops_nav() {
        let m = Markup::parse("<html><body><main>Hello</main><nav>Menu</nav></body></html>");
        assert_eq!(m.content().as_deref(), Some("Hello"));
    }

    #[test]
    fn content_falls_back_to_body_without_chrome() {
        let m = Markup::parse(
            "<body><header>Site</header><p>One</p> <div>Two <script>x()</script></div><footer>(c)</footer></body>",
        );
        assert_eq!(m.content().as_deref(), Some("One Two"));
    }

    #[test]
    fn main_inside_header_is_ignored() {
        let m = Markup::parse(
            "<body><header><main>Banner</main></header><article>Post text</article></body>",
        );
        assert_eq!(m.content().as_deref(), Some("Post text"));
    }

    #[test]
    fn description_falls_back_to_open_graph() {
        let m = Markup::parse(
            r#"<head><meta property="og:description" content="From OG"></head>"#,
        );
        assert_eq!(m.description().as_deref(), Some("From OG"));
    }

    #[test]
    fn page_type_falls_back_to_article_attribute() {
        let m = Markup::parse(r#"<body><article data-post-type="note">x</article></body>"#);
        assert_eq!(m.page_type().as_deref(), Some("note"));
    }

    #[test]
    fn adverts_detected_by_marker_class() {
        let with = Markup::parse(r#"<body><ins class="adsbygoogle" data-ad-client="x"></ins></body>"#);
        let without = Markup::parse(r#"<body><ins class="other">x</ins></body>"#);
        assert!(with.contains_adverts());
        assert!(!without.contains_adverts());
    }

    #[test]
    fn links_are_resolved_and_deduplicated() {
        let m = Markup::parse(
            r##"<body><a href="/a#x">A</a><a href="/a">A again</a><a href="mailto:x@y.z">m</a><a href="https://other.org/p">o</a></body>"##,
        );
        let base = Url::parse("https://example.com/dir/").unwrap();
        let links: Vec<String> = m.links(&base).into_iter().map(String::from).collect();
        assert_eq!(links, vec!["https://example.com/a", "https://other.org/p"]);
    }

    #[test]
    fn language_from_root_element() {
        let m = Markup::parse(r#"<html lang="en-GB"><body></body></html>"#);
        assert_eq!(m.language().as_deref(), Some("en-GB"));
        assert_eq!(Markup::parse("<p>x</p>").language(), None);
    }
}
