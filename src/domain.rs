//! Host and domain helpers shared by extraction and the link graph.

use url::Url;

/// Lowercased host of `url`, or `None` for relative or host-less URLs.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// True when `host` is `domain` itself or one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// True when `host` belongs to any of `domains`.
pub fn host_in_domains(host: &str, domains: &[String]) -> bool {
    domains.iter().any(|d| host_matches(host, d))
}

/// The site a URL belongs to.
///
/// A leading `www.` is dropped. Hosts under a subdomain-aware domain (e.g.
/// `alice.github.io`) keep their full name; all others reduce to their
/// registrable domain (`blog.example.com` → `example.com`).
pub fn extract_domain(url: &str, subdomain_aware: &[String]) -> Option<String> {
    let host = host_of(url)?;
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if subdomain_aware.iter().any(|d| host_matches(&host, d)) {
        return Some(host);
    }
    Some(registrable_domain(&host))
}

/// Registrable domain (eTLD+1) per the Public Suffix List.
fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.');
    // IP literals have no domain structure
    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host.to_string();
    }
    match psl::domain(host.as_bytes()) {
        Some(domain) => String::from_utf8_lossy(domain.as_bytes()).into_owned(),
        // localhost and other bare suffixes
        None => last_two_labels(host),
    }
}

fn last_two_labels(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}

/// Compare two URLs as pages, ignoring a trailing slash on the path and
/// any fragment.
pub fn same_page(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
        }
        _ => a.trim_end_matches('/') == b.trim_end_matches('/'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aware() -> Vec<String> {
        vec!["github.io".to_string(), "neocities.org".to_string()]
    }

    #[test]
    fn www_is_dropped() {
        assert_eq!(
            extract_domain("https://www.example.com/a", &[]).as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn subdomain_reduced_unless_aware() {
        assert_eq!(
            extract_domain("https://blog.example.com/post", &aware()).as_deref(),
            Some("example.com")
        );
        assert_eq!(
            extract_domain("https://alice.github.io/post", &aware()).as_deref(),
            Some("alice.github.io")
        );
    }

    #[test]
    fn country_second_level_kept() {
        assert_eq!(
            extract_domain("https://news.example.co.uk/", &[]).as_deref(),
            Some("example.co.uk")
        );
    }

    #[test]
    fn public_suffixes_keep_sites_apart() {
        let alice = extract_domain("https://alice.ne.jp/x", &[]);
        let bob = extract_domain("https://bob.ne.jp/y", &[]);
        assert_eq!(alice.as_deref(), Some("alice.ne.jp"));
        assert_ne!(alice, bob);

        assert_eq!(
            extract_domain("https://alice.blogspot.com/", &[]).as_deref(),
            Some("alice.blogspot.com")
        );
        assert_eq!(
            extract_domain("https://shop.example.com.au/", &[]).as_deref(),
            Some("example.com.au")
        );
    }

    #[test]
    fn hosts_without_suffix_fall_back() {
        assert_eq!(
            extract_domain("http://localhost:8080/", &[]).as_deref(),
            Some("localhost")
        );
        assert_eq!(
            extract_domain("http://127.0.0.1/a", &[]).as_deref(),
            Some("127.0.0.1")
        );
    }

    #[test]
    fn relative_url_has_no_domain() {
        assert_eq!(extract_domain("/about", &[]), None);
    }

    #[test]
    fn host_matching_respects_label_boundaries() {
        assert!(host_matches("example.com", "example.com"));
        assert!(host_matches("www.example.com", "example.com"));
        assert!(!host_matches("badexample.com", "example.com"));
        assert!(!host_matches("com", "example.com"));
    }

    #[test]
    fn same_page_ignores_trailing_slash() {
        assert!(same_page("https://example.com", "https://example.com/"));
        assert!(same_page("https://example.com/a/", "https://example.com/a#top"));
        assert!(!same_page("https://example.com/a", "https://example.com/b"));
    }
}
