//! Candidate validation, crawl scope and link harvesting.

use crate::concat::{ConcatMode, ReferenceSource, UrlConcatenator};
use crate::error::ScanError;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Extensions that are never worth fetching for documentation content.
pub const DEFAULT_EXTENSION_BLACKLIST: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "avif", "tif", "tiff", "woff",
    "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "avi", "mov", "mkv", "webm", "flv",
    "zip", "tar", "gz", "tgz", "rar", "7z", "bz2", "xz", "exe", "dmg", "msi", "apk", "iso",
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "css", "map",
];

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "a[href], link[href], area[href], iframe[src], script[src], form[action]",
    )
    .expect("static link selector")
});

static INLINE_SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script:not([src])").expect("static script selector"));

static ABSOLUTE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+"#).expect("static url regex")
});

static QUOTED_ROOT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'`](/[A-Za-z0-9\-._~/]{2,}(?:\?[A-Za-z0-9\-._~=&%]*)?)["'`]"#)
        .expect("static path regex")
});

static QUOTED_API_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'`]((?:api|v\d+)/[A-Za-z0-9\-._~/]+(?:\?[A-Za-z0-9\-._~=&%]*)?)["'`]"#)
        .expect("static api path regex")
});

/// How far a crawl may wander away from its seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScopeMode {
    /// Only the seed domains are crawled; external links are recorded.
    #[default]
    MainDomainOnly = 0,
    /// External pages are fetched once but never recursed into.
    ExternalOnce = 1,
    /// Anything reachable, bounded by depth and URL cap.
    Unlimited = 2,
    /// Only domains on the whitelist.
    Whitelist = 3,
}

impl TryFrom<u8> for ScopeMode {
    type Error = ScanError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ScopeMode::MainDomainOnly),
            1 => Ok(ScopeMode::ExternalOnce),
            2 => Ok(ScopeMode::Unlimited),
            3 => Ok(ScopeMode::Whitelist),
            other => Err(ScanError::Other(format!(
                "scope mode must be between 0 and 3, got {}",
                other
            ))),
        }
    }
}

impl From<ScopeMode> for u8 {
    fn from(mode: ScopeMode) -> Self {
        mode as u8
    }
}

impl ScopeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeMode::MainDomainOnly => "main-domain-only",
            ScopeMode::ExternalOnce => "external-once",
            ScopeMode::Unlimited => "unlimited",
            ScopeMode::Whitelist => "whitelist",
        }
    }
}

/// Where a URL sits relative to the seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeClass {
    Seed,
    Internal,
    External,
}

impl ScopeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeClass::Seed => "seed",
            ScopeClass::Internal => "internal",
            ScopeClass::External => "external",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    seed_hosts: Vec<String>,
    blacklist_domains: Vec<String>,
    whitelist_domains: Vec<String>,
    extension_blacklist: HashSet<String>,
}

impl UrlMatcher {
    pub fn new(
        seed_hosts: Vec<String>,
        blacklist_domains: Vec<String>,
        whitelist_domains: Vec<String>,
        extension_blacklist: Vec<String>,
    ) -> Self {
        Self {
            seed_hosts: normalize_domains(seed_hosts),
            blacklist_domains: normalize_domains(blacklist_domains),
            whitelist_domains: normalize_domains(whitelist_domains),
            extension_blacklist: extension_blacklist
                .into_iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn add_seed_host(&mut self, host: &str) {
        let host = host.to_ascii_lowercase();
        if !self.seed_hosts.contains(&host) {
            self.seed_hosts.push(host);
        }
    }

    pub fn whitelist(&self) -> &[String] {
        &self.whitelist_domains
    }

    /// Scheme, host, blacklist and extension checks. Never fails loudly.
    pub fn is_valid_candidate(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if self
            .blacklist_domains
            .iter()
            .any(|d| host_matches(host, d))
        {
            debug!("Blacklisted domain: {}", url);
            return false;
        }
        if let Some(ext) = path_extension(parsed.path())
            && self.extension_blacklist.contains(&ext)
        {
            debug!("Blacklisted extension .{}: {}", ext, url);
            return false;
        }
        true
    }

    pub fn classify(&self, url: &str) -> ScopeClass {
        match Url::parse(url).ok().as_ref().and_then(|u| u.host_str()) {
            Some(host) if self.seed_hosts.iter().any(|s| host_matches(host, s)) => {
                ScopeClass::Internal
            }
            _ => ScopeClass::External,
        }
    }

    pub fn is_in_scope(&self, url: &str, scope_mode: ScopeMode, whitelist: &[String]) -> bool {
        if !self.is_valid_candidate(url) {
            return false;
        }
        match scope_mode {
            ScopeMode::MainDomainOnly => self.classify(url) == ScopeClass::Internal,
            ScopeMode::ExternalOnce | ScopeMode::Unlimited => true,
            ScopeMode::Whitelist => {
                let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(String::from))
                else {
                    return false;
                };
                whitelist
                    .iter()
                    .any(|d| host_matches(&host, &d.trim().to_ascii_lowercase()))
            }
        }
    }

    /// Harvest outbound references from a fetched body, resolved to
    /// absolute URLs in order of first appearance.
    pub fn extract_links(
        &self,
        body: &str,
        base_url: &str,
        content_type: Option<&str>,
        keep_fragments: bool,
        concatenator: &UrlConcatenator,
        mode: ConcatMode,
    ) -> Vec<String> {
        if body.trim().is_empty() {
            return Vec::new();
        }

        let is_html = content_type
            .map(|ct| ct.contains("html"))
            .unwrap_or_else(|| body.trim_start().starts_with('<'));

        let mut references: Vec<(String, ReferenceSource)> = Vec::new();
        if is_html {
            let document = Html::parse_document(body);
            for element in document.select(&LINK_SELECTOR) {
                let value = element.value();
                let attr = value
                    .attr("href")
                    .or_else(|| value.attr("src"))
                    .or_else(|| value.attr("action"));
                if let Some(reference) = attr {
                    references.push((reference.to_string(), ReferenceSource::Markup));
                }
            }
            for script in document.select(&INLINE_SCRIPT_SELECTOR) {
                let text: String = script.text().collect();
                references.extend(text_references(&text));
            }
        } else {
            references.extend(text_references(body));
        }

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for (reference, source) in references {
            for resolved in concatenator.resolve_all(&reference, base_url, mode, source) {
                let normalized = if keep_fragments {
                    resolved
                } else {
                    strip_fragment(&resolved)
                };
                if seen.insert(normalized.clone()) {
                    links.push(normalized);
                }
            }
        }

        debug!("Extracted {} links from {}", links.len(), base_url);
        links
    }
}

/// Canonical form used as the dedup key: fragment removed, default port and
/// case normalized by the `url` crate.
pub fn normalize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

pub fn strip_fragment(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

fn text_references(text: &str) -> Vec<(String, ReferenceSource)> {
    let mut out: Vec<String> = ABSOLUTE_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['\'', ')', ',', ';']).to_string())
        .collect();
    out.extend(
        QUOTED_ROOT_PATH
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|p| !p.starts_with("//")),
    );
    out.extend(
        QUOTED_API_PATH
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    );
    out.into_iter().map(|r| (r, ReferenceSource::Script)).collect()
}

fn normalize_domains(domains: Vec<String>) -> Vec<String> {
    domains
        .into_iter()
        .map(|d| d.trim().trim_start_matches("*.").to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> UrlMatcher {
        UrlMatcher::new(
            vec!["docs.example.com".to_string()],
            vec!["ads.example.net".to_string()],
            vec!["partner.example.org".to_string()],
            DEFAULT_EXTENSION_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_scope_mode_from_u8() {
        assert_eq!(ScopeMode::try_from(0).unwrap(), ScopeMode::MainDomainOnly);
        assert_eq!(ScopeMode::try_from(3).unwrap(), ScopeMode::Whitelist);
        assert!(ScopeMode::try_from(4).is_err());
    }

    #[test]
    fn test_valid_candidate_rules() {
        let m = matcher();
        assert!(m.is_valid_candidate("https://docs.example.com/guide"));
        assert!(!m.is_valid_candidate("ftp://docs.example.com/guide"));
        assert!(!m.is_valid_candidate("https://tracker.ads.example.net/p"));
        assert!(!m.is_valid_candidate("https://docs.example.com/logo.PNG"));
        assert!(!m.is_valid_candidate("not a url"));
        assert!(m.is_valid_candidate("https://docs.example.com/v1.2/intro"));
    }

    #[test]
    fn test_classify_subdomains_as_internal() {
        let m = matcher();
        assert_eq!(m.classify("https://docs.example.com/a"), ScopeClass::Internal);
        assert_eq!(m.classify("https://eu.docs.example.com/a"), ScopeClass::Internal);
        assert_eq!(m.classify("https://example.com/a"), ScopeClass::External);
    }

    #[test]
    fn test_scope_modes() {
        let m = matcher();
        let internal = "https://docs.example.com/a";
        let external = "https://github.com/org/repo";
        let partner = "https://partner.example.org/x";
        let wl = m.whitelist().to_vec();

        assert!(m.is_in_scope(internal, ScopeMode::MainDomainOnly, &wl));
        assert!(!m.is_in_scope(external, ScopeMode::MainDomainOnly, &wl));
        assert!(m.is_in_scope(external, ScopeMode::ExternalOnce, &wl));
        assert!(m.is_in_scope(external, ScopeMode::Unlimited, &wl));
        assert!(m.is_in_scope(partner, ScopeMode::Whitelist, &wl));
        assert!(!m.is_in_scope(external, ScopeMode::Whitelist, &wl));
    }

    #[test]
    fn test_extract_links_from_html() {
        let m = matcher();
        let c = UrlConcatenator::default();
        let html = r##"<html><head><link href="/style.css" rel="stylesheet"></head><body>
            <a href="/guide#install">Guide</a>
            <a href="/guide">Guide again</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="#top">Top</a>
            <script>const api = "/api/v1/pages"; fetch("https://cdn.example.com/data.json");</script>
        </body></html>"##;

        let links = m.extract_links(
            html,
            "https://docs.example.com/index.html",
            Some("text/html"),
            false,
            &c,
            ConcatMode::Standard,
        );

        assert_eq!(
            links,
            vec![
                "https://docs.example.com/style.css".to_string(),
                "https://docs.example.com/guide".to_string(),
                "https://cdn.example.com/data.json".to_string(),
                "https://docs.example.com/api/v1/pages".to_string(),
            ]
        );
    }

    #[test]
    fn test_versioned_href_resolves_relative_but_script_route_is_rooted() {
        let m = matcher();
        let c = UrlConcatenator::default();
        let html = r#"<html><body>
            <a href="v2/guide">Version 2 guide</a>
            <script>const endpoint = "api/search";</script>
        </body></html>"#;

        let links = m.extract_links(
            html,
            "https://docs.example.com/docs/",
            Some("text/html"),
            false,
            &c,
            ConcatMode::Standard,
        );

        assert_eq!(
            links,
            vec![
                "https://docs.example.com/docs/v2/guide".to_string(),
                "https://docs.example.com/api/search".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_keeps_fragments_when_asked() {
        let m = matcher();
        let c = UrlConcatenator::default();
        let html = r#"<a href="/guide#install">Guide</a><a href="/guide#usage">Usage</a>"#;
        let links = m.extract_links(
            html,
            "https://docs.example.com/",
            Some("text/html"),
            true,
            &c,
            ConcatMode::Standard,
        );
        assert_eq!(links.len(), 2);
        assert!(links[0].ends_with("#install"));
    }

    #[test]
    fn test_extract_links_from_javascript_body() {
        let m = matcher();
        let c = UrlConcatenator::default();
        let js = r#"var routes = ['/user/list', "/system/config"]; var cdn = "https://static.example.com/app.js";"#;
        let links = m.extract_links(
            js,
            "https://docs.example.com/static/app.js",
            Some("application/javascript"),
            false,
            &c,
            ConcatMode::Standard,
        );
        assert!(links.contains(&"https://static.example.com/app.js".to_string()));
        assert!(links.contains(&"https://docs.example.com/user/list".to_string()));
        assert!(links.contains(&"https://docs.example.com/system/config".to_string()));
    }

    #[test]
    fn test_normalize_url_drops_fragment_and_default_port() {
        assert_eq!(
            normalize_url("HTTPS://Docs.Example.com:443/a#b").unwrap(),
            "https://docs.example.com/a"
        );
        assert!(normalize_url("mailto:x@example.com").is_none());
    }
}
