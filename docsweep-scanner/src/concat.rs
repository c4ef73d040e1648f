//! Turning discovered references into absolute, fetchable URLs.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const REJECTED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "about:", "blob:"];

/// How candidate URLs are produced from a discovered path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConcatMode {
    /// Resolve the path against the page it was found on.
    #[default]
    Standard,
    /// Also synthesize candidates from the configured route templates.
    Fuzz,
}

/// Route templates used in fuzz mode.
///
/// A route containing `{path}` has the discovered path substituted into it;
/// any other route is treated as a prefix and the path is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzSettings {
    pub custom_base_url: Option<String>,
    pub path_route: Option<String>,
    pub api_route: Option<String>,
}

/// Where a reference was found. Only script text gets the API-route
/// heuristic; markup attributes resolve exactly as a browser would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    Markup,
    Script,
}

#[derive(Debug, Clone, Default)]
pub struct UrlConcatenator {
    fuzz: FuzzSettings,
}

impl UrlConcatenator {
    pub fn new(fuzz: FuzzSettings) -> Self {
        Self { fuzz }
    }

    /// Resolve `path` against `base_url` with plain URL joining.
    ///
    /// Handles absolute, protocol-relative, root-relative, dot-relative and
    /// bare paths.
    pub fn resolve(&self, path: &str, base_url: &str) -> Result<String> {
        self.resolve_from(path, base_url, ReferenceSource::Markup)
    }

    /// Like [`resolve`](Self::resolve), except that bare paths found in
    /// script text whose first segment looks like an API route (`api/...`,
    /// `v2/...`) are anchored at the origin instead of the current directory.
    pub fn resolve_from(&self, path: &str, base_url: &str, source: ReferenceSource) -> Result<String> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ScanError::InvalidUrl("empty reference".to_string()));
        }
        if path.starts_with('#') {
            return Err(ScanError::InvalidUrl(format!("fragment-only reference {}", path)));
        }

        let lowered = path.to_ascii_lowercase();
        if REJECTED_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return Err(ScanError::InvalidUrl(format!("non-HTTP reference {}", path)));
        }
        if let Some(scheme) = explicit_scheme(&lowered)
            && scheme != "http"
            && scheme != "https"
        {
            return Err(ScanError::InvalidUrl(format!("unsupported scheme {}", scheme)));
        }

        let base = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let resolved = if let Some(rest) = path.strip_prefix("//") {
            Url::parse(&format!("{}://{}", base.scheme(), rest))
        } else if source == ReferenceSource::Script && is_api_route(path) {
            base.join(&format!("/{}", path))
        } else {
            base.join(path)
        }
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", path, e)))?;

        match resolved.scheme() {
            "http" | "https" if resolved.host_str().is_some() => Ok(resolved.to_string()),
            other => Err(ScanError::InvalidUrl(format!(
                "resolved {} has unsupported scheme {}",
                resolved, other
            ))),
        }
    }

    /// Resolve `path`, adding fuzz candidates when `mode` asks for them.
    pub fn resolve_all(
        &self,
        path: &str,
        base_url: &str,
        mode: ConcatMode,
        source: ReferenceSource,
    ) -> Vec<String> {
        let mut out = Vec::new();
        match self.resolve_from(path, base_url, source) {
            Ok(url) => out.push(url),
            Err(e) => debug!("Skipping reference {}: {}", path, e),
        }

        if mode == ConcatMode::Fuzz {
            for candidate in self.fuzz_candidates(path, base_url) {
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }

        out
    }

    /// Candidates synthesized from `path_route` and `api_route` against the
    /// custom base URL (or the origin of `base_url` when none is set).
    pub fn fuzz_candidates(&self, path: &str, base_url: &str) -> Vec<String> {
        let Some(base) = self.fuzz_base(base_url) else {
            return Vec::new();
        };

        let Some(path) = route_path(path) else {
            return Vec::new();
        };

        let mut out: Vec<String> = Vec::new();
        for route in [&self.fuzz.path_route, &self.fuzz.api_route]
            .into_iter()
            .flatten()
            .filter(|r| !r.trim().is_empty())
        {
            let combined = if route.contains("{path}") {
                route.replace("{path}", path.trim_start_matches('/'))
            } else {
                format!(
                    "{}/{}",
                    route.trim_end_matches('/'),
                    path.trim_start_matches('/')
                )
            };

            let candidate = format!(
                "{}/{}",
                base.trim_end_matches('/'),
                combined.trim_start_matches('/')
            );

            match Url::parse(&candidate) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    let url = url.to_string();
                    if !out.contains(&url) {
                        out.push(url);
                    }
                }
                _ => debug!("Discarding fuzz candidate {}", candidate),
            }
        }

        out
    }

    fn fuzz_base(&self, base_url: &str) -> Option<String> {
        if let Some(ref custom) = self.fuzz.custom_base_url
            && !custom.trim().is_empty()
        {
            return Some(custom.trim().to_string());
        }

        let base = Url::parse(base_url).ok()?;
        match base.origin() {
            origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
            url::Origin::Opaque(_) => None,
        }
    }
}

/// The scheme of `reference` if it has one, e.g. `mailto` for `mailto:x@y`.
fn explicit_scheme(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let head = &reference[..colon];
    if head.is_empty()
        || head.contains(['/', '?', '#'])
        || !head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some(head)
}

fn is_api_route(path: &str) -> bool {
    if path.starts_with(['/', '.', '?']) {
        return false;
    }
    let first = path.split('/').next().unwrap_or_default();
    first == "api"
        || (first.len() > 1
            && first.starts_with('v')
            && first[1..].chars().all(|c| c.is_ascii_digit()))
}

/// Path (plus query) that fuzz templates operate on.
fn route_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() || path.starts_with('#') {
        return None;
    }
    if let Ok(url) = Url::parse(path) {
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let mut p = url.path().to_string();
        if let Some(q) = url.query() {
            p.push('?');
            p.push_str(q);
        }
        return Some(p);
    }
    let lowered = path.to_ascii_lowercase();
    if REJECTED_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return None;
    }
    Some(path.trim_start_matches("./").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat() -> UrlConcatenator {
        UrlConcatenator::default()
    }

    #[test]
    fn test_resolve_absolute() {
        let url = concat()
            .resolve("https://other.example.com/a", "https://docs.example.com/guide/")
            .unwrap();
        assert_eq!(url, "https://other.example.com/a");
    }

    #[test]
    fn test_resolve_relative_forms() {
        let c = concat();
        let base = "https://docs.example.com/guide/intro";
        assert_eq!(c.resolve("setup", base).unwrap(), "https://docs.example.com/guide/setup");
        assert_eq!(c.resolve("./setup", base).unwrap(), "https://docs.example.com/guide/setup");
        assert_eq!(c.resolve("../faq", base).unwrap(), "https://docs.example.com/faq");
        assert_eq!(c.resolve("/root", base).unwrap(), "https://docs.example.com/root");
        assert_eq!(
            c.resolve("//cdn.example.com/x.js", base).unwrap(),
            "https://cdn.example.com/x.js"
        );
    }

    #[test]
    fn test_script_api_route_anchors_at_origin() {
        let c = concat();
        let base = "https://docs.example.com/guide/intro";
        assert_eq!(
            c.resolve_from("api/v1/users", base, ReferenceSource::Script).unwrap(),
            "https://docs.example.com/api/v1/users"
        );
        assert_eq!(
            c.resolve_from("v2/items", base, ReferenceSource::Script).unwrap(),
            "https://docs.example.com/v2/items"
        );
    }

    #[test]
    fn test_markup_versioned_path_stays_relative() {
        let c = concat();
        assert_eq!(
            c.resolve("v2/guide", "https://docs.example.com/docs/").unwrap(),
            "https://docs.example.com/docs/v2/guide"
        );
        assert_eq!(
            c.resolve_from("api/client", "https://docs.example.com/reference/", ReferenceSource::Markup)
                .unwrap(),
            "https://docs.example.com/reference/api/client"
        );
    }

    #[test]
    fn test_resolve_rejects_non_http() {
        let c = concat();
        let base = "https://docs.example.com/";
        for bad in [
            "javascript:void(0)",
            "mailto:team@example.com",
            "tel:+100",
            "data:text/plain,hi",
            "ftp://files.example.com/x",
            "#section",
            "",
        ] {
            assert!(c.resolve(bad, base).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_resolve_keeps_port_paths() {
        let url = concat()
            .resolve("/a", "http://localhost:8080/docs/")
            .unwrap();
        assert_eq!(url, "http://localhost:8080/a");
    }

    #[test]
    fn test_fuzz_candidates_with_prefix_routes() {
        let c = UrlConcatenator::new(FuzzSettings {
            custom_base_url: Some("https://api.example.com".to_string()),
            path_route: Some("/docs".to_string()),
            api_route: Some("/gateway/".to_string()),
        });

        let candidates = c.fuzz_candidates("/users/list", "https://www.example.com/app");
        assert_eq!(
            candidates,
            vec![
                "https://api.example.com/docs/users/list".to_string(),
                "https://api.example.com/gateway/users/list".to_string(),
            ]
        );
    }

    #[test]
    fn test_fuzz_candidates_with_placeholder_template() {
        let c = UrlConcatenator::new(FuzzSettings {
            custom_base_url: None,
            path_route: None,
            api_route: Some("/prod-api/{path}?lang=en".to_string()),
        });

        let candidates = c.fuzz_candidates("system/user", "https://www.example.com/index.html");
        assert_eq!(
            candidates,
            vec!["https://www.example.com/prod-api/system/user?lang=en".to_string()]
        );
    }

    #[test]
    fn test_resolve_all_standard_skips_fuzz() {
        let c = UrlConcatenator::new(FuzzSettings {
            custom_base_url: None,
            path_route: Some("/docs".to_string()),
            api_route: None,
        });

        let standard = c.resolve_all("/a", "https://example.com/", ConcatMode::Standard, ReferenceSource::Markup);
        assert_eq!(standard, vec!["https://example.com/a".to_string()]);

        let fuzzed = c.resolve_all("/a", "https://example.com/", ConcatMode::Fuzz, ReferenceSource::Markup);
        assert_eq!(
            fuzzed,
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/docs/a".to_string(),
            ]
        );
    }

    #[test]
    fn test_fuzz_ignores_rejected_references() {
        let c = UrlConcatenator::new(FuzzSettings {
            custom_base_url: None,
            path_route: Some("/docs".to_string()),
            api_route: None,
        });
        assert!(c.fuzz_candidates("mailto:x@example.com", "https://example.com/").is_empty());
        let rejected = c.resolve_all(
            "javascript:go()",
            "https://example.com/",
            ConcatMode::Fuzz,
            ReferenceSource::Script,
        );
        assert!(rejected.is_empty());
    }
}
