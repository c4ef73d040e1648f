// Framework presets and URL signature detection

/// Curated selectors for one documentation framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkPreset {
    pub name: &'static str,
    pub content_selectors: &'static [&'static str],
    pub exclude_selectors: &'static [&'static str],
}

pub const MINTLIFY: FrameworkPreset = FrameworkPreset {
    name: "mintlify",
    content_selectors: &["#content-area", "#content", ".mdx-content", "article"],
    exclude_selectors: &[
        "#sidebar",
        "#navbar",
        "#table-of-contents",
        "#pagination",
        "#content-side-layout",
        "[class*='feedback']",
        "[class*='eyebrow']",
    ],
};

pub const DOCUSAURUS: FrameworkPreset = FrameworkPreset {
    name: "docusaurus",
    content_selectors: &[".theme-doc-markdown", "article", "main .container"],
    exclude_selectors: &[
        ".theme-doc-sidebar-container",
        ".navbar",
        ".pagination-nav",
        ".theme-doc-toc-desktop",
        ".theme-doc-toc-mobile",
        ".theme-doc-footer",
        ".theme-doc-breadcrumbs",
        ".theme-edit-this-page",
        ".hash-link",
    ],
};

pub const VITEPRESS: FrameworkPreset = FrameworkPreset {
    name: "vitepress",
    content_selectors: &[".vp-doc", ".VPDoc .content", "main"],
    exclude_selectors: &[
        ".VPNav",
        ".VPSidebar",
        ".VPLocalNav",
        ".VPDocAside",
        ".VPDocFooter",
        ".aside",
        ".header-anchor",
    ],
};

pub const GITBOOK: FrameworkPreset = FrameworkPreset {
    name: "gitbook",
    content_selectors: &["main .page-body", "main"],
    exclude_selectors: &[
        "[data-testid='table-of-contents']",
        "[aria-label='Table of contents']",
        ".page-footer",
        "[class*='page-navigation']",
        "[class*='outline']",
    ],
};

pub const PRESETS: &[FrameworkPreset] = &[MINTLIFY, DOCUSAURUS, VITEPRESS, GITBOOK];

/// URL substrings that identify a framework. Checked in order, first match wins.
pub const SIGNATURES: &[(&str, &str)] = &[
    ("mintlify.app", "mintlify"),
    ("mintlify.com", "mintlify"),
    ("docusaurus.io", "docusaurus"),
    ("vitepress.dev", "vitepress"),
    ("gitbook.io", "gitbook"),
    ("gitbook.com", "gitbook"),
];

pub fn find_preset(name: &str) -> Option<&'static FrameworkPreset> {
    let name = name.trim();
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

pub fn detect_preset(url: &str) -> Option<&'static FrameworkPreset> {
    let url = url.to_ascii_lowercase();
    SIGNATURES
        .iter()
        .find(|(signature, _)| url.contains(signature))
        .and_then(|(_, name)| find_preset(name))
}

pub fn signatures_for(name: &str) -> Vec<&'static str> {
    SIGNATURES
        .iter()
        .filter(|(_, preset)| preset.eq_ignore_ascii_case(name))
        .map(|(signature, _)| *signature)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_preset_ignores_case() {
        assert_eq!(find_preset("Docusaurus").map(|p| p.name), Some("docusaurus"));
        assert!(find_preset("hugo").is_none());
    }

    #[test]
    fn test_detect_by_signature() {
        assert_eq!(
            detect_preset("https://acme.mintlify.app/quickstart").map(|p| p.name),
            Some("mintlify")
        );
        assert_eq!(
            detect_preset("https://docusaurus.io/docs/installation").map(|p| p.name),
            Some("docusaurus")
        );
        assert_eq!(
            detect_preset("https://team.gitbook.io/handbook").map(|p| p.name),
            Some("gitbook")
        );
        assert!(detect_preset("https://docs.rs/regex").is_none());
    }

    #[test]
    fn test_every_signature_names_a_preset() {
        for (signature, name) in SIGNATURES {
            assert!(find_preset(name).is_some(), "{} -> {}", signature, name);
        }
        assert_eq!(signatures_for("mintlify"), vec!["mintlify.app", "mintlify.com"]);
    }
}
