//! Main-content filtering.
//!
//! Chrome is removed in three stages inside the content root: semantic
//! (HTML5 sectioning tags and ARIA roles), general (class/id patterns and
//! preset excludes), then fuzzy keywords. Preserve selectors and code
//! containers only outrank the fuzzy stage, and only for the element that
//! matches them: a `<nav>` wrapping a `<code>` label is still chrome.

pub mod pattern;
pub mod presets;
pub mod rules;

use crate::config::deserialize_flag;
use crate::error::ConfigError;
use ego_tree::NodeId;
use pattern::{CompiledPattern, PatternMode, compile_all};
use presets::{FrameworkPreset, PRESETS, detect_preset, find_preset};
use regex::Regex;
use rules::{RuleStage, SelectorRule, parse_selector};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

pub use pattern::compile_flexible;

pub const DEFAULT_SEMANTIC_TAGS: &[&str] = &["nav", "aside", "footer", "header"];

pub const DEFAULT_ARIA_ROLES: &[&str] =
    &["navigation", "banner", "contentinfo", "complementary", "search"];

pub const DEFAULT_NON_CONTENT_SELECTORS: &[&str] = &[
    ".sidebar",
    "#sidebar",
    "[class*='sidebar']",
    "[id*='sidebar']",
    ".navbar",
    "[class*='navbar']",
    ".nav-links",
    ".toc",
    "#toc",
    "[class*='table-of-contents']",
    "[class*='footer']",
    ".pagination",
    "[class*='pagination']",
    "[class*='breadcrumb']",
    "[class*='modal']",
    "[class*='cookie']",
    "[class*='edit-this-page']",
    "[class*='edit-link']",
    "[class*='feedback']",
    ".skip-link",
];

pub const DEFAULT_FUZZY_KEYWORDS: &[&str] = &[
    "sidebar",
    "breadcrumb",
    "navbar",
    "menu",
    "toc",
    "pagination",
    "footer",
    "cookie",
    "advert",
];

pub const DEFAULT_PRESERVE_SELECTORS: &[&str] =
    &["article", "main", "[role='main']", ".markdown-body", ".content", ".prose"];

pub const DEFAULT_CODE_CONTAINERS: &[&str] =
    &["pre", "code", ".highlight", "[class*='codeblock']"];

pub const DEFAULT_LOG_LEVELS: &[&str] =
    &["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL", "FATAL"];

pub const DEFAULT_MEANINGLESS_CONTENT: &[&str] = &[
    "Copy",
    "Copy code",
    "Copied!",
    "Edit this page",
    "On this page",
    "Was this page helpful?",
    "Skip to main content",
];

const STRIP_TAGS: &str = "script, style, noscript, template, svg";

static STRIP_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(STRIP_TAGS).expect("static strip selector"));
static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static body selector"));
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(```|~~~)").expect("static fence regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    #[default]
    Extend,
    Replace,
}

impl FromStr for MergeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extend" | "" => Ok(MergeMode::Extend),
            "replace" => Ok(MergeMode::Replace),
            other => Err(ConfigError::InvalidMergeMode(other.to_string())),
        }
    }
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Extend => "extend",
            MergeMode::Replace => "replace",
        }
    }
}

/// `content_filter` section of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub merge_mode: String,
    pub documentation_preset: Option<String>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub auto_detect_framework: bool,
    pub content_selectors: Vec<String>,
    pub non_content_selectors: Vec<String>,
    pub fuzzy_keywords: Vec<String>,
    pub log_levels: Vec<String>,
    pub meaningless_content: Vec<String>,
    pub content_end_markers: Vec<String>,
    pub content_preserve_selectors: Vec<String>,
    pub code_container_selectors: Vec<String>,
}

impl FilterConfig {
    pub fn merge_mode(&self) -> Result<MergeMode, ConfigError> {
        self.merge_mode.parse()
    }
}

struct CompiledPreset {
    preset: &'static FrameworkPreset,
    content: Vec<Selector>,
    exclude: Vec<SelectorRule>,
}

/// Compiled, immutable filter shared by every worker.
pub struct ContentFilter {
    merge_mode: MergeMode,
    removal_rules: Vec<SelectorRule>,
    protect_rules: Vec<SelectorRule>,
    content_selectors: Vec<Selector>,
    presets: Vec<CompiledPreset>,
    explicit_preset: Option<&'static FrameworkPreset>,
    auto_detect: bool,
    meaningless: HashSet<String>,
    log_line: Option<Regex>,
    end_markers: Vec<CompiledPattern>,
}

fn merged(defaults: &[&str], user: &[String], mode: MergeMode) -> Vec<String> {
    let mut out: Vec<String> = match mode {
        MergeMode::Extend => defaults.iter().map(|s| s.to_string()).collect(),
        MergeMode::Replace => Vec::new(),
    };
    for item in user {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn log_line_regex(levels: &[String]) -> Result<Option<Regex>, ConfigError> {
    let levels: Vec<String> = levels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(regex::escape)
        .collect();
    if levels.is_empty() {
        return Ok(None);
    }
    let alternation = levels.join("|");
    let expr = format!(
        r"^\s*(?:\[?\d{{4}}-\d{{2}}-\d{{2}}[T ][0-9:.,]+Z?\]?\s+)?(?:\[(?:{0})\]|(?:{0}):)",
        alternation
    );
    Regex::new(&expr)
        .map(Some)
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: expr,
            reason: e.to_string(),
        })
}

impl ContentFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        let merge_mode = config.merge_mode()?;

        let explicit_preset = match config.documentation_preset.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(
                find_preset(name).ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?,
            ),
            _ => None,
        };

        let mut removal_rules = Vec::new();
        if merge_mode == MergeMode::Extend {
            for tag in DEFAULT_SEMANTIC_TAGS {
                removal_rules.push(SelectorRule::semantic_tag(tag)?);
            }
            for role in DEFAULT_ARIA_ROLES {
                removal_rules.push(SelectorRule::aria_role(role)?);
            }
        }
        for pattern in merged(DEFAULT_NON_CONTENT_SELECTORS, &config.non_content_selectors, merge_mode) {
            removal_rules.push(SelectorRule::css(&pattern)?);
        }
        for keyword in merged(DEFAULT_FUZZY_KEYWORDS, &config.fuzzy_keywords, merge_mode) {
            removal_rules.push(SelectorRule::fuzzy(&keyword)?);
        }

        let mut protect_rules = Vec::new();
        for pattern in merged(DEFAULT_PRESERVE_SELECTORS, &config.content_preserve_selectors, MergeMode::Extend)
            .into_iter()
            .chain(merged(DEFAULT_CODE_CONTAINERS, &config.code_container_selectors, MergeMode::Extend))
        {
            protect_rules.push(SelectorRule::preserve(&pattern)?);
        }

        let content_selectors = config
            .content_selectors
            .iter()
            .map(|s| parse_selector(s.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let presets = PRESETS
            .iter()
            .map(|preset| {
                Ok(CompiledPreset {
                    preset,
                    content: preset
                        .content_selectors
                        .iter()
                        .map(|s| parse_selector(s))
                        .collect::<Result<Vec<_>, ConfigError>>()?,
                    exclude: preset
                        .exclude_selectors
                        .iter()
                        .map(|s| SelectorRule::css(s))
                        .collect::<Result<Vec<_>, ConfigError>>()?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let meaningless = merged(DEFAULT_MEANINGLESS_CONTENT, &config.meaningless_content, MergeMode::Extend)
            .into_iter()
            .collect();
        let log_line = log_line_regex(&merged(DEFAULT_LOG_LEVELS, &config.log_levels, MergeMode::Extend))?;
        let end_markers = compile_all(&config.content_end_markers, PatternMode::MarkdownHeading)?;

        debug!(
            "Content filter ready: merge {}, {} removal rules, {} protect rules, {} end markers",
            merge_mode.as_str(),
            removal_rules.len(),
            protect_rules.len(),
            end_markers.len()
        );

        Ok(Self {
            merge_mode,
            removal_rules,
            protect_rules,
            content_selectors,
            presets,
            explicit_preset,
            auto_detect: config.auto_detect_framework,
            meaningless,
            log_line,
            end_markers,
        })
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge_mode
    }

    pub fn rules(&self) -> &[SelectorRule] {
        &self.removal_rules
    }

    /// Preset in effect for `url`: the explicit one, else the detected one
    /// when auto detection is on.
    pub fn active_preset(&self, url: &str) -> Option<&'static FrameworkPreset> {
        self.explicit_preset
            .or_else(|| if self.auto_detect { detect_preset(url) } else { None })
    }

    fn compiled_preset(&self, url: &str) -> Option<&CompiledPreset> {
        let active = self.active_preset(url)?;
        self.presets.iter().find(|c| c.preset.name == active.name)
    }

    /// Returns the outer HTML of the filtered content root.
    pub fn filter_html(&self, html: &str, url: &str) -> String {
        let mut document = Html::parse_document(html);
        let preset = self.compiled_preset(url);

        let Some(root_id) = self.content_root(&document, preset) else {
            return String::new();
        };

        let mut doomed: Vec<NodeId> = Vec::new();
        {
            let Some(root) = document.tree.get(root_id).and_then(ElementRef::wrap) else {
                return String::new();
            };

            let stripped: HashSet<NodeId> = root.select(&STRIP_SELECTOR).map(|e| e.id()).collect();

            let protected: HashSet<NodeId> = root
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|element| self.protect_rules.iter().any(|r| r.matches(element)))
                .map(|element| element.id())
                .collect();

            let mut removed: HashSet<NodeId> = stripped.clone();
            doomed.extend(stripped.iter().copied());

            let preset_rules = preset.map(|p| p.exclude.as_slice()).unwrap_or(&[]);
            for stage in [RuleStage::Semantic, RuleStage::General, RuleStage::Fuzzy] {
                let mut stage_count = 0;
                for element in root.descendants().filter_map(ElementRef::wrap) {
                    let id = element.id();
                    if id == root_id {
                        continue;
                    }
                    if stage == RuleStage::Fuzzy && protected.contains(&id) {
                        continue;
                    }
                    if element.ancestors().any(|a| removed.contains(&a.id())) || removed.contains(&id) {
                        continue;
                    }
                    let hit = self
                        .removal_rules
                        .iter()
                        .chain(preset_rules.iter())
                        .filter(|r| r.stage() == stage)
                        .any(|r| r.matches(&element));
                    if hit {
                        removed.insert(id);
                        doomed.push(id);
                        stage_count += 1;
                    }
                }
                debug!("{} stage removed {} element(s) from {}", stage.as_str(), stage_count, url);
            }
        }

        for id in doomed {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        document
            .tree
            .get(root_id)
            .and_then(ElementRef::wrap)
            .map(|root| root.html())
            .unwrap_or_default()
    }

    fn content_root(&self, document: &Html, preset: Option<&CompiledPreset>) -> Option<NodeId> {
        let candidates = self
            .content_selectors
            .iter()
            .chain(preset.into_iter().flat_map(|p| p.content.iter()))
            .chain(std::iter::once(&*BODY_SELECTOR));
        for selector in candidates {
            if let Some(element) = document.select(selector).next() {
                return Some(element.id());
            }
        }
        document.root_element().id().into()
    }

    /// Drops boilerplate lines and log lines outside fenced code.
    pub fn filter_lines(&self, markdown: &str) -> String {
        let mut in_fence = false;
        let mut kept = Vec::new();
        for line in markdown.lines() {
            if FENCE.is_match(line) {
                in_fence = !in_fence;
                kept.push(line);
                continue;
            }
            if !in_fence {
                if self.meaningless.contains(line.trim()) {
                    continue;
                }
                if let Some(ref log_line) = self.log_line
                    && log_line.is_match(line)
                {
                    continue;
                }
            }
            kept.push(line);
        }
        let mut out = kept.join("\n");
        if markdown.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Cuts the document at the first line matching an end marker. Matches
    /// inside fenced code do not count.
    pub fn filter_content_end_markers(&self, markdown: &str) -> String {
        if self.end_markers.is_empty() {
            return markdown.to_string();
        }

        let mut in_fence = false;
        let mut offset = 0;
        for line in markdown.split_inclusive('\n') {
            let text = line.trim_end_matches(['\n', '\r']);
            if FENCE.is_match(text) {
                in_fence = !in_fence;
            } else if !in_fence && let Some(marker) = self.end_markers.iter().find(|m| m.is_match(text)) {
                debug!("End marker '{}' matched at byte {}", marker.source(), offset);
                let prefix = markdown[..offset].trim_end();
                return if prefix.is_empty() {
                    String::new()
                } else {
                    format!("{}\n", prefix)
                };
            }
            offset += line.len();
        }
        markdown.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(config: FilterConfig) -> ContentFilter {
        ContentFilter::new(&config).unwrap()
    }

    #[test]
    fn test_merge_mode_parsing() {
        assert_eq!("extend".parse::<MergeMode>().unwrap(), MergeMode::Extend);
        assert_eq!("Replace".parse::<MergeMode>().unwrap(), MergeMode::Replace);
        assert_eq!("".parse::<MergeMode>().unwrap(), MergeMode::Extend);
        assert!(matches!(
            "merge".parse::<MergeMode>(),
            Err(ConfigError::InvalidMergeMode(_))
        ));
    }

    #[test]
    fn test_unknown_preset_is_rejected() {
        let err = ContentFilter::new(&FilterConfig {
            documentation_preset: Some("hugo".to_string()),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::UnknownPreset(_)));
    }

    #[test]
    fn test_strips_scripts_and_semantic_chrome() {
        let f = filter(FilterConfig::default());
        let out = f.filter_html(
            r#"<html><body><header>Site</header><nav>Links</nav><p>Real text</p><script>var x;</script><footer>(c)</footer></body></html>"#,
            "https://docs.example.com/",
        );
        assert!(out.contains("Real text"));
        assert!(!out.contains("Site"));
        assert!(!out.contains("Links"));
        assert!(!out.contains("var x"));
        assert!(!out.contains("(c)"));
    }

    #[test]
    fn test_nav_with_inline_code_label_is_removed() {
        let f = filter(FilterConfig::default());
        let out = f.filter_html(
            r#"<html><body><nav class="sidebar"><a><code>Client::new</code></a><a>Other sidebar link</a></nav><p>Body</p></body></html>"#,
            "https://docs.example.com/",
        );
        assert!(out.contains("Body"));
        assert!(!out.contains("Client::new"));
        assert!(!out.contains("Other sidebar link"));
        assert!(!out.contains("<nav"));
    }

    #[test]
    fn test_general_rule_removes_sidebar_holding_code() {
        let f = filter(FilterConfig::default());
        let out = f.filter_html(
            r#"<html><body><div class="sidebar-panel"><pre><code>cargo run</code></pre></div><p>Text</p></body></html>"#,
            "https://docs.example.com/",
        );
        assert!(out.contains("Text"));
        assert!(!out.contains("cargo run"));
    }

    #[test]
    fn test_code_container_spared_by_fuzzy_stage() {
        let f = filter(FilterConfig::default());
        let out = f.filter_html(
            r#"<html><body><p>Intro</p><pre class="toc-example"><code>toc --build</code></pre></body></html>"#,
            "https://docs.example.com/",
        );
        assert!(out.contains("toc --build"));
    }

    #[test]
    fn test_content_selector_picks_root() {
        let f = filter(FilterConfig {
            content_selectors: vec!["#doc".to_string()],
            ..Default::default()
        });
        let out = f.filter_html(
            r#"<html><body><div>outside</div><div id="doc"><p>inside</p></div></body></html>"#,
            "https://docs.example.com/",
        );
        assert!(out.contains("inside"));
        assert!(!out.contains("outside"));
    }

    #[test]
    fn test_auto_detect_applies_preset_excludes() {
        let f = filter(FilterConfig {
            auto_detect_framework: true,
            ..Default::default()
        });
        let html = r##"<html><body><div>outside</div><div class="theme-doc-markdown"><h2 id="intro">Intro<a class="hash-link" href="#intro">#</a></h2><p>Doc body</p></div></body></html>"##;
        let out = f.filter_html(html, "https://docusaurus.io/docs/intro");
        assert!(out.contains("Doc body"));
        assert!(!out.contains("outside"));
        assert!(!out.contains("hash-link"));

        // Same markup on an unknown host keeps the permalink.
        let plain = f.filter_html(html, "https://docs.example.com/intro");
        assert!(plain.contains("hash-link"));
        assert_eq!(f.active_preset("https://docusaurus.io/docs").map(|p| p.name), Some("docusaurus"));
        assert!(f.active_preset("https://docs.example.com/").is_none());
    }

    #[test]
    fn test_filter_lines_drops_noise_outside_code() {
        let f = filter(FilterConfig::default());
        let md = "Intro\nCopy\n[INFO] server started\n2024-01-01 10:00:00 ERROR: boom\n```\n[INFO] inside code\nCopy\n```\nINFO is a level name\n";
        let out = f.filter_lines(md);
        assert_eq!(
            out,
            "Intro\n```\n[INFO] inside code\nCopy\n```\nINFO is a level name\n"
        );
    }

    #[test]
    fn test_end_marker_inside_code_is_ignored() {
        let f = filter(FilterConfig {
            content_end_markers: vec!["See also".to_string()],
            ..Default::default()
        });
        let md = "# Title\n\n```\nSee also\n```\n\nMore\n\n## See also\n\n- link\n";
        assert_eq!(
            f.filter_content_end_markers(md),
            "# Title\n\n```\nSee also\n```\n\nMore\n"
        );
    }

    #[test]
    fn test_end_marker_on_first_line_empties_document() {
        let f = filter(FilterConfig {
            content_end_markers: vec!["Next steps".to_string()],
            ..Default::default()
        });
        assert_eq!(f.filter_content_end_markers("## Next steps\n\nDo X"), "");
    }
}
