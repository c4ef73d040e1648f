use crate::error::ConfigError;
use crate::filter::pattern::{CompiledPattern, PatternMode, compile_all};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("static heading selector"));
static FRAGMENT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href^='#']").expect("static anchor selector"));
static NAMED_TARGET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[id], a[name]").expect("static anchor selector"));

/// `toc_url_filter` section of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TocFilterConfig {
    pub end_markers: Vec<String>,
    pub exclude_anchors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TocFilter {
    end_markers: Vec<CompiledPattern>,
    exclude_anchors: Vec<String>,
}

impl TocFilter {
    pub fn new(config: &TocFilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            end_markers: compile_all(&config.end_markers, PatternMode::PlainLine)?,
            exclude_anchors: config
                .exclude_anchors
                .iter()
                .map(|a| a.trim().trim_start_matches('#').to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        })
    }

    /// Truncates at the first entry whose anchor or text hits an end
    /// marker, then drops excluded anchors.
    pub fn apply(&self, headings: Vec<Heading>) -> Vec<Heading> {
        let cut = headings.iter().position(|h| {
            self.end_markers
                .iter()
                .any(|m| m.is_match(&h.anchor) || m.is_match(&h.text))
        });
        let mut headings = headings;
        if let Some(index) = cut {
            debug!("TOC end marker hit at entry {} ({})", index, headings[index].text);
            headings.truncate(index);
        }
        headings.retain(|h| !self.exclude_anchors.iter().any(|a| a == &h.anchor));
        headings
    }
}

/// A heading found in the filtered document, before numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: u8,
    pub depth: usize,
    pub number: String,
    pub text: String,
    pub anchor: String,
}

/// Collects headings from already-filtered HTML in document order.
pub fn collect_headings(filtered_html: &str) -> Vec<Heading> {
    let document = Html::parse_document(filtered_html);
    let mut used: HashMap<String, usize> = HashMap::new();
    let mut headings = Vec::new();

    for element in document.select(&HEADINGS) {
        let text = heading_text(&element);
        if text.is_empty() {
            continue;
        }
        let level = element.value().name()[1..].parse::<u8>().unwrap_or(1);
        let anchor = match explicit_anchor(&element) {
            Some(anchor) => anchor,
            None => {
                let base = slugify(&text);
                let seen = used.entry(base.clone()).or_insert(0);
                let anchor = if *seen == 0 {
                    base
                } else {
                    format!("{}-{}", base, seen)
                };
                *seen += 1;
                anchor
            }
        };
        headings.push(Heading { level, text, anchor });
    }
    headings
}

fn heading_text(element: &ElementRef) -> String {
    let raw: String = element.text().collect::<Vec<_>>().join(" ");
    let text = raw
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}'))
        .collect::<String>();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    text.trim_end_matches(['#', '¶', '§'])
        .trim_end_matches("🔗")
        .trim()
        .to_string()
}

fn explicit_anchor(element: &ElementRef) -> Option<String> {
    let value = element.value();
    if let Some(id) = value.id().filter(|id| !id.trim().is_empty()) {
        return Some(id.trim().to_string());
    }
    if let Some(href) = element
        .select(&FRAGMENT_LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(|h| h.trim_start_matches('#').trim())
        .find(|h| !h.is_empty())
    {
        return Some(href.to_string());
    }
    element
        .select(&NAMED_TARGET)
        .filter_map(|e| e.value().id().or_else(|| e.value().attr("name")))
        .map(str::trim)
        .find(|a| !a.is_empty())
        .map(str::to_string)
}

/// Deterministic anchor for a heading that carries none.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            dash = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { "section".to_string() } else { slug }
}

/// Assigns `1.`, `1.1.`, ... numbering from heading nesting. Skipped levels
/// nest one step, so `h1 > h3` numbers as `1.1.`.
pub fn number_headings(headings: Vec<Heading>) -> Vec<TocEntry> {
    let mut stack: Vec<(u8, usize)> = Vec::new();
    let mut entries = Vec::with_capacity(headings.len());

    for heading in headings {
        while let Some(&(level, _)) = stack.last() {
            if level > heading.level {
                stack.pop();
            } else {
                break;
            }
        }
        let same_level = matches!(stack.last(), Some(&(level, _)) if level == heading.level);
        if same_level {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
        } else {
            stack.push((heading.level, 1));
        }

        let number = stack
            .iter()
            .map(|(_, counter)| format!("{}.", counter))
            .collect::<String>();
        entries.push(TocEntry {
            level: heading.level,
            depth: stack.len() - 1,
            number,
            text: heading.text,
            anchor: heading.anchor,
        });
    }
    entries
}
