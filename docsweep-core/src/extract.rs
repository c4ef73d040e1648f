use crate::error::ConfigError;
use crate::filter::ContentFilter;
use crate::markdown::MarkdownConverter;
use crate::toc::{TocEntry, TocFilter, collect_headings, number_headings};
use docsweep_scanner::ScanResult;
use docsweep_scanner::crawler::page_title;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::debug;
use url::Url;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("static h1 selector"));

pub const SOURCE_BANNER: &str = "> 原文链接: ";

/// What to produce for each successfully fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ExtractionMode {
    CsvOnly = 0,
    Content = 1,
    Toc = 2,
    #[default]
    Combined = 3,
}

impl TryFrom<u8> for ExtractionMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ExtractionMode::CsvOnly),
            1 => Ok(ExtractionMode::Content),
            2 => Ok(ExtractionMode::Toc),
            3 => Ok(ExtractionMode::Combined),
            other => Err(ConfigError::InvalidExtractionMode(other)),
        }
    }
}

impl From<ExtractionMode> for u8 {
    fn from(mode: ExtractionMode) -> Self {
        mode as u8
    }
}

impl ExtractionMode {
    pub fn includes_content(self) -> bool {
        matches!(self, ExtractionMode::Content | ExtractionMode::Combined)
    }

    pub fn includes_toc(self) -> bool {
        matches!(self, ExtractionMode::Toc | ExtractionMode::Combined)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::CsvOnly => "csv-only",
            ExtractionMode::Content => "content",
            ExtractionMode::Toc => "toc",
            ExtractionMode::Combined => "combined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub title: String,
    pub url: String,
    pub markdown: String,
    pub line_count: usize,
}

impl ContentDocument {
    pub fn is_empty(&self) -> bool {
        self.markdown.trim().is_empty()
    }

    /// File body for `docContent.md`.
    pub fn render(&self) -> String {
        if self.is_empty() {
            format!("{}{}\n", SOURCE_BANNER, self.url)
        } else {
            format!("{}{}\n\n{}\n", SOURCE_BANNER, self.url, self.markdown.trim_end())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocDocument {
    pub title: String,
    pub url: String,
    pub entries: Vec<TocEntry>,
}

impl TocDocument {
    /// File body for `docTOC.md`.
    pub fn render(&self) -> String {
        let mut out = format!("# {}\n", self.title);
        if !self.entries.is_empty() {
            out.push('\n');
        }
        for entry in &self.entries {
            out.push_str(&format!(
                "{}- {} [{}]({}#{})\n",
                "  ".repeat(entry.depth),
                entry.number,
                entry.text,
                self.url,
                entry.anchor
            ));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutput {
    pub title: String,
    pub content: Option<ContentDocument>,
    pub toc: Option<TocDocument>,
}

/// Page title: `<title>`, else the first `<h1>`, else the last path segment,
/// else `untitled`.
pub fn document_title(html: &str, url: &str) -> String {
    if let Some(title) = page_title(html) {
        return title;
    }
    let document = Html::parse_document(html);
    if let Some(h1) = document.select(&H1).next() {
        let text = h1.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            return text;
        }
    }
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| "untitled".to_string())
}

fn without_fragment(url: &str) -> String {
    url.split('#').next().unwrap_or(url).to_string()
}

/// Produces content and TOC documents from HTML already in memory.
#[derive(Clone)]
pub struct ContentExtractor {
    filter: Arc<ContentFilter>,
    converter: MarkdownConverter,
    toc_filter: Arc<TocFilter>,
}

impl ContentExtractor {
    pub fn new(filter: Arc<ContentFilter>, toc_filter: Arc<TocFilter>) -> Self {
        Self {
            filter,
            converter: MarkdownConverter::new(),
            toc_filter,
        }
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    pub fn extract_content(&self, html: &str, url: &str) -> ContentDocument {
        let filtered = self.filter.filter_html(html, url);
        self.content_from_filtered(&filtered, url, document_title(html, url))
    }

    pub fn extract_toc(&self, html: &str, url: &str) -> TocDocument {
        let filtered = self.filter.filter_html(html, url);
        self.toc_from_filtered(&filtered, url, document_title(html, url))
    }

    /// Both documents from the body of a completed scan, filtering it once.
    pub fn extract_inline(&self, result: &ScanResult, mode: ExtractionMode) -> ExtractionOutput {
        let title = document_title(&result.body, &result.url);
        if mode == ExtractionMode::CsvOnly {
            return ExtractionOutput {
                title,
                ..Default::default()
            };
        }

        let filtered = self.filter.filter_html(&result.body, &result.url);
        let content = mode
            .includes_content()
            .then(|| self.content_from_filtered(&filtered, &result.url, title.clone()));
        let toc = mode
            .includes_toc()
            .then(|| self.toc_from_filtered(&filtered, &result.url, title.clone()));

        ExtractionOutput { title, content, toc }
    }

    fn content_from_filtered(&self, filtered: &str, url: &str, title: String) -> ContentDocument {
        let markdown = self.converter.convert(filtered);
        let markdown = self.filter.filter_lines(&markdown);
        let markdown = self.filter.filter_content_end_markers(&markdown);
        let line_count = markdown.lines().count();
        debug!("Content for {}: {} line(s)", url, line_count);
        ContentDocument {
            title,
            url: without_fragment(url),
            markdown,
            line_count,
        }
    }

    fn toc_from_filtered(&self, filtered: &str, url: &str, title: String) -> TocDocument {
        let headings = self.toc_filter.apply(collect_headings(filtered));
        let entries = number_headings(headings);
        debug!("TOC for {}: {} entr(ies)", url, entries.len());
        TocDocument {
            title,
            url: without_fragment(url),
            entries,
        }
    }
}
