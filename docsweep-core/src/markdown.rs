use regex::Regex;
use std::sync::LazyLock;

static HEADING_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(#{1,6})[ \t]*\n(?:[ \t]*\n)*[ \t]*([^\s#])").expect("static heading regex")
});
static HEADING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]{2,}").expect("static heading regex"));
static SETEXT_UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]{0,3}(=+|-+)[ \t]*$").expect("static underline regex"));

fn is_invisible(c: char) -> bool {
    matches!(c,
        '\u{00AD}'
        | '\u{180E}'
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2064}'
        | '\u{2066}'..='\u{2069}'
        | '\u{FEFF}'
    ) || (c.is_control() && c != '\n' && c != '\t')
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Splits `text` into consecutive runs of lines, flagged `true` for fenced
/// code (fence lines included) and `false` for prose.
fn fenced_segments(text: &str) -> Vec<(bool, Vec<&str>)> {
    let mut segments: Vec<(bool, Vec<&str>)> = Vec::new();
    let mut in_fence = false;
    for line in text.split('\n') {
        let fence = is_fence(line);
        let code = in_fence || fence;
        if let Some((is_code, lines)) = segments.last_mut()
            && *is_code == code
        {
            lines.push(line);
        } else {
            segments.push((code, vec![line]));
        }
        if fence {
            in_fence = !in_fence;
        }
    }
    segments
}

/// Heading repair, trailing whitespace and blank-line collapsing for prose.
fn normalize_prose(lines: &[&str], out: &mut Vec<String>) {
    let text = lines.join("\n");
    let text = HEADING_SPLIT.replace_all(&text, "$1 $2");
    let text = HEADING_SPACE.replace_all(&text, "$1 ");
    for line in text.split('\n') {
        let line = line.trim_end();
        if line.is_empty() && out.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        out.push(line.to_string());
    }
}

/// Rewrites `Title\n=====` / `Title\n-----` headings as `#` / `##` lines.
fn atx_headings(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_fence = false;
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();
        if is_fence(line) {
            in_fence = !in_fence;
        } else if !in_fence
            && !trimmed.is_empty()
            && !trimmed.starts_with(['#', '-', '*', '>', '|'])
            && let Some(next) = lines.get(i + 1)
            && let Some(caps) = SETEXT_UNDERLINE.captures(next)
        {
            let marker = if caps[1].starts_with('=') { "#" } else { "##" };
            out.push(format!("{} {}", marker, line.trim()));
            i += 2;
            continue;
        }
        out.push(line.to_string());
        i += 1;
    }
    out.join("\n")
}

/// HTML to Markdown via `html2md`, followed by a normalization pass that
/// keeps headings on one line so later heading matching works.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownConverter;

impl MarkdownConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn convert(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }
        let raw = html2md::parse_html(html);
        self.cleanup(&raw)
    }

    pub fn cleanup(&self, markdown: &str) -> String {
        let text: String = markdown
            .replace("\r\n", "\n")
            .chars()
            .filter(|c| !is_invisible(*c))
            .collect();

        let text = atx_headings(&text);
        let mut out: Vec<String> = Vec::new();
        for (code, lines) in fenced_segments(&text) {
            if code {
                out.extend(lines.iter().map(|l| l.to_string()));
            } else {
                normalize_prose(&lines, &mut out);
            }
        }

        out.join("\n").trim().to_string()
    }
}
