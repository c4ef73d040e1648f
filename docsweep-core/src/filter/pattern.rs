//! Compiles plain-text markers such as `"Next steps"` into tolerant,
//! case-sensitive regexes.
//!
//! Marker text is always escaped literally. What varies is the framing
//! around it:
//!
//! * [`PatternMode::MarkdownHeading`] matches a whole Markdown line, with an
//!   optional `#`..`######` heading prefix, an optional `6.` / `6.1` section
//!   number, optional emphasis markers and a trailing colon.
//! * [`PatternMode::PlainLine`] matches a whole plain string (a heading text
//!   or an anchor), with an optional section number. Runs of whitespace,
//!   `-` and `_` are interchangeable, so `Next steps` also matches
//!   `Next-steps`.

use crate::error::ConfigError;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    MarkdownHeading,
    PlainLine,
}

const NUMBER_PREFIX: &str = r"(?:\d+(?:\.\d+)*\.?[ \t]+)?";

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    mode: PatternMode,
    regex: Regex,
}

impl CompiledPattern {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> PatternMode {
        self.mode
    }

    /// Tests a single line (no embedded newlines expected).
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

pub fn compile_flexible(text: &str, mode: PatternMode) -> Result<CompiledPattern, ConfigError> {
    let separators: &[char] = match mode {
        PatternMode::MarkdownHeading => &[],
        PatternMode::PlainLine => &['-', '_'],
    };

    let words: Vec<String> = text
        .split(|c: char| c.is_whitespace() || separators.contains(&c))
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();

    if words.is_empty() {
        return Err(ConfigError::InvalidPattern {
            pattern: text.to_string(),
            reason: "marker text is empty".to_string(),
        });
    }

    let expr = match mode {
        PatternMode::MarkdownHeading => format!(
            r"^[ \t]*(?:#{{1,6}}[ \t]*)?{num}(?:\*\*|__)?{body}(?:\*\*|__)?[ \t]*:?[ \t]*$",
            num = NUMBER_PREFIX,
            body = words.join(r"[ \t]+"),
        ),
        PatternMode::PlainLine => format!(
            r"^[ \t]*{num}{body}[ \t]*$",
            num = NUMBER_PREFIX,
            body = words.join(r"[\s\-_]+"),
        ),
    };

    let regex = Regex::new(&expr).map_err(|e| ConfigError::InvalidPattern {
        pattern: text.to_string(),
        reason: e.to_string(),
    })?;

    Ok(CompiledPattern {
        source: text.to_string(),
        mode,
        regex,
    })
}

pub fn compile_all(texts: &[String], mode: PatternMode) -> Result<Vec<CompiledPattern>, ConfigError> {
    texts.iter().map(|t| compile_flexible(t, mode)).collect()
}
