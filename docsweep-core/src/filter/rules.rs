use crate::error::ConfigError;
use scraper::{ElementRef, Selector};

/// Removal stage a rule belongs to. Stages run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleStage {
    Semantic,
    General,
    Fuzzy,
    Protect,
}

impl RuleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStage::Semantic => "semantic",
            RuleStage::General => "general",
            RuleStage::Fuzzy => "fuzzy",
            RuleStage::Protect => "protect",
        }
    }
}

/// One compiled filtering rule.
#[derive(Debug, Clone)]
pub enum SelectorRule {
    SemanticTag { tag: String, selector: Selector },
    AriaRole { role: String, selector: Selector },
    Css { pattern: String, selector: Selector },
    /// Matches when the element's class or id contains the keyword,
    /// ignoring ASCII case.
    FuzzyKeyword(String),
    Preserve { pattern: String, selector: Selector },
}

pub(crate) fn parse_selector(pattern: &str) -> Result<Selector, ConfigError> {
    Selector::parse(pattern).map_err(|e| ConfigError::InvalidSelector {
        selector: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl SelectorRule {
    pub fn semantic_tag(tag: &str) -> Result<Self, ConfigError> {
        let tag = tag.trim().to_ascii_lowercase();
        Ok(SelectorRule::SemanticTag {
            selector: parse_selector(&tag)?,
            tag,
        })
    }

    pub fn aria_role(role: &str) -> Result<Self, ConfigError> {
        let role = role.trim().to_string();
        Ok(SelectorRule::AriaRole {
            selector: parse_selector(&format!("[role='{}']", role))?,
            role,
        })
    }

    pub fn css(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = pattern.trim().to_string();
        Ok(SelectorRule::Css {
            selector: parse_selector(&pattern)?,
            pattern,
        })
    }

    pub fn fuzzy(keyword: &str) -> Result<Self, ConfigError> {
        let keyword = keyword.trim().to_ascii_lowercase();
        if keyword.is_empty() {
            return Err(ConfigError::Invalid("empty fuzzy keyword".to_string()));
        }
        Ok(SelectorRule::FuzzyKeyword(keyword))
    }

    pub fn preserve(pattern: &str) -> Result<Self, ConfigError> {
        let pattern = pattern.trim().to_string();
        Ok(SelectorRule::Preserve {
            selector: parse_selector(&pattern)?,
            pattern,
        })
    }

    pub fn stage(&self) -> RuleStage {
        match self {
            SelectorRule::SemanticTag { .. } | SelectorRule::AriaRole { .. } => RuleStage::Semantic,
            SelectorRule::Css { .. } => RuleStage::General,
            SelectorRule::FuzzyKeyword(_) => RuleStage::Fuzzy,
            SelectorRule::Preserve { .. } => RuleStage::Protect,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            SelectorRule::SemanticTag { tag, .. } => tag,
            SelectorRule::AriaRole { role, .. } => role,
            SelectorRule::Css { pattern, .. } | SelectorRule::Preserve { pattern, .. } => pattern,
            SelectorRule::FuzzyKeyword(keyword) => keyword,
        }
    }

    pub fn matches(&self, element: &ElementRef) -> bool {
        match self {
            SelectorRule::SemanticTag { selector, .. }
            | SelectorRule::AriaRole { selector, .. }
            | SelectorRule::Css { selector, .. }
            | SelectorRule::Preserve { selector, .. } => selector.matches(element),
            SelectorRule::FuzzyKeyword(keyword) => {
                let value = element.value();
                value
                    .attr("class")
                    .into_iter()
                    .chain(value.id())
                    .any(|attr| attr.to_ascii_lowercase().contains(keyword.as_str()))
            }
        }
    }
}
