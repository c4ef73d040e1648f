use crate::error::{Result, ScanError};
use crate::matcher::ScopeClass;
use crate::sensitive::SensitiveFinding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Lifecycle of a single URL inside a crawl.
///
/// ```text
/// Pending -> Fetching -> Fetched ----> ExtractionInline -> Done
///                     \          \---------------------> Done
///                      -> FetchFailed -----------------> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchState {
    Pending,
    Fetching,
    Fetched,
    FetchFailed,
    ExtractionInline,
    Done,
}

impl FetchState {
    pub fn can_transition_to(self, next: FetchState) -> bool {
        use FetchState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Fetched)
                | (Fetching, FetchFailed)
                | (Fetched, ExtractionInline)
                | (Fetched, Done)
                | (ExtractionInline, Done)
                | (FetchFailed, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == FetchState::Done
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchState::Pending => "pending",
            FetchState::Fetching => "fetching",
            FetchState::Fetched => "fetched",
            FetchState::FetchFailed => "fetch_failed",
            FetchState::ExtractionInline => "extraction_inline",
            FetchState::Done => "done",
        }
    }
}

/// Everything a worker learned about one URL. Owned by that worker until the
/// page processor has persisted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub url: String,
    pub depth: usize,
    pub discovered_from: Option<String>,
    pub scope_class: ScopeClass,
    pub status_code: u16,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub body: String,
    pub content_length: Option<u64>,
    pub response_time: Duration,
    pub links_found: Vec<String>,
    pub sensitive_findings: Vec<SensitiveFinding>,
    pub error: Option<String>,
    pub attempts: u32,
    pub state: FetchState,
}

impl ScanResult {
    pub fn new(url: String) -> Self {
        Self {
            url,
            depth: 0,
            discovered_from: None,
            scope_class: ScopeClass::Seed,
            status_code: 0,
            title: None,
            content_type: None,
            headers: BTreeMap::new(),
            body: String::new(),
            content_length: None,
            response_time: Duration::from_secs(0),
            links_found: Vec::new(),
            sensitive_findings: Vec::new(),
            error: None,
            attempts: 0,
            state: FetchState::Pending,
        }
    }

    pub fn transition(&mut self, next: FetchState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ScanError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200 && self.error.is_none()
    }

    pub fn is_html(&self) -> bool {
        match self.content_type {
            Some(ref ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            None => {
                let start = self.body.trim_start();
                start.starts_with("<!DOCTYPE")
                    || start.starts_with("<!doctype")
                    || start.starts_with("<html")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut result = ScanResult::new("https://docs.example.com/".to_string());
        assert!(result.transition(FetchState::Fetching).is_ok());
        assert!(result.transition(FetchState::Fetched).is_ok());
        assert!(result.transition(FetchState::ExtractionInline).is_ok());
        assert!(result.transition(FetchState::Done).is_ok());
        assert!(result.state.is_terminal());
    }

    #[test]
    fn test_failed_fetch_cannot_be_extracted() {
        let mut result = ScanResult::new("https://docs.example.com/".to_string());
        result.transition(FetchState::Fetching).unwrap();
        result.transition(FetchState::FetchFailed).unwrap();

        let err = result.transition(FetchState::ExtractionInline).unwrap_err();
        assert!(matches!(err, ScanError::IllegalTransition { .. }));
        assert!(result.transition(FetchState::Done).is_ok());
    }

    #[test]
    fn test_pending_cannot_skip_fetch() {
        let mut result = ScanResult::new("https://docs.example.com/".to_string());
        assert!(result.transition(FetchState::Fetched).is_err());
        assert_eq!(result.state, FetchState::Pending);
    }

    #[test]
    fn test_is_html_sniffs_body_without_content_type() {
        let mut result = ScanResult::new("https://docs.example.com/".to_string());
        result.body = "  <!DOCTYPE html><html></html>".to_string();
        assert!(result.is_html());

        result.content_type = Some("application/json".to_string());
        assert!(!result.is_html());
    }
}
