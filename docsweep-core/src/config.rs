// config.json / headers.json loading

use crate::error::ConfigError;
use crate::extract::ExtractionMode;
use crate::filter::{ContentFilter, FilterConfig};
use crate::toc::{TocFilter, TocFilterConfig};
use docsweep_scanner::matcher::DEFAULT_EXTENSION_BLACKLIST;
use docsweep_scanner::{ConcatMode, CrawlerConfig, FuzzSettings, RetryPolicy, ScopeMode};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Accepts `true`/`false`, `0`/`1` and their string spellings.
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid flag value '{}'", other))),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scope_mode: u8,
    pub max_workers: usize,
    /// Seconds.
    pub timeout: f64,
    /// Seconds a worker waits before each request.
    pub delay: f64,
    pub max_depth: usize,
    pub max_urls: usize,
    pub max_retries: u32,
    /// Seconds; multiplied by the attempt number.
    pub retry_backoff: f64,
    pub user_agent: Option<String>,
    pub blacklist_domains: Vec<String>,
    pub whitelist_domains: Vec<String>,
    pub extension_blacklist: Vec<String>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub fuzz: bool,
    pub custom_base_url: Option<String>,
    pub path_route: Option<String>,
    pub api_route: Option<String>,
    pub danger_api_list: Vec<String>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub danger_filter_enabled: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub keep_fragments: bool,
    pub mode: u8,
    #[serde(deserialize_with = "deserialize_flag")]
    pub enable_inline_extraction: bool,
    pub output_dir: String,
    pub results_dir: String,
    pub doc_name: String,
    pub doc_version: String,
    pub content_filter: FilterConfig,
    pub toc_url_filter: TocFilterConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scope_mode: 0,
            max_workers: 10,
            timeout: 10.0,
            delay: 0.0,
            max_depth: 3,
            max_urls: 10_000,
            max_retries: 2,
            retry_backoff: 0.5,
            user_agent: None,
            blacklist_domains: Vec::new(),
            whitelist_domains: Vec::new(),
            extension_blacklist: DEFAULT_EXTENSION_BLACKLIST
                .iter()
                .map(|e| e.to_string())
                .collect(),
            fuzz: false,
            custom_base_url: None,
            path_route: None,
            api_route: None,
            danger_api_list: Vec::new(),
            danger_filter_enabled: false,
            keep_fragments: false,
            mode: 3,
            enable_inline_extraction: true,
            output_dir: "docs".to_string(),
            results_dir: "results".to_string(),
            doc_name: "docs".to_string(),
            doc_version: "latest".to_string(),
            content_filter: FilterConfig::default(),
            toc_url_filter: TocFilterConfig::default(),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn seconds(value: f64, key: &str) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!("{} must be a non-negative number", key)));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::Invalid(format!("{} of {} seconds is out of range: {}", key, value, e)))
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let path = expand(&path.to_string_lossy());
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: AppConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Flat `{"Header-Name": "value"}` object.
pub fn load_headers(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let path = expand(&path.to_string_lossy());
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let headers: HashMap<String, String> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
    debug!("Loaded {} custom header(s)", headers.len());
    Ok(headers)
}

impl AppConfig {
    pub fn scope(&self) -> Result<ScopeMode, ConfigError> {
        ScopeMode::try_from(self.scope_mode).map_err(|_| ConfigError::InvalidScopeMode(self.scope_mode))
    }

    pub fn extraction_mode(&self) -> Result<ExtractionMode, ConfigError> {
        ExtractionMode::try_from(self.mode)
    }

    pub fn output_dir(&self) -> PathBuf {
        expand(&self.output_dir)
    }

    pub fn results_dir(&self) -> PathBuf {
        expand(&self.results_dir)
    }

    /// Runs every compile step so mistakes surface before the first fetch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scope()?;
        self.extraction_mode()?;
        seconds(self.timeout, "timeout")?;
        seconds(self.delay, "delay")?;
        seconds(self.retry_backoff, "retry_backoff")?;
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".to_string()));
        }
        if self.timeout == 0.0 {
            return Err(ConfigError::Invalid("timeout must be greater than zero".to_string()));
        }
        if self.scope()? == ScopeMode::Whitelist && self.whitelist_domains.is_empty() {
            return Err(ConfigError::Invalid(
                "scope_mode 3 requires at least one whitelist domain".to_string(),
            ));
        }
        if self.doc_name.trim().is_empty() || self.doc_version.trim().is_empty() {
            return Err(ConfigError::Invalid("doc_name and doc_version must not be empty".to_string()));
        }
        ContentFilter::new(&self.content_filter)?;
        TocFilter::new(&self.toc_url_filter)?;
        Ok(())
    }

    pub fn crawler_config(&self, headers: HashMap<String, String>) -> Result<CrawlerConfig, ConfigError> {
        let defaults = CrawlerConfig::default();
        Ok(CrawlerConfig {
            max_workers: self.max_workers.max(1),
            timeout: seconds(self.timeout, "timeout")?,
            delay: seconds(self.delay, "delay")?,
            max_depth: self.max_depth,
            max_urls: self.max_urls,
            scope_mode: self.scope()?,
            whitelist_domains: self.whitelist_domains.clone(),
            blacklist_domains: self.blacklist_domains.clone(),
            extension_blacklist: self.extension_blacklist.clone(),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff: seconds(self.retry_backoff, "retry_backoff")?,
            },
            headers,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            concat_mode: if self.fuzz { ConcatMode::Fuzz } else { ConcatMode::Standard },
            fuzz: FuzzSettings {
                custom_base_url: self.custom_base_url.clone(),
                path_route: self.path_route.clone(),
                api_route: self.api_route.clone(),
            },
            danger_patterns: self.danger_api_list.clone(),
            danger_filter_enabled: self.danger_filter_enabled,
            keep_fragments: self.keep_fragments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"max_depth": 5}"#).unwrap();
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.mode, 3);
        assert!(config.enable_inline_extraction);
    }

    #[test]
    fn test_flags_accept_ints_and_bools() {
        let config: AppConfig = serde_json::from_str(
            r#"{"enable_inline_extraction": 0, "fuzz": 1, "danger_filter_enabled": "yes", "keep_fragments": true}"#,
        )
        .unwrap();
        assert!(!config.enable_inline_extraction);
        assert!(config.fuzz);
        assert!(config.danger_filter_enabled);
        assert!(config.keep_fragments);

        assert!(serde_json::from_str::<AppConfig>(r#"{"fuzz": "maybe"}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_scope = AppConfig { scope_mode: 9, ..Default::default() };
        assert!(matches!(bad_scope.validate(), Err(ConfigError::InvalidScopeMode(9))));

        let bad_mode = AppConfig { mode: 4, ..Default::default() };
        assert!(matches!(bad_mode.validate(), Err(ConfigError::InvalidExtractionMode(4))));

        let mut bad_merge = AppConfig::default();
        bad_merge.content_filter.merge_mode = "append".to_string();
        assert!(matches!(bad_merge.validate(), Err(ConfigError::InvalidMergeMode(_))));

        let mut bad_selector = AppConfig::default();
        bad_selector.content_filter.non_content_selectors = vec!["div[[".to_string()];
        assert!(matches!(bad_selector.validate(), Err(ConfigError::InvalidSelector { .. })));

        let whitelist_without_domains = AppConfig { scope_mode: 3, ..Default::default() };
        assert!(matches!(whitelist_without_domains.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_huge_durations_are_rejected_not_panicking() {
        let config: AppConfig = serde_json::from_str(r#"{"timeout": 1e30}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("timeout")));
        assert!(config.crawler_config(HashMap::new()).is_err());

        let negative = AppConfig { delay: -1.0, ..Default::default() };
        assert!(matches!(negative.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_crawler_config_mapping() {
        let config = AppConfig {
            scope_mode: 2,
            timeout: 2.5,
            delay: 0.25,
            fuzz: true,
            api_route: Some("/api/{path}".to_string()),
            ..Default::default()
        };
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());

        let crawler = config.crawler_config(headers).unwrap();
        assert_eq!(crawler.scope_mode, ScopeMode::Unlimited);
        assert_eq!(crawler.timeout, Duration::from_millis(2500));
        assert_eq!(crawler.delay, Duration::from_millis(250));
        assert_eq!(crawler.concat_mode, ConcatMode::Fuzz);
        assert_eq!(crawler.fuzz.api_route.as_deref(), Some("/api/{path}"));
        assert_eq!(crawler.headers.get("Authorization").map(String::as_str), Some("Bearer t"));
        assert_eq!(crawler.retry.max_retries, 2);
    }
}
