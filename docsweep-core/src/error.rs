use docsweep_scanner::ScanError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading or compiling configuration. All of these
/// surface before the first request is sent.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid merge_mode '{0}' (expected 'extend' or 'replace')")]
    InvalidMergeMode(String),

    #[error("Unknown documentation preset '{0}'")]
    UnknownPreset(String),

    #[error("Invalid scope_mode {0} (expected 0-3)")]
    InvalidScopeMode(u8),

    #[error("Invalid extraction mode {0} (expected 0-3)")]
    InvalidExtractionMode(u8),

    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while persisting results. These stop the crawl.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
