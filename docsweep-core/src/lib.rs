pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod markdown;
pub mod output;
pub mod report;
pub mod scan;
pub mod toc;

pub use config::{AppConfig, load_config, load_headers};
pub use error::{ConfigError, CoreError, OutputError};
pub use extract::{ContentExtractor, ExtractionMode, ExtractionOutput};
pub use filter::{ContentFilter, FilterConfig, MergeMode};
pub use markdown::MarkdownConverter;
pub use output::OutputHandler;
pub use report::{ReportFormat, generate_json_report, generate_scan_report};
pub use scan::{ExtractionPipeline, UltimateUrlScanner};
