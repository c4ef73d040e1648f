mod bloom;
pub mod concat;
pub mod crawler;
pub mod error;
pub mod frontier;
pub mod matcher;
pub mod result;
pub mod sensitive;
pub mod stats;

pub use concat::{ConcatMode, FuzzSettings, ReferenceSource, UrlConcatenator};
pub use crawler::{
    CrawlSummary, Crawler, CrawlerConfig, PageProcessor, ProcessOutcome, ProgressCallback,
    RetryPolicy,
};
pub use error::ScanError;
pub use matcher::{ScopeClass, ScopeMode, UrlMatcher};
pub use result::{FetchState, ScanResult};
pub use sensitive::{DangerFilter, SensitiveDetector, SensitiveFinding};
pub use stats::ScanStatistics;
