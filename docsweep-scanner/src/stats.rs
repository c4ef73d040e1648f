use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Run-wide counters. Lives inside the crawl state lock; workers update it
/// as each URL settles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub pages_scanned: usize,
    pub pages_extracted: usize,
    pub fetch_errors: usize,
    pub bytes_downloaded: u64,
    pub duplicates_skipped: usize,
    pub scope_rejected: usize,
    pub external_recorded: usize,
    pub depth_truncated: usize,
    pub cap_rejected: usize,
    pub dangerous_links: usize,
    pub sensitive_findings: usize,
    pub extraction_empty: usize,
    pub status_counts: BTreeMap<u16, usize>,
    pub elapsed: Duration,
}

impl ScanStatistics {
    pub fn record_status(&mut self, status: u16) {
        *self.status_counts.entry(status).or_insert(0) += 1;
    }

    pub fn successful_pages(&self) -> usize {
        self.status_counts
            .iter()
            .filter(|(status, _)| (200..300).contains(*status))
            .map(|(_, count)| count)
            .sum()
    }

    /// Every URL that reached a terminal state, fetched or failed.
    pub fn total_processed(&self) -> usize {
        self.pages_scanned + self.fetch_errors
    }
}
