// Run report from crawl statistics

use docsweep_scanner::CrawlSummary;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

pub fn generate_scan_report(summary: &CrawlSummary) -> String {
    let stats = &summary.statistics;
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                           DOCSWEEP SCAN REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Duration:          {:.2}s\n", stats.elapsed.as_secs_f64()));
    report.push_str(&format!("URLs processed:    {}\n", stats.total_processed()));
    report.push_str(&format!("Pages scanned:     {}\n", stats.pages_scanned));
    report.push_str(&format!("Successful (2xx):  {}\n", stats.successful_pages()));
    report.push_str(&format!("Pages extracted:   {}\n", stats.pages_extracted));
    report.push_str(&format!("Empty extractions: {}\n", stats.extraction_empty));
    report.push_str(&format!("Fetch errors:      {}\n", stats.fetch_errors));
    report.push_str(&format!("Bytes downloaded:  {}\n", stats.bytes_downloaded));
    report.push('\n');

    report.push_str(&format!("Duplicates skipped:   {}\n", stats.duplicates_skipped));
    report.push_str(&format!("Out of scope:         {}\n", stats.scope_rejected));
    report.push_str(&format!("Beyond max depth:     {}\n", stats.depth_truncated));
    report.push_str(&format!("Beyond URL cap:       {}\n", stats.cap_rejected));
    report.push_str(&format!("Sensitive findings:   {}\n", stats.sensitive_findings));
    report.push('\n');

    if !stats.status_counts.is_empty() {
        report.push_str(RULE);
        report.push_str("STATUS CODES\n");
        report.push_str(RULE);
        report.push('\n');
        for (status, count) in &stats.status_counts {
            report.push_str(&format!("  {}  {}\n", status, count));
        }
        report.push('\n');
    }

    if !summary.external_links.is_empty() {
        report.push_str(RULE);
        report.push_str(&format!("EXTERNAL LINKS ({})\n", summary.external_links.len()));
        report.push_str(RULE);
        report.push('\n');
        for link in &summary.external_links {
            report.push_str(&format!("  {}\n", link));
        }
        report.push('\n');
    }

    if !summary.dangerous_links.is_empty() {
        report.push_str(RULE);
        report.push_str(&format!("DANGEROUS LINKS ({})\n", summary.dangerous_links.len()));
        report.push_str(RULE);
        report.push('\n');
        for link in &summary.dangerous_links {
            report.push_str(&format!("  [!] {}\n", link));
        }
        report.push('\n');
    }

    report
}

pub fn generate_json_report(summary: &CrawlSummary) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "docsweep",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
            },
            "statistics": summary.statistics,
            "external_links": summary.external_links,
            "dangerous_links": summary.dangerous_links,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
