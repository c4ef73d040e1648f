use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use docsweep_core::config::{AppConfig, load_config, load_headers};
use docsweep_core::extract::ExtractionMode;
use docsweep_core::filter::presets::{PRESETS, signatures_for};
use docsweep_core::report::{ReportFormat, generate_json_report, generate_scan_report, save_report};
use docsweep_core::scan::UltimateUrlScanner;
use docsweep_scanner::ProgressCallback;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_HEADERS_FILE: &str = "headers.json";

// Helper functions for the scan handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file. Blank lines and `#` comments are skipped.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = fs::read_to_string(&expanded)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some()
    {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Explicit path first, then `config.json` in the working directory, then defaults.
pub fn load_app_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Ok(load_config(Path::new(DEFAULT_CONFIG_FILE))?),
        None => {
            debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
            Ok(AppConfig::default())
        }
    }
}

pub fn load_optional_headers(path: Option<&PathBuf>) -> Result<HashMap<String, String>> {
    match path {
        Some(path) => Ok(load_headers(path)?),
        None if Path::new(DEFAULT_HEADERS_FILE).is_file() => Ok(load_headers(Path::new(DEFAULT_HEADERS_FILE))?),
        None => Ok(HashMap::new()),
    }
}

/// Command-line values that take precedence over `config.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub mode: Option<u8>,
    pub threads: Option<usize>,
    pub depth: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub no_inline: bool,
}

impl CliOverrides {
    /// Subcommands that lack an argument simply leave it unset.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            mode: matches.try_get_one::<u8>("mode").ok().flatten().copied(),
            threads: matches.try_get_one::<usize>("threads").ok().flatten().copied(),
            depth: matches.try_get_one::<usize>("depth").ok().flatten().copied(),
            output_dir: matches.try_get_one::<PathBuf>("output-dir").ok().flatten().cloned(),
            no_inline: matches
                .try_get_one::<bool>("no-inline")
                .ok()
                .flatten()
                .copied()
                .unwrap_or(false),
        }
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(threads) = self.threads {
            config.max_workers = threads;
        }
        if let Some(depth) = self.depth {
            config.max_depth = depth;
        }
        if let Some(ref dir) = self.output_dir {
            config.output_dir = dir.to_string_lossy().into_owned();
        }
        if self.no_inline {
            config.enable_inline_extraction = false;
        }
    }
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn spinner(quiet: bool) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    if quiet {
        spinner.set_draw_target(ProgressDrawTarget::hidden());
    }
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn doc_root(config: &AppConfig) -> PathBuf {
    config
        .output_dir()
        .join(format!("{}:{}", config.doc_name, config.doc_version))
}

pub async fn handle_scan(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let url = sub_matches.get_one::<Url>("url");
    let hosts_file = sub_matches.get_one::<PathBuf>("hosts-file");
    let urls = load_urls_from_source(url, hosts_file).map_err(anyhow::Error::msg)?;

    let mut config = load_app_config(sub_matches.get_one::<PathBuf>("config"))?;
    CliOverrides::from_matches(sub_matches).apply(&mut config);
    let headers = load_optional_headers(sub_matches.get_one::<PathBuf>("headers"))?;

    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let report_path = sub_matches.get_one::<PathBuf>("report");

    let scanner = UltimateUrlScanner::new(config.clone(), headers).context("Invalid configuration")?;

    if !quiet {
        println!();
        print_divider();
        println!("{}", "  DOCSWEEP SCAN".bright_white().bold());
        print_divider();
        println!("{} Start URLs: {}", "→".blue(), urls.len().to_string().bright_white());
        println!("{} Workers: {}", "→".blue(), config.max_workers.to_string().bright_white());
        println!("{} Max depth: {}", "→".blue(), config.max_depth.to_string().bright_white());
        println!("{} Mode: {}", "→".blue(), scanner.mode().as_str().bright_white());
        println!(
            "{} Extraction: {}",
            "→".blue(),
            if config.enable_inline_extraction { "inline" } else { "re-fetch" }.bright_white()
        );
        println!(
            "{} Documents: {}",
            "→".blue(),
            doc_root(&config).display().to_string().bright_white()
        );
        println!();
    }

    let spinner = spinner(quiet)?;
    spinner.set_message("Starting workers...");
    let processed = Arc::new(AtomicUsize::new(0));
    let progress_callback: ProgressCallback = {
        let spinner = spinner.clone();
        let processed = processed.clone();
        Arc::new(move |worker_id: usize, url: String| {
            let n = processed.fetch_add(1, Ordering::Relaxed) + 1;
            spinner.set_message(format!("[{}] worker {}: {}", n, worker_id, extract_url_path(&url)));
        })
    };

    let scanner = scanner.with_progress_callback(progress_callback);
    let outcome = scanner.scan(&urls).await;
    spinner.finish_and_clear();
    let summary = outcome.context("Scan failed")?;
    info!("Scan finished after {} page(s)", summary.statistics.pages_scanned);

    let report = match format {
        ReportFormat::Text => generate_scan_report(&summary),
        ReportFormat::Json => generate_json_report(&summary)?,
    };

    match report_path {
        Some(path) => {
            save_report(&report, path).with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                println!("{} Report saved to {}", "✓".green().bold(), path.display().to_string().bright_white());
            }
        }
        None => print!("{}", report),
    }

    if !quiet {
        println!("{} Scan complete!", "✓".green().bold());
        println!(
            "{} Results: {}",
            "✓".green().bold(),
            config.results_dir().display().to_string().bright_white()
        );
    }
    Ok(())
}

pub async fn handle_extract(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let url = sub_matches
        .get_one::<Url>("url")
        .context("--url is required")?;

    let mut config = load_app_config(sub_matches.get_one::<PathBuf>("config"))?;
    CliOverrides::from_matches(sub_matches).apply(&mut config);
    let headers = load_optional_headers(sub_matches.get_one::<PathBuf>("headers"))?;

    let scanner = UltimateUrlScanner::new(config, headers).context("Invalid configuration")?;
    // CSV-only makes no sense for a single page, so fall back to both documents.
    let mode = match scanner.mode() {
        ExtractionMode::CsvOnly => ExtractionMode::Combined,
        mode => mode,
    };

    let spinner = spinner(quiet)?;
    spinner.set_message(format!("Extracting {}", url));
    let outcome = scanner.extract_single(url.as_str(), mode).await;
    spinner.finish_and_clear();
    let files = outcome.with_context(|| format!("Extraction failed for {}", url))?;

    if !quiet {
        println!("{} Extracted {}", "✓".green().bold(), url.as_str().bright_white());
        if let Some(ref content) = files.content {
            println!("  {} {}", "•".blue(), content.display());
        }
        if let Some(ref toc) = files.toc {
            println!("  {} {}", "•".blue(), toc.display());
        }
    }
    Ok(())
}

pub fn handle_presets(sub_matches: &ArgMatches) -> Result<()> {
    if sub_matches.get_flag("json") {
        let presets: Vec<serde_json::Value> = PRESETS
            .iter()
            .map(|preset| {
                serde_json::json!({
                    "name": preset.name,
                    "signatures": signatures_for(preset.name),
                    "content_selectors": preset.content_selectors,
                    "exclude_selectors": preset.exclude_selectors,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }

    for preset in PRESETS {
        println!("{}", preset.name.bright_white().bold());
        println!(
            "  {} {}",
            "signatures:".blue(),
            signatures_for(preset.name).join(", ")
        );
        println!("  {} {}", "content:".blue(), preset.content_selectors.join(", "));
        println!("  {} {}", "exclude:".blue(), preset.exclude_selectors.join(", "));
        println!();
    }
    Ok(())
}
