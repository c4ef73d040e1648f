use crate::error::OutputError;
use crate::extract::ExtractionOutput;
use docsweep_scanner::ScanResult;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub const CONTENT_FILE: &str = "docContent.md";
pub const TOC_FILE: &str = "docTOC.md";
pub const CSV_FILE: &str = "scan_results.csv";
pub const LOG_FILE: &str = "output.out";

const CSV_HEADER: &[&str] = &[
    "url",
    "status",
    "title",
    "content_type",
    "content_length",
    "elapsed_ms",
    "depth",
    "scope",
    "discovered_from",
    "sensitive",
    "error",
];

const MAX_TITLE_CHARS: usize = 100;

/// Paths written for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFiles {
    pub dir: PathBuf,
    pub content: Option<PathBuf>,
    pub toc: Option<PathBuf>,
}

struct ResultLog {
    csv: csv::Writer<File>,
    out: File,
}

/// Page directories handed out during a run.
#[derive(Default)]
struct DirClaims {
    /// Directory name to the URL that owns it.
    owners: HashMap<String, String>,
    /// Sanitized title to every URL that carried it and its current directory.
    by_title: HashMap<String, BTreeMap<String, String>>,
}

impl DirClaims {
    fn place(&mut self, name: &str, url: &str, dir_name: &str) {
        self.owners.insert(dir_name.to_string(), url.to_string());
        self.by_title
            .entry(name.to_string())
            .or_default()
            .insert(url.to_string(), dir_name.to_string());
    }
}

/// Persists per-page documents and the run-wide CSV/log files.
pub struct OutputHandler {
    doc_root: PathBuf,
    results_dir: PathBuf,
    claims: Mutex<DirClaims>,
    log: Mutex<ResultLog>,
}

/// Directory-safe form of a page title.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => ' ',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// FNV-1a, stable across runs and toolchains.
fn url_hash(url: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in url.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{:016x}", hash)[..8].to_string()
}

fn suffixed_dir(name: &str, url: &str) -> String {
    format!("{}_{}", name, url_hash(url))
}

/// Writes `contents` to a temp file beside `path`, then renames it over
/// `path`, so readers never see a partial file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), OutputError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl OutputHandler {
    pub fn new(
        output_dir: &Path,
        results_dir: &Path,
        doc_name: &str,
        doc_version: &str,
    ) -> Result<Self, OutputError> {
        let doc_root = output_dir.join(format!("{}:{}", doc_name.trim(), doc_version.trim()));
        fs::create_dir_all(&doc_root)?;
        fs::create_dir_all(results_dir)?;

        let csv_path = results_dir.join(CSV_FILE);
        let needs_header = fs::metadata(&csv_path).map(|m| m.len() == 0).unwrap_or(true);
        let csv_file = OpenOptions::new().create(true).append(true).open(&csv_path)?;
        let mut csv = csv::Writer::from_writer(csv_file);
        if needs_header {
            csv.write_record(CSV_HEADER)?;
            csv.flush()?;
        }

        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(results_dir.join(LOG_FILE))?;

        info!("Writing documents under {}", doc_root.display());

        Ok(Self {
            doc_root,
            results_dir: results_dir.to_path_buf(),
            claims: Mutex::new(DirClaims::default()),
            log: Mutex::new(ResultLog { csv, out }),
        })
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Directory for a page while the crawl runs. The first URL to claim a
    /// title gets the plain name; any other URL with the same title gets a
    /// URL-hash suffix. [`settle_directories`](Self::settle_directories)
    /// makes the final assignment independent of which page finished first.
    pub fn page_dir(&self, title: &str, url: &str) -> PathBuf {
        let name = sanitize_title(title);
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let dir_name = match claims.owners.get(&name) {
            None => name.clone(),
            Some(owner) if owner == url => name.clone(),
            Some(_) => {
                let suffixed = suffixed_dir(&name, url);
                debug!("Title '{}' already taken, using '{}' for {}", name, suffixed, url);
                suffixed
            }
        };
        claims.place(&name, url, &dir_name);
        self.doc_root.join(dir_name)
    }

    /// Gives every shared title's plain directory to the lexicographically
    /// smallest URL that carried it, moving the others to their hash-suffixed
    /// names. Call once all documents are written. Returns the number of
    /// directories moved.
    pub fn settle_directories(&self) -> Result<usize, OutputError> {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let shared: Vec<(String, BTreeMap<String, String>)> = claims
            .by_title
            .iter()
            .filter(|(_, urls)| urls.len() > 1)
            .map(|(name, urls)| (name.clone(), urls.clone()))
            .collect();

        let mut moved = 0;
        for (name, urls) in shared {
            let Some((winner, winner_dir)) = urls.iter().next() else {
                continue;
            };
            if *winner_dir == name {
                continue;
            }

            if let Some((holder, _)) = urls.iter().find(|(url, dir)| **dir == name && *url != winner) {
                let target = suffixed_dir(&name, holder);
                moved += self.move_dir(&name, &target)?;
                claims.place(&name, holder, &target);
            }
            moved += self.move_dir(winner_dir, &name)?;
            claims.owners.remove(winner_dir);
            claims.place(&name, winner, &name);
            debug!("'{}' now holds {}", name, winner);
        }

        if moved > 0 {
            info!("Moved {} page directories for shared titles", moved);
        }
        Ok(moved)
    }

    /// Replaces `to` with `from` under the document root.
    fn move_dir(&self, from: &str, to: &str) -> Result<usize, OutputError> {
        let from = self.doc_root.join(from);
        let to = self.doc_root.join(to);
        if !from.is_dir() {
            return Ok(0);
        }
        if to.is_dir() {
            fs::remove_dir_all(&to)?;
        }
        fs::rename(&from, &to)?;
        Ok(1)
    }

    pub fn write_documents(&self, output: &ExtractionOutput, url: &str) -> Result<PageFiles, OutputError> {
        let dir = self.page_dir(&output.title, url);
        let mut files = PageFiles {
            dir: dir.clone(),
            ..Default::default()
        };

        if let Some(ref content) = output.content {
            let path = dir.join(CONTENT_FILE);
            write_atomic(&path, &content.render())?;
            files.content = Some(path);
        }
        if let Some(ref toc) = output.toc {
            let path = dir.join(TOC_FILE);
            write_atomic(&path, &toc.render())?;
            files.toc = Some(path);
        }

        debug!("Wrote documents for {} to {}", url, dir.display());
        Ok(files)
    }

    /// Appends the CSV row and `output.out` lines for one settled URL.
    pub fn record(&self, result: &ScanResult) -> Result<(), OutputError> {
        let sensitive = result
            .sensitive_findings
            .iter()
            .map(|f| f.kind.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let row = [
            result.url.clone(),
            result.status_code.to_string(),
            result.title.clone().unwrap_or_default(),
            result.content_type.clone().unwrap_or_default(),
            result
                .content_length
                .unwrap_or(result.body.len() as u64)
                .to_string(),
            result.response_time.as_millis().to_string(),
            result.depth.to_string(),
            result.scope_class.as_str().to_string(),
            result.discovered_from.clone().unwrap_or_default(),
            sensitive,
            result.error.clone().unwrap_or_default(),
        ];

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut lines = match result.error {
            Some(ref error) => format!("[{}] ERROR {} {}\n", timestamp, result.url, error),
            None => format!(
                "[{}] {} {} {}\n",
                timestamp,
                result.status_code,
                result.url,
                result.title.as_deref().unwrap_or("-")
            ),
        };
        for finding in &result.sensitive_findings {
            lines.push_str(&format!(
                "[{}]   [sensitive:{}] {} {} @ {}\n",
                timestamp,
                finding.severity.as_str(),
                finding.kind.as_str(),
                finding.value,
                result.url
            ));
        }

        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.csv.write_record(&row)?;
        log.csv.flush()?;
        log.out.write_all(lines.as_bytes())?;
        log.out.flush()?;
        Ok(())
    }
}
