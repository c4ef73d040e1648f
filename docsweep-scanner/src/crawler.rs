use crate::concat::{ConcatMode, FuzzSettings, UrlConcatenator};
use crate::error::{Result, ScanError};
use crate::frontier::{Frontier, FrontierEntry, PushOutcome};
use crate::matcher::{
    DEFAULT_EXTENSION_BLACKLIST, ScopeClass, ScopeMode, UrlMatcher, host_of, normalize_url,
    strip_fragment,
};
use crate::result::{FetchState, ScanResult};
use crate::sensitive::{DangerFilter, SensitiveDetector};
use crate::stats::ScanStatistics;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{Html, Selector};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("static title selector"));

/// How many times a timed-out fetch is retried and how long to wait.
///
/// The wait before attempt `n + 1` is `backoff * n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_workers: usize,
    pub timeout: Duration,
    /// Pause a worker takes before each of its requests.
    pub delay: Duration,
    pub max_depth: usize,
    pub max_urls: usize,
    pub scope_mode: ScopeMode,
    pub whitelist_domains: Vec<String>,
    pub blacklist_domains: Vec<String>,
    pub extension_blacklist: Vec<String>,
    pub retry: RetryPolicy,
    pub headers: HashMap<String, String>,
    pub user_agent: String,
    pub concat_mode: ConcatMode,
    pub fuzz: FuzzSettings,
    pub danger_patterns: Vec<String>,
    pub danger_filter_enabled: bool,
    pub keep_fragments: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            timeout: Duration::from_secs(10),
            delay: Duration::ZERO,
            max_depth: 3,
            max_urls: 10_000,
            scope_mode: ScopeMode::MainDomainOnly,
            whitelist_domains: Vec::new(),
            blacklist_domains: Vec::new(),
            extension_blacklist: DEFAULT_EXTENSION_BLACKLIST
                .iter()
                .map(|e| e.to_string())
                .collect(),
            retry: RetryPolicy::default(),
            headers: HashMap::new(),
            user_agent: format!("docsweep/{}", env!("CARGO_PKG_VERSION")),
            concat_mode: ConcatMode::Standard,
            fuzz: FuzzSettings::default(),
            danger_patterns: Vec::new(),
            danger_filter_enabled: false,
            keep_fragments: false,
        }
    }
}

/// What the page processor did with one result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub extracted: bool,
    pub empty: bool,
}

/// Consumer of every settled URL, fetched or failed. Runs on the worker that
/// fetched the page, before the body is dropped. An error here stops the
/// whole crawl.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    async fn process(&self, result: &mut ScanResult) -> Result<ProcessOutcome>;
}

#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    pub statistics: ScanStatistics,
    pub external_links: Vec<String>,
    pub dangerous_links: Vec<String>,
}

/// Everything workers mutate, behind one lock.
struct CrawlState {
    frontier: Frontier,
    stats: ScanStatistics,
    external_links: BTreeSet<String>,
    dangerous_links: BTreeSet<String>,
    fatal: Option<String>,
}

struct Shared {
    client: Client,
    config: CrawlerConfig,
    matcher: UrlMatcher,
    concatenator: UrlConcatenator,
    danger: DangerFilter,
    processor: Option<Arc<dyn PageProcessor>>,
    progress_callback: Option<ProgressCallback>,
}

enum Work {
    Entry(FrontierEntry),
    Wait,
    Exit,
}

struct FetchedPage {
    status_code: u16,
    content_type: Option<String>,
    content_length: Option<u64>,
    headers: BTreeMap<String, String>,
    body: String,
    response_time: Duration,
}

pub struct Crawler {
    client: Client,
    config: CrawlerConfig,
    processor: Option<Arc<dyn PageProcessor>>,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            client,
            config,
            processor: None,
            progress_callback: None,
        })
    }

    pub fn with_processor(mut self, processor: Arc<dyn PageProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// The pooled client, shared with anything that needs to issue requests
    /// under the same connection pool and headers.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub async fn crawl(&self, seeds: &[String]) -> Result<CrawlSummary> {
        let started = Instant::now();

        let mut matcher = UrlMatcher::new(
            Vec::new(),
            self.config.blacklist_domains.clone(),
            self.config.whitelist_domains.clone(),
            self.config.extension_blacklist.clone(),
        );
        let mut frontier = Frontier::new(self.config.max_urls.max(1));

        for seed in seeds {
            match normalize_url(seed) {
                Some(url) => {
                    if let Some(host) = host_of(&url) {
                        matcher.add_seed_host(&host);
                    }
                    frontier.push(FrontierEntry::seed(url));
                }
                None => warn!("Skipping invalid seed URL {}", seed),
            }
        }

        if frontier.accepted() == 0 {
            return Err(ScanError::InvalidUrl("no valid seed URLs".to_string()));
        }

        let workers = self.config.max_workers.max(1);
        info!(
            "Starting crawl of {} seed(s) with {} workers (scope {}, depth {})",
            frontier.accepted(),
            workers,
            self.config.scope_mode.as_str(),
            self.config.max_depth
        );

        let state = Arc::new(Mutex::new(CrawlState {
            frontier,
            stats: ScanStatistics::default(),
            external_links: BTreeSet::new(),
            dangerous_links: BTreeSet::new(),
            fatal: None,
        }));

        let shared = Arc::new(Shared {
            client: self.client.clone(),
            config: self.config.clone(),
            matcher,
            concatenator: UrlConcatenator::new(self.config.fuzz.clone()),
            danger: DangerFilter::new(
                self.config.danger_patterns.clone(),
                self.config.danger_filter_enabled,
            ),
            processor: self.processor.clone(),
            progress_callback: self.progress_callback.clone(),
        });

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let shared = shared.clone();
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, shared, state).await;
            }));
        }

        for joined in futures::future::join_all(handles).await {
            joined?;
        }

        let mut state = state.lock().await;
        if let Some(reason) = state.fatal.take() {
            return Err(ScanError::Processor(reason));
        }

        state.stats.external_recorded = state.external_links.len();
        state.stats.elapsed = started.elapsed();

        info!(
            "Crawl complete. Scanned {} page(s), {} error(s)",
            state.stats.pages_scanned, state.stats.fetch_errors
        );

        Ok(CrawlSummary {
            statistics: state.stats.clone(),
            external_links: state.external_links.iter().cloned().collect(),
            dangerous_links: state.dangerous_links.iter().cloned().collect(),
        })
    }
}

fn build_client(config: &CrawlerConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Ignoring invalid header {}", name),
        }
    }

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;
    Ok(client)
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, state: Arc<Mutex<CrawlState>>) {
    debug!("Worker {} started", worker_id);

    loop {
        let work = {
            let mut state = state.lock().await;
            if state.fatal.is_some() {
                Work::Exit
            } else if let Some(entry) = state.frontier.pop() {
                Work::Entry(entry)
            } else if state.frontier.is_drained() {
                Work::Exit
            } else {
                Work::Wait
            }
        };

        let entry = match work {
            Work::Entry(entry) => entry,
            Work::Wait => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            Work::Exit => break,
        };

        if let Some(ref callback) = shared.progress_callback {
            callback(worker_id, entry.url.clone());
        }

        let outcome = process_entry(&shared, &state, entry).await;

        let mut state = state.lock().await;
        if let Err(e) = outcome {
            warn!("Worker {} stopping the crawl: {}", worker_id, e);
            if state.fatal.is_none() {
                state.fatal = Some(e.to_string());
            }
        }
        state.frontier.complete();
    }

    debug!("Worker {} finished", worker_id);
}

async fn process_entry(
    shared: &Shared,
    state: &Mutex<CrawlState>,
    entry: FrontierEntry,
) -> Result<()> {
    if !shared.config.delay.is_zero() {
        tokio::time::sleep(shared.config.delay).await;
    }

    let mut result = ScanResult::new(entry.url.clone());
    result.depth = entry.depth;
    result.discovered_from = entry.discovered_from.clone();
    result.scope_class = entry.scope_class;
    result.transition(FetchState::Fetching)?;

    let (fetched, attempts) =
        fetch_with_retry(&shared.client, &entry.url, &shared.config.retry).await;
    result.attempts = attempts;

    match fetched {
        Ok(page) => {
            result.status_code = page.status_code;
            result.content_type = page.content_type;
            result.content_length = page.content_length;
            result.headers = page.headers;
            result.response_time = page.response_time;
            result.body = page.body;
            if result.is_html() {
                result.title = page_title(&result.body);
            }
            result.transition(FetchState::Fetched)?;
        }
        Err(e) => {
            warn!("Fetch failed for {}: {}", entry.url, e);
            result.error = Some(e.to_string());
            result.transition(FetchState::FetchFailed)?;
        }
    }

    if result.state == FetchState::Fetched {
        result.sensitive_findings = SensitiveDetector::scan(&result.body);
        result.links_found = shared.matcher.extract_links(
            &result.body,
            &result.url,
            result.content_type.as_deref(),
            shared.config.keep_fragments,
            &shared.concatenator,
            shared.config.concat_mode,
        );

        let mut state = state.lock().await;
        enqueue_links(shared, &mut state, &entry, &result.links_found);
        state.stats.pages_scanned += 1;
        state.stats.bytes_downloaded += result.body.len() as u64;
        state.stats.sensitive_findings += result.sensitive_findings.len();
        state.stats.record_status(result.status_code);
    } else {
        state.lock().await.stats.fetch_errors += 1;
    }

    if let Some(ref processor) = shared.processor {
        let outcome = processor.process(&mut result).await?;
        let mut state = state.lock().await;
        if outcome.extracted {
            state.stats.pages_extracted += 1;
        }
        if outcome.empty {
            state.stats.extraction_empty += 1;
        }
    }

    if !result.state.is_terminal() {
        result.transition(FetchState::Done)?;
    }
    Ok(())
}

/// Applies danger, scope, depth and cap rules to the links of one page and
/// queues the survivors. Called with the state lock held.
fn enqueue_links(
    shared: &Shared,
    state: &mut CrawlState,
    entry: &FrontierEntry,
    links: &[String],
) {
    let config = &shared.config;
    let next_depth = entry.depth + 1;
    // External pages are a dead end when they may only be visited once.
    let may_recurse =
        !(config.scope_mode == ScopeMode::ExternalOnce && entry.scope_class == ScopeClass::External);

    for link in links {
        let link = if config.keep_fragments {
            link.clone()
        } else {
            strip_fragment(link)
        };

        if !shared.matcher.is_valid_candidate(&link) {
            state.stats.scope_rejected += 1;
            continue;
        }

        if shared.danger.is_dangerous(&link) {
            if state.dangerous_links.insert(link.clone()) {
                state.stats.dangerous_links += 1;
                warn!("Dangerous link flagged: {}", link);
            }
            if shared.danger.suppresses() {
                continue;
            }
        }

        let class = shared.matcher.classify(&link);
        if class == ScopeClass::External {
            state.external_links.insert(link.clone());
        }

        if !shared
            .matcher
            .is_in_scope(&link, config.scope_mode, shared.matcher.whitelist())
        {
            if class != ScopeClass::External {
                state.stats.scope_rejected += 1;
            }
            continue;
        }

        if !may_recurse {
            continue;
        }

        if next_depth > config.max_depth {
            if !state.frontier.has_seen(&link) {
                state.stats.depth_truncated += 1;
            }
            continue;
        }

        match state.frontier.push(FrontierEntry {
            url: link,
            depth: next_depth,
            discovered_from: Some(entry.url.clone()),
            scope_class: class,
        }) {
            PushOutcome::Queued => {}
            PushOutcome::Duplicate => state.stats.duplicates_skipped += 1,
            PushOutcome::CapReached => state.stats.cap_rejected += 1,
        }
    }
}

async fn fetch_with_retry(
    client: &Client,
    url: &str,
    retry: &RetryPolicy,
) -> (Result<FetchedPage>, u32) {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match fetch_once(client, url).await {
            Ok(page) => return (Ok(page), attempt),
            Err(e) if e.is_timeout() && attempt <= retry.max_retries => {
                debug!("Timeout on {} (attempt {}), retrying", url, attempt);
                tokio::time::sleep(retry.backoff * attempt).await;
            }
            Err(e) if e.is_timeout() => {
                return (
                    Err(ScanError::Timeout {
                        url: url.to_string(),
                        attempts: attempt,
                    }),
                    attempt,
                );
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}

async fn fetch_once(client: &Client, url: &str) -> Result<FetchedPage> {
    debug!("Fetching {}", url);

    let start = Instant::now();
    let response = client.get(url).send().await?;

    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let content_length = response.content_length();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

    let body = response.text().await?;

    Ok(FetchedPage {
        status_code,
        content_type,
        content_length,
        headers,
        body,
        response_time: start.elapsed(),
    })
}

/// Text of the `<title>` element with whitespace collapsed.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE_SELECTOR)
        .next()?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() { None } else { Some(title) }
}
