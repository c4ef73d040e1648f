use crate::config::AppConfig;
use crate::error::{ConfigError, CoreError, OutputError, Result};
use crate::extract::{ContentExtractor, ExtractionMode, ExtractionOutput, document_title};
use crate::filter::ContentFilter;
use crate::output::{OutputHandler, PageFiles};
use crate::toc::TocFilter;
use async_trait::async_trait;
use docsweep_scanner::crawler::page_title;
use docsweep_scanner::matcher::normalize_url;
use docsweep_scanner::{
    CrawlSummary, Crawler, CrawlerConfig, FetchState, PageProcessor, ProcessOutcome,
    ProgressCallback, ScanError, ScanResult,
};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn fatal(e: OutputError) -> ScanError {
    ScanError::Processor(e.to_string())
}

struct FetchedBody {
    status_code: u16,
    content_type: Option<String>,
    body: String,
}

async fn fetch_body(client: &Client, url: &str) -> std::result::Result<FetchedBody, ScanError> {
    let response = client.get(url).send().await?;
    let status_code = response.status().as_u16();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = response.text().await?;
    Ok(FetchedBody {
        status_code,
        content_type,
        body,
    })
}

/// Page processor that records every URL and extracts documents from
/// successful HTML pages.
pub struct ExtractionPipeline {
    extractor: ContentExtractor,
    output: Arc<OutputHandler>,
    mode: ExtractionMode,
    inline: bool,
    client: Client,
}

impl ExtractionPipeline {
    pub fn new(
        extractor: ContentExtractor,
        output: Arc<OutputHandler>,
        mode: ExtractionMode,
        inline: bool,
        client: Client,
    ) -> Self {
        Self {
            extractor,
            output,
            mode,
            inline,
            client,
        }
    }

    /// The older path: one extra request for the content document and one
    /// more for the TOC.
    async fn legacy_extract(&self, url: &str) -> Option<ExtractionOutput> {
        let mut output = ExtractionOutput::default();

        if self.mode.includes_content() {
            let body = self.refetch(url).await?;
            output.title = document_title(&body, url);
            output.content = Some(self.extractor.extract_content(&body, url));
        }
        if self.mode.includes_toc() {
            let body = self.refetch(url).await?;
            output.title = document_title(&body, url);
            output.toc = Some(self.extractor.extract_toc(&body, url));
        }
        Some(output)
    }

    async fn refetch(&self, url: &str) -> Option<String> {
        match fetch_body(&self.client, url).await {
            Ok(page) if page.status_code == 200 => Some(page.body),
            Ok(page) => {
                warn!("Re-fetch of {} returned {}", url, page.status_code);
                None
            }
            Err(e) => {
                warn!("Re-fetch of {} failed: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl PageProcessor for ExtractionPipeline {
    async fn process(&self, result: &mut ScanResult) -> docsweep_scanner::error::Result<ProcessOutcome> {
        self.output.record(result).map_err(fatal)?;

        if self.mode == ExtractionMode::CsvOnly
            || result.state != FetchState::Fetched
            || result.status_code != 200
            || !result.is_html()
        {
            return Ok(ProcessOutcome::default());
        }

        let output = if self.inline {
            result.transition(FetchState::ExtractionInline)?;
            self.extractor.extract_inline(result, self.mode)
        } else {
            match self.legacy_extract(&result.url).await {
                Some(output) => output,
                None => return Ok(ProcessOutcome::default()),
            }
        };

        let empty = output.content.as_ref().is_some_and(|c| c.is_empty());
        if empty {
            info!("Filtering left no content for {}", result.url);
        }
        self.output
            .write_documents(&output, &result.url)
            .map_err(fatal)?;

        Ok(ProcessOutcome {
            extracted: true,
            empty,
        })
    }
}

/// Wires configuration, crawler, extraction and output together for a run.
pub struct UltimateUrlScanner {
    config: AppConfig,
    crawler_config: CrawlerConfig,
    mode: ExtractionMode,
    extractor: ContentExtractor,
    progress_callback: Option<ProgressCallback>,
}

impl UltimateUrlScanner {
    pub fn new(config: AppConfig, headers: HashMap<String, String>) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let filter = Arc::new(ContentFilter::new(&config.content_filter)?);
        let toc_filter = Arc::new(TocFilter::new(&config.toc_url_filter)?);
        let crawler_config = config.crawler_config(headers)?;
        let mode = config.extraction_mode()?;

        debug!(
            "Scanner ready: mode {}, inline extraction {}",
            mode.as_str(),
            config.enable_inline_extraction
        );

        Ok(Self {
            extractor: ContentExtractor::new(filter, toc_filter),
            crawler_config,
            mode,
            config,
            progress_callback: None,
        })
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn extractor(&self) -> &ContentExtractor {
        &self.extractor
    }

    pub fn output_handler(&self) -> std::result::Result<OutputHandler, OutputError> {
        OutputHandler::new(
            &self.config.output_dir(),
            &self.config.results_dir(),
            &self.config.doc_name,
            &self.config.doc_version,
        )
    }

    pub async fn scan(&self, seeds: &[String]) -> Result<CrawlSummary> {
        let output = Arc::new(self.output_handler()?);
        let crawler = Crawler::new(self.crawler_config.clone())?;

        let pipeline = ExtractionPipeline::new(
            self.extractor.clone(),
            output.clone(),
            self.mode,
            self.config.enable_inline_extraction,
            crawler.client().clone(),
        );

        let mut crawler = crawler.with_processor(Arc::new(pipeline));
        if let Some(ref callback) = self.progress_callback {
            crawler = crawler.with_progress_callback(callback.clone());
        }

        info!(
            "Scanning {} seed(s), mode {} ({})",
            seeds.len(),
            self.mode.as_str(),
            if self.config.enable_inline_extraction { "inline" } else { "legacy" }
        );

        let summary = crawler.crawl(seeds).await?;
        output.settle_directories()?;
        Ok(summary)
    }

    /// Fetches one page once and writes its documents. No recursion, no CSV.
    pub async fn extract_single(&self, url: &str, mode: ExtractionMode) -> Result<PageFiles> {
        let url = normalize_url(url).ok_or_else(|| ScanError::InvalidUrl(url.to_string()))?;
        let crawler = Crawler::new(self.crawler_config.clone())?;
        let page = fetch_body(crawler.client(), &url).await?;

        if page.status_code != 200 {
            return Err(CoreError::Scan(ScanError::Other(format!(
                "{} returned HTTP {}",
                url, page.status_code
            ))));
        }

        let mut result = ScanResult::new(url.clone());
        result.status_code = page.status_code;
        result.content_type = page.content_type;
        result.title = page_title(&page.body);
        result.body = page.body;

        let output = self.extractor.extract_inline(&result, mode);
        let handler = self.output_handler()?;
        Ok(handler.write_documents(&output, &url)?)
    }
}
