use docsweep_core::config::AppConfig;
use docsweep_core::extract::ExtractionMode;
use docsweep_core::filter::FilterConfig;
use docsweep_core::scan::UltimateUrlScanner;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!(
            "<html><head><title>{}</title></head><body><nav><a href=\"/\">Home</a></nav><main>{}</main></body></html>",
            title, body
        ),
        "text/html",
    )
}

async fn docs_site(expected_per_page: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page(
            "Home",
            r#"<h1>Welcome</h1><p>Start here.</p><a href="/guide">Guide</a><a href="/api">API</a>"#,
        ))
        .expect(expected_per_page)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/guide"))
        .respond_with(page(
            "Guide",
            r#"<h1 id="guide">Guide</h1><h2 id="setup">Setup</h2><p>Run the installer.</p><h2 id="next">Next steps</h2><p>Go on.</p>"#,
        ))
        .expect(expected_per_page)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(page("API", r#"<h1>API</h1><p>Endpoints.</p><a href="/guide">Guide again</a>"#))
        .expect(expected_per_page)
        .mount(&server)
        .await;
    server
}

fn config(root: &Path, inline: bool) -> AppConfig {
    AppConfig {
        max_workers: 3,
        timeout: 5.0,
        max_retries: 0,
        enable_inline_extraction: inline,
        mode: 3,
        output_dir: root.join("docs").to_string_lossy().into_owned(),
        results_dir: root.join("results").to_string_lossy().into_owned(),
        doc_name: "example".to_string(),
        doc_version: "1.0".to_string(),
        content_filter: FilterConfig {
            content_end_markers: vec!["Next steps".to_string()],
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Reads every document, with the server origin masked so runs against
/// different mock servers compare equal.
fn read_docs(root: &Path, origin: &str) -> Vec<(String, String)> {
    let base = root.join("docs").join("example:1.0");
    let mut files = Vec::new();
    for page in ["Home", "Guide", "API"] {
        for name in ["docContent.md", "docTOC.md"] {
            let path = base.join(page).join(name);
            let text = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("missing {}: {}", path.display(), e));
            files.push((format!("{}/{}", page, name), text.replace(origin, "<origin>")));
        }
    }
    files
}

#[tokio::test]
async fn test_inline_scan_fetches_each_page_once() {
    let server = docs_site(1).await;
    let dir = TempDir::new().unwrap();

    let scanner = UltimateUrlScanner::new(config(dir.path(), true), HashMap::new()).unwrap();
    let summary = scanner.scan(&[server.uri()]).await.unwrap();

    assert_eq!(summary.statistics.pages_scanned, 3);
    assert_eq!(summary.statistics.pages_extracted, 3);

    let guide = fs::read_to_string(dir.path().join("docs/example:1.0/Guide/docContent.md")).unwrap();
    assert!(guide.starts_with("> 原文链接: "));
    assert!(guide.contains("Run the installer."));
    assert!(!guide.contains("Go on."));
    assert!(!guide.contains("Home"));

    let toc = fs::read_to_string(dir.path().join("docs/example:1.0/Guide/docTOC.md")).unwrap();
    assert!(toc.starts_with("# Guide\n"));
    assert!(toc.contains("- 1. [Guide]("));
    assert!(toc.contains("#setup)"));

    let csv = fs::read_to_string(dir.path().join("results/scan_results.csv")).unwrap();
    assert_eq!(csv.lines().count(), 4, "header plus one row per page");
    assert!(csv.starts_with("url,status,title"));
    assert!(dir.path().join("results/output.out").exists());
}

#[tokio::test]
async fn test_legacy_path_refetches_and_matches_inline_output() {
    let inline_dir = TempDir::new().unwrap();
    let inline_docs = {
        let server = docs_site(1).await;
        let scanner = UltimateUrlScanner::new(config(inline_dir.path(), true), HashMap::new()).unwrap();
        scanner.scan(&[server.uri()]).await.unwrap();
        read_docs(inline_dir.path(), &server.uri())
    };

    let legacy_dir = TempDir::new().unwrap();
    let legacy_docs = {
        // Scan fetch plus one re-fetch for content and one for the TOC.
        let server = docs_site(3).await;
        let scanner = UltimateUrlScanner::new(config(legacy_dir.path(), false), HashMap::new()).unwrap();
        let summary = scanner.scan(&[server.uri()]).await.unwrap();
        assert_eq!(summary.statistics.pages_extracted, 3);
        read_docs(legacy_dir.path(), &server.uri())
    };

    assert_eq!(inline_docs, legacy_docs);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let server = docs_site(2).await;

    let scanner = UltimateUrlScanner::new(config(dir.path(), true), HashMap::new()).unwrap();
    scanner.scan(&[server.uri()]).await.unwrap();
    let first = read_docs(dir.path(), &server.uri());

    scanner.scan(&[server.uri()]).await.unwrap();
    let second = read_docs(dir.path(), &server.uri());

    assert_eq!(first, second);
}

/// Two pages titled "Docs" whose responses finish in the given order.
async fn twin_titles(a_delay: u64, b_delay: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Index", r#"<p>Index</p><a href="/a">A</a><a href="/b">B</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(page("Docs", "<p>Page A body.</p>").set_delay(Duration::from_millis(a_delay)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(page("Docs", "<p>Page B body.</p>").set_delay(Duration::from_millis(b_delay)))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_shared_title_directory_does_not_depend_on_latency() {
    let mut runs = Vec::new();
    for (a_delay, b_delay) in [(300, 0), (0, 300)] {
        let dir = TempDir::new().unwrap();
        let server = twin_titles(a_delay, b_delay).await;
        let scanner = UltimateUrlScanner::new(config(dir.path(), true), HashMap::new()).unwrap();
        scanner.scan(&[server.uri()]).await.unwrap();

        let docs = dir.path().join("docs/example:1.0");
        let suffixed: Vec<_> = fs::read_dir(&docs)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().is_some_and(|n| n.to_string_lossy().starts_with("Docs_")))
            .collect();
        assert_eq!(suffixed.len(), 1);

        let plain = fs::read_to_string(docs.join("Docs/docContent.md")).unwrap();
        let other = fs::read_to_string(suffixed[0].join("docContent.md")).unwrap();
        runs.push((
            plain.replace(&server.uri(), "<origin>"),
            other.replace(&server.uri(), "<origin>"),
        ));
    }

    assert!(runs[0].0.contains("Page A body."));
    assert!(runs[0].1.contains("Page B body."));
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_csv_only_mode_writes_no_documents() {
    let dir = TempDir::new().unwrap();
    let server = docs_site(1).await;

    let scanner = UltimateUrlScanner::new(
        AppConfig {
            mode: 0,
            ..config(dir.path(), true)
        },
        HashMap::new(),
    )
    .unwrap();
    let summary = scanner.scan(&[server.uri()]).await.unwrap();

    assert_eq!(summary.statistics.pages_scanned, 3);
    assert_eq!(summary.statistics.pages_extracted, 0);
    assert!(!dir.path().join("docs/example:1.0/Guide").exists());
    assert!(dir.path().join("results/scan_results.csv").exists());
}

#[tokio::test]
async fn test_non_200_pages_are_recorded_but_not_extracted() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", r#"<p>Hi</p><a href="/gone">gone</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_raw("<html><head><title>Gone</title></head></html>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let scanner = UltimateUrlScanner::new(config(dir.path(), true), HashMap::new()).unwrap();
    let summary = scanner.scan(&[server.uri()]).await.unwrap();

    assert_eq!(summary.statistics.pages_scanned, 2);
    assert_eq!(summary.statistics.pages_extracted, 1);
    assert!(!dir.path().join("docs/example:1.0/Gone").exists());

    let csv = fs::read_to_string(dir.path().join("results/scan_results.csv")).unwrap();
    assert!(csv.lines().any(|l| l.contains("/gone") && l.contains(",404,")));
}

#[tokio::test]
async fn test_extract_single_writes_one_page() {
    let dir = TempDir::new().unwrap();
    let server = docs_site(0).await;
    Mock::given(method("GET"))
        .and(path("/solo"))
        .respond_with(page("Solo", r#"<h1 id="solo">Solo</h1><p>Alone.</p><a href="/guide">Guide</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    let scanner = UltimateUrlScanner::new(config(dir.path(), true), HashMap::new()).unwrap();
    let files = scanner
        .extract_single(&format!("{}/solo", server.uri()), ExtractionMode::Combined)
        .await
        .unwrap();

    assert!(files.dir.ends_with("Solo"));
    let content = fs::read_to_string(files.content.unwrap()).unwrap();
    assert!(content.contains("Alone."));
    assert!(files.toc.is_some());
}

#[test]
fn test_scanner_rejects_bad_config_before_fetching() {
    let result = UltimateUrlScanner::new(
        AppConfig {
            mode: 9,
            ..Default::default()
        },
        HashMap::new(),
    );
    assert!(result.is_err());
}
