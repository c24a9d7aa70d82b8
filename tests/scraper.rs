//! DeepScraper integration tests against a local mock HTTP server.

use httpmock::prelude::*;

use quillweave::article::SearchResult;
use quillweave::knowledge::DeepScraper;

fn result(url: &str) -> SearchResult {
    SearchResult {
        title: "page".into(),
        url: url.into(),
        content: String::new(),
        source: "test".into(),
        source_type: "web".into(),
    }
}

#[tokio::test]
async fn reader_endpoint_is_preferred() {
    let server = MockServer::start_async().await;
    let reader = server
        .mock_async(|when, then| {
            when.method(GET).path("/reader/http://target.test/article");
            then.status(200).body("# Markdown from reader\n\nbody text");
        })
        .await;

    let scraper = DeepScraper::new()
        .with_reader_base(format!("{}/reader/", server.base_url()))
        .with_top_n(1);
    let pages = scraper
        .scrape_top_n(&[result("http://target.test/article")], "rust")
        .await;

    reader.assert_async().await;
    assert_eq!(pages.len(), 1);
    assert!(pages[0].content.contains("Markdown from reader"));
}

#[tokio::test]
async fn falls_back_to_direct_fetch_when_reader_fails() {
    let server = MockServer::start_async().await;
    // Reader endpoint always errors.
    let reader_path = format!("/reader/{}", server.url("/article"));
    server
        .mock_async(|when, then| {
            when.method(GET).path(reader_path);
            then.status(500);
        })
        .await;
    let direct = server
        .mock_async(|when, then| {
            when.method(GET).path("/article");
            then.status(200)
                .body("<html><body><h1>Direct</h1><p>fallback body</p></body></html>");
        })
        .await;

    let scraper = DeepScraper::new()
        .with_reader_base(format!("{}/reader/", server.base_url()))
        .with_top_n(1);
    let page = scraper.fetch(&server.url("/article")).await;

    direct.assert_async().await;
    let text = page.expect("fallback should succeed");
    assert!(text.contains("Direct"));
    assert!(text.contains("fallback body"));
    assert!(!text.contains("<p>"));
}

#[tokio::test]
async fn content_is_truncated_to_max_chars() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reader/http://target.test/long");
            then.status(200).body("x".repeat(10_000));
        })
        .await;

    let scraper = DeepScraper::new()
        .with_reader_base(format!("{}/reader/", server.base_url()))
        .with_top_n(1)
        .with_max_chars(500);
    let pages = scraper
        .scrape_top_n(&[result("http://target.test/long")], "rust")
        .await;
    assert_eq!(pages.len(), 1);
    assert!(pages[0].content.chars().count() <= 503);
}
