//! Deep scraping of top search hits.
//!
//! Two fetch layers: a reader API that returns markdown (retried with
//! exponential backoff), then a direct HTTP fallback with browser-like
//! headers and HTML-to-text extraction. Fetched pages are optionally run
//! through an LLM extractor constrained by the research topic. Known
//! content-farm domains are skipped before any fetch.

use std::time::Duration;

use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

use crate::article::SearchResult;
use crate::llm::{ChatRequest, TieredLlm};
use crate::utils::text::truncate_chars;

const LOW_QUALITY_DOMAINS: &[&str] = &[
    "csdn.net",
    "jianshu.com",
    "360doc.com",
    "baijiahao.baidu.com",
    "sohu.com",
    "163.com",
    "toutiao.com",
    "zhidao.baidu.com",
    "wenku.baidu.com",
];

const READER_MAX_RETRIES: u32 = 4;
const FALLBACK_MAX_RETRIES: u32 = 3;
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One scraped page with the extracted material.
#[derive(Clone, Debug)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub content: String,
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
    })
}

/// Plain-text extraction from an HTML document.
fn html_to_text(html: &str) -> String {
    let without_scripts = script_style_re().replace_all(html, " ");
    let document = Html::parse_document(&without_scripts);
    let text: Vec<&str> = document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    text.join(" ")
}

fn domain_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = rest.split('/').next().unwrap_or(rest);
    host.strip_prefix("www.").unwrap_or(host)
}

/// Deep scraper entry point.
pub struct DeepScraper {
    client: reqwest::Client,
    /// Reader endpoint prefix; the target URL is appended.
    reader_base: String,
    extractor: Option<TieredLlm>,
    top_n: usize,
    max_chars: usize,
}

impl DeepScraper {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        DeepScraper {
            client,
            reader_base: "https://r.jina.ai/".to_string(),
            extractor: None,
            top_n: 3,
            max_chars: 6000,
        }
    }

    #[must_use]
    pub fn with_reader_base(mut self, base: impl Into<String>) -> Self {
        self.reader_base = base.into();
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, llm: TieredLlm) -> Self {
        self.extractor = Some(llm);
        self
    }

    #[must_use]
    pub fn with_top_n(mut self, n: usize) -> Self {
        self.top_n = n.max(1);
        self
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Scrape the top-N non-blacklisted URLs and return extracted pages.
    pub async fn scrape_top_n(&self, results: &[SearchResult], topic: &str) -> Vec<ScrapedPage> {
        let mut pages = Vec::new();
        let selected = results
            .iter()
            .filter(|r| !r.url.is_empty())
            .filter(|r| {
                let domain = domain_of(&r.url);
                let blacklisted = LOW_QUALITY_DOMAINS.iter().any(|d| domain.ends_with(d));
                if blacklisted {
                    tracing::debug!(url = %r.url, "skipping low-quality domain");
                }
                !blacklisted
            })
            .take(self.top_n);

        for result in selected {
            let Some(raw) = self.fetch(&result.url).await else {
                continue;
            };
            let content = match &self.extractor {
                Some(llm) => self
                    .extract_with_llm(llm, &raw, topic)
                    .await
                    .unwrap_or_else(|| truncate_chars(&raw, self.max_chars)),
                None => truncate_chars(&raw, self.max_chars),
            };
            pages.push(ScrapedPage {
                url: result.url.clone(),
                title: result.title.clone(),
                content,
            });
        }
        pages
    }

    /// Reader API first, direct HTTP as fallback.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        if let Some(text) = self.fetch_via_reader(url).await {
            return Some(text);
        }
        self.fetch_direct(url).await
    }

    async fn fetch_via_reader(&self, url: &str) -> Option<String> {
        let reader_url = format!("{}{}", self.reader_base, url);
        for attempt in 0..READER_MAX_RETRIES {
            match self.client.get(&reader_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(text) = resp.text().await {
                        if !text.trim().is_empty() {
                            tracing::debug!(%url, chars = text.len(), "reader fetch ok");
                            return Some(text);
                        }
                    }
                }
                Ok(resp) => {
                    tracing::debug!(%url, status = %resp.status(), attempt, "reader fetch failed");
                }
                Err(err) => {
                    tracing::debug!(%url, %err, attempt, "reader fetch error");
                }
            }
            if attempt + 1 < READER_MAX_RETRIES {
                tokio::time::sleep(Duration::from_millis(500 * (1 << attempt))).await;
            }
        }
        None
    }

    async fn fetch_direct(&self, url: &str) -> Option<String> {
        for attempt in 0..FALLBACK_MAX_RETRIES {
            let request = self
                .client
                .get(url)
                .header("User-Agent", BROWSER_USER_AGENT)
                .header("Accept", "text/html,application/xhtml+xml");
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(body) = resp.text().await {
                        let text = html_to_text(&body);
                        if !text.is_empty() {
                            tracing::debug!(%url, chars = text.len(), "direct fetch ok");
                            return Some(text);
                        }
                    }
                }
                Ok(resp) => {
                    tracing::debug!(%url, status = %resp.status(), attempt, "direct fetch failed");
                }
                Err(err) => {
                    tracing::debug!(%url, %err, attempt, "direct fetch error");
                }
            }
            if attempt + 1 < FALLBACK_MAX_RETRIES {
                tokio::time::sleep(Duration::from_millis(1000 * (1 << attempt))).await;
            }
        }
        None
    }

    async fn extract_with_llm(&self, llm: &TieredLlm, raw: &str, topic: &str) -> Option<String> {
        let prompt = format!(
            "从下面的网页内容中提取与「{topic}」直接相关的关键事实、数据和论据。\n\
             去掉导航、广告和无关内容，保留来源中的具体数字。\n\n网页内容：\n{}",
            truncate_chars(raw, 8000)
        );
        let response = llm
            .chat(ChatRequest::new(prompt).caller("deep_scraper"))
            .await
            .ok()?;
        let trimmed = response.trim();
        (!trimmed.is_empty()).then(|| truncate_chars(trimmed, self.max_chars))
    }
}

impl Default for DeepScraper {
    fn default() -> Self {
        DeepScraper::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_markup_and_scripts() {
        let html = "<html><head><script>var x = 1;</script><style>.a{}</style></head>\
                    <body><h1>Title</h1><p>Body text.</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Body text."));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn domain_extraction_handles_www_and_paths() {
        assert_eq!(domain_of("https://www.csdn.net/article/1"), "csdn.net");
        assert_eq!(domain_of("http://github.com/x"), "github.com");
    }

    #[tokio::test]
    async fn blacklisted_domains_are_never_fetched() {
        // Reader base points at a closed port, so any fetch attempt would
        // burn retries; a blacklisted URL must return without fetching.
        let scraper = DeepScraper::new()
            .with_reader_base("http://127.0.0.1:9/")
            .with_top_n(5);
        let results = vec![SearchResult {
            title: "spam".into(),
            url: "https://blog.csdn.net/spam".into(),
            ..Default::default()
        }];
        let started = std::time::Instant::now();
        let pages = scraper.scrape_top_n(&results, "rust").await;
        assert!(pages.is_empty());
        // No retries happened: the whole call is near-instant.
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
