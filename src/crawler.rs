use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Metadata scraped from the page head
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub og_title: String,
    pub og_description: String,
    pub og_image: String,
}

/// Everything extracted from one crawled page
#[derive(Debug, Clone, Serialize)]
pub struct CrawledPage {
    pub url: String,
    pub html: String,
    pub text: String,
    pub metadata: PageMetadata,
    pub structured_data: Vec<Value>,
}

/// Web page fetcher and content extractor
pub struct WebCrawler {
    client: Client,
    max_retries: u32,
}

impl WebCrawler {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    /// Fetch a URL and extract its text, metadata and embedded structured data.
    /// Transport errors and server errors are retried with a short backoff.
    pub async fn crawl(&self, url: &str) -> Result<CrawledPage> {
        Url::parse(url).map_err(|e| anyhow!("Invalid URL {}: {}", url, e))?;

        let mut attempt = 0;
        let response = loop {
            match self.client.get(url).send().await {
                Ok(response)
                    if response.status().is_server_error() && attempt < self.max_retries =>
                {
                    tracing::warn!(url, status = %response.status(), attempt, "Server error, retrying");
                }
                Ok(response) => break response,
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(url, error = %e, attempt, "Request failed, retrying");
                }
                Err(e) => return Err(anyhow!("Failed to fetch {}: {}", url, e)),
            }

            attempt += 1;
            tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
        };

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, url);
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        Ok(build_page(url, html))
    }
}

fn build_page(url: &str, html: String) -> CrawledPage {
    let document = Html::parse_document(&html);

    let text = extract_text(&document);
    let metadata = extract_metadata(&document, url);
    let structured_data = extract_structured_data(&document);

    CrawledPage {
        url: url.to_string(),
        html,
        text,
        metadata,
        structured_data,
    }
}

/// Visible text with scripts and styles dropped and whitespace collapsed
fn extract_text(document: &Html) -> String {
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    let whitespace = Regex::new(r"\s+").unwrap();
    whitespace.replace_all(raw.trim(), " ").to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if matches!(element.value().name(), "script" | "style" | "noscript") {
        return;
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

fn extract_metadata(document: &Html, url: &str) -> PageMetadata {
    let keywords = meta_content(document, r#"meta[name="keywords"]"#)
        .map(|raw| {
            raw.split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default();

    PageMetadata {
        url: url.to_string(),
        title: select_text(document, "title").unwrap_or_default(),
        description: meta_content(document, r#"meta[name="description"]"#).unwrap_or_default(),
        keywords,
        og_title: meta_content(document, r#"meta[property="og:title"]"#).unwrap_or_default(),
        og_description: meta_content(document, r#"meta[property="og:description"]"#)
            .unwrap_or_default(),
        og_image: meta_content(document, r#"meta[property="og:image"]"#).unwrap_or_default(),
    }
}

/// JSON-LD script blocks plus basic microdata items already present on the page
fn extract_structured_data(document: &Html) -> Vec<Value> {
    let mut data = Vec::new();

    if let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for script in document.select(&selector) {
            let body = script.text().collect::<String>();
            // Malformed JSON-LD blocks are skipped, not errors
            if let Ok(value) = serde_json::from_str::<Value>(&body) {
                data.push(value);
            }
        }
    }

    if let (Ok(scope_selector), Ok(prop_selector)) =
        (Selector::parse("[itemscope]"), Selector::parse("[itemprop]"))
    {
        for item in document.select(&scope_selector) {
            let mut object = serde_json::Map::new();

            if let Some(item_type) = item.value().attr("itemtype") {
                let short_type = item_type
                    .trim_start_matches("http://schema.org/")
                    .trim_start_matches("https://schema.org/");
                object.insert("@type".to_string(), Value::String(short_type.to_string()));
            }

            for prop in item.select(&prop_selector) {
                let Some(name) = prop.value().attr("itemprop") else {
                    continue;
                };
                let value = prop
                    .value()
                    .attr("content")
                    .map(str::to_string)
                    .unwrap_or_else(|| prop.text().collect::<String>().trim().to_string());

                if !name.is_empty() && !value.is_empty() {
                    object.insert(name.to_string(), Value::String(value));
                }
            }

            if !object.is_empty() {
                data.push(Value::Object(object));
            }
        }
    }

    data
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    select_first(document, selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    select_first(document, selector)
        .and_then(|el| el.value().attr("content"))
        .map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>  Platinum Rewards Card  </title>
  <meta name="description" content="A credit card with travel rewards.">
  <meta name="keywords" content="credit card, rewards, travel,">
  <meta property="og:title" content="Platinum Rewards">
  <meta property="og:description" content="Earn points on every purchase">
  <meta property="og:image" content="https://example.com/card.png">
  <script type="application/ld+json">{"@type": "FinancialProduct", "name": "Platinum Rewards Card"}</script>
  <script type="application/ld+json">{not json at all</script>
  <style>body { color: red; }</style>
</head>
<body>
  <script>console.log("tracking");</script>
  <h1>Platinum Rewards Card</h1>
  <p>Annual   fee:
  $95</p>
  <div itemscope itemtype="https://schema.org/Product">
    <span itemprop="name">Gold Card</span>
    <meta itemprop="price" content="0">
  </div>
</body>
</html>"#;

    #[test]
    fn test_text_extraction_strips_scripts_and_collapses_whitespace() {
        let document = Html::parse_document(FIXTURE);
        let text = extract_text(&document);

        assert!(text.contains("Annual fee: $95"));
        assert!(text.contains("Platinum Rewards Card"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_metadata_extraction() {
        let document = Html::parse_document(FIXTURE);
        let metadata = extract_metadata(&document, "https://example.com/cards");

        assert_eq!(metadata.url, "https://example.com/cards");
        assert_eq!(metadata.title, "Platinum Rewards Card");
        assert_eq!(metadata.description, "A credit card with travel rewards.");
        assert_eq!(metadata.keywords, vec!["credit card", "rewards", "travel"]);
        assert_eq!(metadata.og_title, "Platinum Rewards");
        assert_eq!(metadata.og_image, "https://example.com/card.png");
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        let document = Html::parse_document("<html><body><p>bare page</p></body></html>");
        let metadata = extract_metadata(&document, "https://example.com");

        assert_eq!(metadata.title, "");
        assert_eq!(metadata.description, "");
        assert!(metadata.keywords.is_empty());
    }

    #[test]
    fn test_structured_data_extraction() {
        let document = Html::parse_document(FIXTURE);
        let data = extract_structured_data(&document);

        // The malformed JSON-LD block is skipped; the valid block and the
        // microdata item both survive.
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["@type"], "FinancialProduct");
        assert_eq!(data[1]["@type"], "Product");
        assert_eq!(data[1]["name"], "Gold Card");
        assert_eq!(data[1]["price"], "0");
    }

    #[test]
    fn test_build_page_assembles_everything() {
        let page = build_page("https://example.com/cards", FIXTURE.to_string());

        assert_eq!(page.url, "https://example.com/cards");
        assert!(!page.text.is_empty());
        assert_eq!(page.metadata.title, "Platinum Rewards Card");
        assert_eq!(page.structured_data.len(), 2);
        assert!(page.html.contains("<h1>"));
    }

    #[tokio::test]
    async fn test_crawl_rejects_invalid_urls() {
        let crawler = WebCrawler::new(&CrawlerConfig::default()).unwrap();
        assert!(crawler.crawl("not a url").await.is_err());
    }
}
