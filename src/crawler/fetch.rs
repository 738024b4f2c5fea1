//! Page fetching and parsing.
//!
//! The rest of the crawler only depends on the [`PageFetcher`] trait, so
//! tests can substitute canned pages. The production implementation pulls
//! the page over HTTP with a hard timeout and extracts title, token stream
//! and absolute outgoing links.

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::types::FetchedPage;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The page-fetch collaborator: URL in, parsed content out.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedPage>> + Send;
}

/// Fetches pages with reqwest and parses them with scraper.
#[derive(Clone, Default)]
pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let base = Url::parse(url).with_context(|| format!("invalid URL {}", url))?;
        let response = self
            .http
            .get(base.clone())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("fetching {}", url))?;
        let body = response
            .text()
            .await
            .with_context(|| format!("reading body of {}", url))?;

        Ok(parse_page(&base, &body))
    }
}

/// Extracts title, token stream and absolute links from an HTML document.
/// Relative hrefs are resolved against `base`; ones that cannot be resolved
/// are skipped.
pub fn parse_page(base: &Url, body: &str) -> FetchedPage {
    let document = Html::parse_document(body);

    let title_selector = Selector::parse("title").unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    let tokens = tokenize_text(&text);

    let anchor_selector = Selector::parse("a[href]").unwrap();
    let links: HashSet<String> = document
        .select(&anchor_selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|absolute| absolute.to_string())
        .collect();

    FetchedPage {
        title,
        tokens,
        links,
    }
}

/// Whitespace tokenization with lower-casing. All index lookups and Bloom
/// operations assume lower-cased terms, so folding happens here once.
pub fn tokenize_text(text: &str) -> Vec<String> {
    let re = Regex::new(r"\S+").unwrap();
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
