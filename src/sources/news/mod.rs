
use anyhow::{Context, Result, anyhow};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ArticleStore, NewsArticle, SourceCollector, SourceKind};
use crate::config::SourcesConfig;
use crate::http::{agent_with_timeout, request_with_retry};

/// Headline placeholder NewsAPI uses for withdrawn articles
const REMOVED_MARKER: &str = "[Removed]";

/// NewsAPI `everything` search with optional full-text extraction
#[derive(Debug, Clone)]
pub struct NewsApiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    user_agent: String,
    page_size: u32,
    fetch_full_text: bool,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    source: Option<RawSource>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl NewsApiClient {
    #[inline]
    pub fn new(config: &SourcesConfig, api_key: String) -> Self {
        Self {
            agent: agent_with_timeout(Duration::from_secs(config.timeout_seconds)),
            base_url: config.newsapi_url.clone(),
            api_key,
            user_agent: config.user_agent.clone(),
            page_size: config.news_page_size,
            fetch_full_text: config.fetch_full_text,
            retry_attempts: config.retry_attempts,
        }
    }

    /// Search for articles mentioning `keyword`, most relevant first
    #[inline]
    pub fn search(&self, keyword: &str) -> Result<Vec<NewsArticle>> {
        let page_size = self.page_size.to_string();
        let response_text = request_with_retry(&self.base_url, self.retry_attempts, || {
            self.agent
                .get(self.base_url.as_str())
                .query("q", keyword)
                .query("language", "en")
                .query("pageSize", &page_size)
                .query("sortBy", "relevancy")
                .header("X-Api-Key", self.api_key.as_str())
                .header("User-Agent", self.user_agent.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("News search failed for '{}'", keyword))?;

        let response: SearchResponse =
            serde_json::from_str(&response_text).context("Failed to parse news search response")?;

        if response.status == "error" {
            return Err(anyhow!(
                "News search returned an error: {}",
                response.message.unwrap_or_default()
            ));
        }

        let articles = response
            .articles
            .into_iter()
            .filter(|raw| raw.title.as_deref() != Some(REMOVED_MARKER))
            .map(|raw| {
                let url = raw.url.unwrap_or_default();
                let full_text = if self.fetch_full_text && !url.is_empty() {
                    self.fetch_article_text(&url)
                } else {
                    String::new()
                };
                NewsArticle {
                    title: raw.title.unwrap_or_default(),
                    description: raw.description.unwrap_or_default(),
                    source: raw.source.and_then(|s| s.name).unwrap_or_default(),
                    published_at: raw.published_at.unwrap_or_default(),
                    url,
                    full_text,
                }
            })
            .collect::<Vec<_>>();

        debug!("News search for '{}' returned {} articles", keyword, articles.len());
        Ok(articles)
    }

    /// Download an article page and extract its body; empty on failure
    fn fetch_article_text(&self, url: &str) -> String {
        let result = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(anyhow::Error::from)
            .and_then(|html| extract_article_text(&html));

        match result {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to extract article at {}: {}", url, e);
                String::new()
            }
        }
    }
}

impl SourceCollector for NewsApiClient {
    #[inline]
    fn name(&self) -> &'static str {
        "news"
    }

    #[inline]
    fn collect(&self, keyword: &str, store: &ArticleStore) -> Result<usize> {
        let articles = self.search(keyword)?;
        if articles.is_empty() {
            return Ok(0);
        }
        let path = store.save(keyword, SourceKind::News, &articles)?;
        info!("Saved {} news articles to {}", articles.len(), path.display());
        Ok(articles.len())
    }
}

/// Extract readable paragraph text from an article page.
///
/// Paragraphs inside the main article container are preferred; pages without
/// one fall back to every paragraph in the document.
#[inline]
pub fn extract_article_text(html: &str) -> Result<String> {
    let document = Html::parse_document(html);

    let container_selector =
        Selector::parse("article, [itemprop=articleBody], main, .article-body, #content")
            .map_err(|e| anyhow!("Failed to create container selector: {:?}", e))?;
    let paragraph_selector =
        Selector::parse("p").map_err(|e| anyhow!("Failed to create paragraph selector: {:?}", e))?;

    let paragraphs: Vec<String> = match document.select(&container_selector).next() {
        Some(container) => container
            .select(&paragraph_selector)
            .map(|p| normalize_whitespace(&p.text().collect::<String>()))
            .collect(),
        None => document
            .select(&paragraph_selector)
            .map(|p| normalize_whitespace(&p.text().collect::<String>()))
            .collect(),
    };

    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
