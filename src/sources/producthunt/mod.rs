#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{ArticleStore, ProductLaunch, SourceCollector, SourceKind};
use crate::config::SourcesConfig;
use crate::http::{agent_with_timeout, request_with_retry};

const ALGOLIA_INDEX: &str = "Post_production";

/// Product Hunt launches via the site's Algolia search index
#[derive(Debug, Clone)]
pub struct ProductHuntClient {
    agent: ureq::Agent,
    search_url: Url,
    app_id: String,
    api_key: String,
    limit: usize,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    name: Option<String>,
    tagline: Option<String>,
    url: Option<String>,
    #[serde(rename = "votesCount")]
    votes_count: Option<i64>,
}

impl From<Hit> for ProductLaunch {
    fn from(hit: Hit) -> Self {
        Self {
            name: hit.name.unwrap_or_default(),
            tagline: hit.tagline.unwrap_or_default(),
            url: hit.url.unwrap_or_default(),
            votes: hit.votes_count.unwrap_or(0),
        }
    }
}

impl ProductHuntClient {
    #[inline]
    pub fn new(config: &SourcesConfig, app_id: &str, api_key: String) -> Result<Self> {
        let raw_url = config.producthunt_url.clone().unwrap_or_else(|| {
            format!(
                "https://{}-dsn.algolia.net/1/indexes/{}",
                app_id.to_lowercase(),
                ALGOLIA_INDEX
            )
        });
        let search_url = Url::parse(&raw_url)
            .with_context(|| format!("Invalid Product Hunt search URL: {}", raw_url))?;

        Ok(Self {
            agent: agent_with_timeout(Duration::from_secs(config.timeout_seconds)),
            search_url,
            app_id: app_id.to_string(),
            api_key,
            limit: config.producthunt_limit,
            retry_attempts: config.retry_attempts,
        })
    }

    #[inline]
    pub fn search_url(&self) -> &Url {
        &self.search_url
    }

    #[inline]
    pub fn search(&self, keyword: &str) -> Result<Vec<ProductLaunch>> {
        let url = self.search_url.as_str();
        let response_text = request_with_retry(url, self.retry_attempts, || {
            self.agent
                .get(url)
                .query("query", keyword)
                .header("X-Algolia-API-Key", self.api_key.as_str())
                .header("X-Algolia-Application-Id", self.app_id.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Product Hunt search failed for '{}'", keyword))?;

        let response: SearchResponse = serde_json::from_str(&response_text)
            .context("Failed to parse Product Hunt search response")?;

        let launches: Vec<ProductLaunch> = response
            .hits
            .into_iter()
            .take(self.limit)
            .map(ProductLaunch::from)
            .collect();

        debug!(
            "Product Hunt search for '{}' returned {} launches",
            keyword,
            launches.len()
        );
        Ok(launches)
    }
}

impl SourceCollector for ProductHuntClient {
    #[inline]
    fn name(&self) -> &'static str {
        "producthunt"
    }

    #[inline]
    fn collect(&self, keyword: &str, store: &ArticleStore) -> Result<usize> {
        let launches = self.search(keyword)?;
        if launches.is_empty() {
            return Ok(0);
        }
        let path = store.save(keyword, SourceKind::ProductHunt, &launches)?;
        info!("Saved {} launches to {}", launches.len(), path.display());
        Ok(launches.len())
    }
}
