// Source collectors
// Thin per-source HTTP clients plus the on-disk article store they write to

pub mod alpha_vantage;
pub mod news;
pub mod producthunt;
pub mod reddit;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{SourcesConfig, optional_credential};

pub use alpha_vantage::AlphaVantageClient;
pub use news::NewsApiClient;
pub use producthunt::ProductHuntClient;
pub use reddit::RedditClient;

/// Timeframes for which search-interest trend summaries may be present
pub const TREND_TIMEFRAMES: [&str; 2] = ["same_day", "weekly"];

/// Category of a collected document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    News,
    Reddit,
    SocialTrends,
    Stock,
    #[serde(rename = "producthunt")]
    ProductHunt,
    GoogleTrends,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::News,
        SourceKind::Reddit,
        SourceKind::SocialTrends,
        SourceKind::Stock,
        SourceKind::ProductHunt,
        SourceKind::GoogleTrends,
    ];

    /// Categories written by collectors; trend summaries arrive from outside
    pub const COLLECTED: [SourceKind; 5] = [
        SourceKind::News,
        SourceKind::Reddit,
        SourceKind::SocialTrends,
        SourceKind::Stock,
        SourceKind::ProductHunt,
    ];

    /// Category name used in file names and in the index
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::News => "news",
            SourceKind::Reddit => "reddit",
            SourceKind::SocialTrends => "social_trends",
            SourceKind::Stock => "stock",
            SourceKind::ProductHunt => "producthunt",
            SourceKind::GoogleTrends => "google_trends",
        }
    }
}

impl fmt::Display for SourceKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown source kind: {}", s))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewsArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    pub full_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub subreddit: String,
    pub score: i64,
    pub created_utc: String,
    pub url: String,
    pub permalink: String,
    pub selftext: String,
}

/// Aggregate of one keyword's social search results
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SocialTrend {
    pub keyword: String,
    pub post_count: usize,
    pub average_score: f64,
    pub top_titles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricePoint {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: u64,
}

/// Search-interest summary written by an external trends collector.
///
/// `top_regions` is kept loosely typed; well-formed files hold a list of
/// `{"region": .., "score": ..}` mappings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendSummary {
    pub keyword: String,
    pub timeframe: String,
    pub trend_summary: String,
    pub top_regions: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductLaunch {
    pub name: String,
    pub tagline: String,
    pub url: String,
    pub votes: i64,
}

/// A data source that fetches records for a keyword and persists them
pub trait SourceCollector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch and store records for `keyword`, returning how many were written
    fn collect(&self, keyword: &str, store: &ArticleStore) -> Result<usize>;
}

/// Daily price history lookup for a ticker symbol
pub trait PriceHistory: Send + Sync {
    /// Most recent `days` daily points, newest first
    fn daily_prices(&self, symbol: &str, days: usize) -> Result<Vec<PricePoint>>;
}

/// One JSON file per (keyword, category) under the articles directory
#[derive(Debug, Clone)]
pub struct ArticleStore {
    dir: PathBuf,
}

impl ArticleStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{keyword}_{category}.json`
    #[inline]
    pub fn path_for(&self, keyword: &str, kind: SourceKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", sanitize_keyword(keyword), kind.as_str()))
    }

    /// `google_trends_{keyword}_{timeframe}.json`, keyword lowercased
    #[inline]
    pub fn trend_path(&self, keyword: &str, timeframe: &str) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.json",
            SourceKind::GoogleTrends.as_str(),
            sanitize_keyword(&keyword.to_lowercase()),
            timeframe
        ))
    }

    #[inline]
    pub fn save<T: Serialize + ?Sized>(&self, keyword: &str, kind: SourceKind, value: &T) -> Result<PathBuf> {
        let path = self.path_for(keyword, kind);
        write_json(&path, value)?;
        Ok(path)
    }

    /// Load a category file, `None` when it has not been collected
    #[inline]
    pub fn load<T: DeserializeOwned>(&self, keyword: &str, kind: SourceKind) -> Result<Option<T>> {
        read_json(&self.path_for(keyword, kind))
    }

    /// Remove the collected category files for `keyword`, returning how many existed.
    ///
    /// Trend summaries and other keywords are left alone.
    #[inline]
    pub fn clear_collected(&self, keyword: &str) -> std::io::Result<usize> {
        let mut removed = 0;
        for kind in SourceKind::COLLECTED {
            match fs::remove_file(self.path_for(keyword, kind)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    #[inline]
    pub fn save_trend(&self, keyword: &str, timeframe: &str, summary: &TrendSummary) -> Result<PathBuf> {
        let path = self.trend_path(keyword, timeframe);
        write_json(&path, summary)?;
        Ok(path)
    }

    #[inline]
    pub fn load_trend(&self, keyword: &str, timeframe: &str) -> Result<Option<TrendSummary>> {
        read_json(&self.trend_path(keyword, timeframe))
    }
}

fn sanitize_keyword(keyword: &str) -> String {
    keyword.replace(['/', '\\'], "_")
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize records")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Saved {}", path.display());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Build the collectors whose credentials are available.
///
/// A missing key disables that source with a warning; the social search
/// needs no key and is always enabled.
#[inline]
pub fn collectors_from_config(config: &SourcesConfig) -> Result<Vec<Arc<dyn SourceCollector>>> {
    let mut collectors: Vec<Arc<dyn SourceCollector>> = Vec::new();

    match optional_credential(&config.newsapi_key_env) {
        Some(key) => collectors.push(Arc::new(NewsApiClient::new(config, key))),
        None => warn!(
            "{} is not set; news collection is disabled",
            config.newsapi_key_env
        ),
    }

    collectors.push(Arc::new(RedditClient::new(config)));

    match optional_credential(&config.alpha_vantage_key_env) {
        Some(key) => collectors.push(Arc::new(AlphaVantageClient::new(config, key))),
        None => warn!(
            "{} is not set; stock collection is disabled",
            config.alpha_vantage_key_env
        ),
    }

    match (
        optional_credential(&config.producthunt_app_id_env),
        optional_credential(&config.producthunt_api_key_env),
    ) {
        (Some(app_id), Some(key)) => {
            collectors.push(Arc::new(ProductHuntClient::new(config, &app_id, key)?));
        }
        _ => warn!(
            "{}/{} are not set; launch collection is disabled",
            config.producthunt_app_id_env, config.producthunt_api_key_env
        ),
    }

    Ok(collectors)
}

/// Price lookup for the persona's ticker, when a key is available
#[inline]
pub fn price_history_from_config(config: &SourcesConfig) -> Option<Arc<dyn PriceHistory>> {
    optional_credential(&config.alpha_vantage_key_env)
        .map(|key| Arc::new(AlphaVantageClient::new(config, key)) as Arc<dyn PriceHistory>)
}
