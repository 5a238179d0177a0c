// Chunk assembly
// Turns the collected per-source files for a set of keywords into labelled text chunks

#[cfg(test)]
mod tests;

use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::embeddings::chunking::chunk_words;
use crate::sources::{
    ArticleStore, NewsArticle, PricePoint, ProductLaunch, RedditPost, SocialTrend, SourceKind,
    TREND_TIMEFRAMES, TrendSummary,
};

/// Price points rendered into the stock document
const STOCK_POINTS: usize = 10;

const NO_REGIONAL_DATA: &str = "No regional data available.";

/// A unit of retrievable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub source: SourceKind,
    pub keyword: String,
    pub text: String,
}

pub struct ChunkAssembler {
    store: ArticleStore,
    max_words: NonZeroUsize,
}

impl ChunkAssembler {
    #[inline]
    pub fn new(store: ArticleStore, max_words: usize) -> Result<Self, ConfigError> {
        let max_words =
            NonZeroUsize::new(max_words).ok_or(ConfigError::InvalidChunkWords(max_words))?;
        Ok(Self { store, max_words })
    }

    /// Chunks for every keyword, in keyword order then source order.
    ///
    /// Categories that were never collected contribute nothing; unreadable
    /// files are logged and skipped.
    #[inline]
    pub fn assemble(&self, keywords: &[String]) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();

        for keyword in keywords {
            let before = chunks.len();
            for (source, document) in self.documents_for(keyword) {
                chunks.extend(
                    chunk_words(&document, self.max_words)
                        .into_iter()
                        .map(|text| DocumentChunk {
                            source,
                            keyword: keyword.clone(),
                            text,
                        }),
                );
            }
            debug!(
                "Assembled {} chunks for '{}'",
                chunks.len() - before,
                keyword
            );
        }

        chunks
    }

    /// Labelled source documents for one keyword, before chunking
    #[inline]
    pub fn documents_for(&self, keyword: &str) -> Vec<(SourceKind, String)> {
        let mut documents = Vec::new();

        if let Some(posts) = self.load::<Vec<RedditPost>>(keyword, SourceKind::Reddit) {
            documents.extend(posts.iter().map(|p| (SourceKind::Reddit, reddit_document(p))));
        }

        if let Some(trend) = self.load::<SocialTrend>(keyword, SourceKind::SocialTrends) {
            documents.push((SourceKind::SocialTrends, social_trend_document(&trend)));
        }

        if let Some(articles) = self.load::<Vec<NewsArticle>>(keyword, SourceKind::News) {
            documents.extend(articles.iter().map(|a| (SourceKind::News, news_document(a))));
        }

        if let Some(points) = self.load::<Vec<PricePoint>>(keyword, SourceKind::Stock) {
            match stock_document(&points) {
                Ok(document) => documents.push((SourceKind::Stock, document)),
                Err(e) => warn!("Failed to render stock data for '{}': {}", keyword, e),
            }
        }

        if let Some(launches) = self.load::<Vec<ProductLaunch>>(keyword, SourceKind::ProductHunt) {
            documents.extend(
                launches
                    .iter()
                    .map(|l| (SourceKind::ProductHunt, product_launch_document(l))),
            );
        }

        for timeframe in TREND_TIMEFRAMES {
            match self.store.load_trend(keyword, timeframe) {
                Ok(Some(summary)) => documents.push((
                    SourceKind::GoogleTrends,
                    trend_document(timeframe, &summary),
                )),
                Ok(None) => {}
                Err(e) => warn!("Skipping {} trends for '{}': {:#}", timeframe, keyword, e),
            }
        }

        documents
    }

    fn load<T: DeserializeOwned>(&self, keyword: &str, kind: SourceKind) -> Option<T> {
        match self.store.load(keyword, kind) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping {} data for '{}': {:#}", kind, keyword, e);
                None
            }
        }
    }
}

#[inline]
pub fn reddit_document(post: &RedditPost) -> String {
    format!("[Reddit Post]\n{}\n{}", post.title, post.selftext)
}

#[inline]
pub fn social_trend_document(trend: &SocialTrend) -> String {
    format!(
        "[Social Trend Summary for '{}']\nPost Count: {}\nAverage Score: {}\nTop Posts:\n- {}",
        trend.keyword,
        trend.post_count,
        trend.average_score,
        trend.top_titles.join("\n- ")
    )
}

/// Title plus the extracted body, or the description when no body was extracted
#[inline]
pub fn news_document(article: &NewsArticle) -> String {
    let body = if article.full_text.trim().is_empty() {
        &article.description
    } else {
        &article.full_text
    };
    format!("[News Article]\n{}\n{}", article.title, body)
}

#[inline]
pub fn stock_document(points: &[PricePoint]) -> serde_json::Result<String> {
    let head = &points[..points.len().min(STOCK_POINTS)];
    Ok(format!("[Stock Data]\n{}", serde_json::to_string_pretty(head)?))
}

#[inline]
pub fn product_launch_document(launch: &ProductLaunch) -> String {
    format!(
        "[Product Hunt]\n{}\n{}\n{}",
        launch.name, launch.tagline, launch.url
    )
}

#[inline]
pub fn trend_document(timeframe: &str, summary: &TrendSummary) -> String {
    format!(
        "[Google Trends - {}]\n{}\nTop Regions: {}",
        timeframe.to_uppercase(),
        summary.trend_summary,
        region_list(&summary.top_regions)
    )
}

/// `Region (score), ...`, or a placeholder when the field is not a list of mappings
fn region_list(regions: &serde_json::Value) -> String {
    let Some(entries) = regions.as_array() else {
        warn!("Invalid region format, using placeholder");
        return NO_REGIONAL_DATA.to_string();
    };

    let rendered: Option<Vec<String>> = entries
        .iter()
        .map(|entry| {
            let entry = entry.as_object()?;
            let region = entry.get("region")?;
            let score = entry.get("score")?;
            Some(format!("{} ({})", display_value(region), display_value(score)))
        })
        .collect();

    match rendered {
        Some(parts) => parts.into_iter().join(", "),
        None => {
            warn!("Invalid region format, using placeholder");
            NO_REGIONAL_DATA.to_string()
        }
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
