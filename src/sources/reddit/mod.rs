
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{ArticleStore, RedditPost, SocialTrend, SourceCollector, SourceKind};
use crate::config::SourcesConfig;
use crate::http::{agent_with_timeout, request_with_retry};

const TOP_TITLES: usize = 3;

/// Reddit public search; also derives the social trend summary
#[derive(Debug, Clone)]
pub struct RedditClient {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
    limit: u32,
    retry_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Submission,
}

#[derive(Debug, Deserialize)]
struct Submission {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    selftext: String,
}

impl From<Submission> for RedditPost {
    fn from(submission: Submission) -> Self {
        let created_utc = DateTime::<Utc>::from_timestamp(submission.created_utc as i64, 0)
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        Self {
            id: submission.id,
            title: submission.title,
            subreddit: submission.subreddit,
            score: submission.score,
            created_utc,
            url: submission.url,
            permalink: format!("https://reddit.com{}", submission.permalink),
            selftext: submission.selftext,
        }
    }
}

impl RedditClient {
    #[inline]
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            agent: agent_with_timeout(Duration::from_secs(config.timeout_seconds)),
            base_url: config.reddit_url.clone(),
            user_agent: config.user_agent.clone(),
            limit: config.reddit_limit,
            retry_attempts: config.retry_attempts,
        }
    }

    /// Search all subreddits for `keyword`, most relevant first
    #[inline]
    pub fn search(&self, keyword: &str) -> Result<Vec<RedditPost>> {
        let limit = self.limit.to_string();
        let response_text = request_with_retry(&self.base_url, self.retry_attempts, || {
            self.agent
                .get(self.base_url.as_str())
                .query("q", keyword)
                .query("limit", &limit)
                .query("sort", "relevance")
                .query("type", "link")
                .header("User-Agent", self.user_agent.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Reddit search failed for '{}'", keyword))?;

        let listing: Listing =
            serde_json::from_str(&response_text).context("Failed to parse Reddit search response")?;

        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| RedditPost::from(child.data))
            .collect();

        debug!("Reddit search for '{}' returned {} posts", keyword, posts.len());
        Ok(posts)
    }
}

/// Post count, mean score (two decimals) and the highest-scoring titles
#[inline]
pub fn summarize_posts(keyword: &str, posts: &[RedditPost]) -> SocialTrend {
    let post_count = posts.len();
    let average_score = if post_count == 0 {
        0.0
    } else {
        let total: i64 = posts.iter().map(|p| p.score).sum();
        ((total as f64 / post_count as f64) * 100.0).round() / 100.0
    };

    let mut ranked: Vec<&RedditPost> = posts.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    SocialTrend {
        keyword: keyword.to_string(),
        post_count,
        average_score,
        top_titles: ranked
            .into_iter()
            .take(TOP_TITLES)
            .map(|p| p.title.clone())
            .collect(),
    }
}

impl SourceCollector for RedditClient {
    #[inline]
    fn name(&self) -> &'static str {
        "reddit"
    }

    #[inline]
    fn collect(&self, keyword: &str, store: &ArticleStore) -> Result<usize> {
        let posts = self.search(keyword)?;
        if posts.is_empty() {
            return Ok(0);
        }

        let path = store.save(keyword, SourceKind::Reddit, &posts)?;
        info!("Saved {} Reddit posts to {}", posts.len(), path.display());

        let trend = summarize_posts(keyword, &posts);
        store.save(keyword, SourceKind::SocialTrends, &trend)?;

        Ok(posts.len())
    }
}
