// Shared fixtures for integration tests

#![allow(dead_code, reason = "each test binary uses a different subset")]

use market_brief::embeddings::Embedder;
use market_brief::sources::{ArticleStore, NewsArticle, SourceKind};

pub const TEST_DIMENSION: usize = 32;

/// Deterministic bag-of-words embedder that needs no server
#[derive(Debug, Default)]
pub struct WordHashEmbedder;

impl Embedder for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; TEST_DIMENSION];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let hash = word
                        .to_lowercase()
                        .bytes()
                        .fold(5381_u64, |h, b| h.wrapping_mul(33) ^ u64::from(b));
                    vector[(hash % TEST_DIMENSION as u64) as usize] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Write one news article per text for `keyword`
pub fn write_news(store: &ArticleStore, keyword: &str, texts: &[&str]) {
    let articles: Vec<NewsArticle> = texts
        .iter()
        .map(|text| NewsArticle {
            title: (*text).to_string(),
            url: "https://news.example/article".to_string(),
            ..NewsArticle::default()
        })
        .collect();
    store
        .save(keyword, SourceKind::News, &articles)
        .expect("should write news file");
}
