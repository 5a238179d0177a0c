// Retriever
// Diversity-aware top-k selection over the embedding index


use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::index::{EmbeddingIndex, IndexError, IndexHit, dot};
use crate::sources::SourceKind;

pub const DEFAULT_TOP_K: usize = 15;
pub const DEFAULT_FETCH_K: usize = 20;
pub const DEFAULT_LAMBDA: f32 = 0.5;
pub const DEFAULT_QUERY_SUFFIX: &str = "financial summary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks handed to the language model
    pub top_k: usize,
    /// Nearest-neighbour candidates considered before diversification
    pub fetch_k: usize,
    /// 1.0 ranks purely by relevance, 0.0 purely by novelty
    pub lambda: f32,
    /// Appended to the composed query
    pub query_suffix: String,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            fetch_k: DEFAULT_FETCH_K,
            lambda: DEFAULT_LAMBDA,
            query_suffix: DEFAULT_QUERY_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub position: usize,
    pub keyword: String,
    pub source: SourceKind,
    pub text: String,
    pub similarity: f32,
}

impl From<IndexHit> for RetrievedChunk {
    #[inline]
    fn from(hit: IndexHit) -> Self {
        Self {
            position: hit.position,
            keyword: hit.keyword,
            source: hit.source,
            text: hit.text,
            similarity: hit.similarity,
        }
    }
}

#[derive(Debug)]
pub struct Retriever<'a> {
    index: &'a EmbeddingIndex,
    config: RetrievalConfig,
}

impl<'a> Retriever<'a> {
    #[inline]
    pub fn new(index: &'a EmbeddingIndex, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    /// Texts of the `k` most relevant, mutually diverse chunks
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>, IndexError> {
        Ok(self
            .retrieve_chunks(query, k)
            .await?
            .into_iter()
            .map(|chunk| chunk.text)
            .collect())
    }

    #[inline]
    pub async fn retrieve_chunks(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.index.embed_query(query).await?;
        let fetch = self.config.fetch_k.max(k);
        let mut candidates = self.index.nearest(&query_vector, fetch).await?;
        sort_candidates(&mut candidates);

        debug!(
            "Diversifying {} candidates down to {} for query '{}'",
            candidates.len(),
            k,
            query
        );

        Ok(maximal_marginal_relevance(candidates, k, self.config.lambda)
            .into_iter()
            .map(RetrievedChunk::from)
            .collect())
    }
}

/// Similarity descending, then insertion order
#[inline]
pub fn sort_candidates(candidates: &mut [IndexHit]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
}

/// Greedy MMR selection of up to `k` candidates.
///
/// The first pick is the most query-similar candidate. Each later pick
/// maximises `lambda * sim(q, c) - (1 - lambda) * max_s sim(c, s)` over the
/// already selected `s`. Ties go to the lower insertion position, so the
/// result depends only on the candidate set.
#[inline]
pub fn maximal_marginal_relevance(
    mut candidates: Vec<IndexHit>,
    k: usize,
    lambda: f32,
) -> Vec<IndexHit> {
    let mut selected: Vec<IndexHit> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !candidates.is_empty() {
        let mut best: Option<(usize, f32)> = None;

        for (i, candidate) in candidates.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| dot(&candidate.vector, &s.vector))
                .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |m| m.max(sim))));
            let score = match redundancy {
                Some(redundancy) => lambda * candidate.similarity - (1.0 - lambda) * redundancy,
                None => candidate.similarity,
            };

            let better = match best {
                None => true,
                Some((best_i, best_score)) => {
                    score > best_score
                        || (score == best_score
                            && candidate.position < candidates[best_i].position)
                }
            };
            if better {
                best = Some((i, score));
            }
        }

        match best {
            Some((i, _)) => selected.push(candidates.remove(i)),
            None => break,
        }
    }

    selected
}

/// Query used to pull report context out of the index
#[inline]
pub fn compose_query(keywords: &[String], role: &str, suffix: &str) -> String {
    let joined = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    [joined.as_str(), role.trim(), suffix.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
