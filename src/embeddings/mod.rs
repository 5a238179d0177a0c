// Embeddings module
// Word-window chunking and the embedding backends used by the index

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{ChunkingConfig, chunk_text};
pub use ollama::OllamaClient;

/// A deterministic text embedding backend.
///
/// Implementations must return one vector per input text, in input order,
/// each of length [`Embedder::dimension`]. Calls are blocking; async callers
/// run them on a blocking worker.
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors, recorded with the index
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding backend returned no vector"))
    }
}

#[cfg(test)]
pub mod testing;
