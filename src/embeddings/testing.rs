//! Offline embedders for unit tests

use anyhow::{Result, anyhow};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Embedder;

/// Bag-of-words feature hashing: texts sharing words get similar vectors
#[derive(Debug, Default)]
pub struct HashingEmbedder {
    pub calls: AtomicUsize,
}

pub const HASHING_DIMENSION: usize = 64;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-test"
    }

    fn dimension(&self) -> usize {
        HASHING_DIMENSION
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; HASHING_DIMENSION];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let hash = fnv1a(&word.to_lowercase());
                    let slot = (hash % HASHING_DIMENSION as u64) as usize;
                    vector[slot] += if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
                }
                vector
            })
            .collect())
    }
}

/// Always fails, standing in for an unreachable backend
#[derive(Debug, Default)]
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }

    fn dimension(&self) -> usize {
        HASHING_DIMENSION
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}
