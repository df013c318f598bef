// Copyright (c) 2018 Nuclear Furnace
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
use fnv::FnvHasher;
use std::hash::Hasher;

/// The embedding oracle is treated as an external, pure `text -> vector` function (§2); the
/// balancer does not train or load a model. This trait is the seam a real model-backed oracle
/// would plug into; `HashingEmbedder` is the deterministic built-in used when none is configured.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;

    fn dimensions(&self) -> usize;
}

/// A deterministic, dependency-free embedder: each whitespace-delimited token is hashed into one
/// of `dimensions` buckets, and its count accumulates there. This has no notion of meaning, but it
/// is stable across calls within a process, which is all §2 requires of `embed`, and it is enough
/// to exercise the cache's similarity-threshold logic without a real model or network access.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "embedding dimensionality must be positive");
        HashingEmbedder { dimensions }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text.split_whitespace().map(|t| t.to_lowercase()) {
            let mut hasher = FnvHasher::default();
            hasher.write(token.as_bytes());
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity between two vectors. When either norm is zero the result is defined as 0
/// (no match), per §4.5, rather than producing NaN from a 0/0 division.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_identical_vector() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("hello world");
        let b = embedder.embed("hello world");
        assert_eq!(cosine_similarity(&a, &b), 1.0);
    }

    #[test]
    fn zero_vector_never_matches() {
        let zero = vec![0f32; 8];
        let other = vec![1f32; 8];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
    }

    #[test]
    fn dissimilar_text_scores_below_identical() {
        let embedder = HashingEmbedder::new(256);
        let a = embedder.embed("what is the capital of france");
        let b = embedder.embed("what is the capital of france");
        let c = embedder.embed("describe the water cycle in detail");
        assert_eq!(cosine_similarity(&a, &b), 1.0);
        assert!(cosine_similarity(&a, &c) < 1.0);
    }
}
