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
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::embed::{cosine_similarity, Embedder};

/// Default similarity threshold (§4.5).
pub const DEFAULT_THRESHOLD: f32 = 0.95;

struct CacheEntry {
    vector: Vec<f32>,
    response: String,
}

/// A bounded, LRU-ordered store of `(embedding, response)` pairs, queried by cosine similarity.
///
/// Entries are kept in recency order, most-recently-used at the front, so that `get` both
/// satisfies the "first entry above threshold" determinism rule (§4.5) and tends to test the
/// hottest entries first. The embedder is invoked outside the lock; only the subsequent scan and
/// mutation are serialized, per §5's guidance to keep the critical section short.
pub struct SemanticCache {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    max_entries: usize,
    entries: Mutex<VecDeque<CacheEntry>>,
}

impl SemanticCache {
    pub fn new(embedder: Arc<dyn Embedder>, max_entries: usize, threshold: f32) -> Self {
        assert!(max_entries > 0, "semantic cache capacity must be positive");
        SemanticCache {
            embedder,
            threshold,
            max_entries,
            entries: Mutex::new(VecDeque::with_capacity(max_entries)),
        }
    }

    /// Looks up `text`'s embedding against the cache. Returns the first entry (scanning
    /// most-recent first) whose cosine similarity is at least the configured threshold, promoting
    /// it to most-recently-used on a hit.
    pub fn get(&self, text: &str) -> Option<String> {
        let query = self.embedder.embed(text);
        let mut entries = self.entries.lock();

        let hit_index = entries
            .iter()
            .position(|entry| cosine_similarity(&query, &entry.vector) >= self.threshold)?;

        let entry = entries.remove(hit_index).expect("index came from this deque");
        let response = entry.response.clone();
        entries.push_front(entry);
        Some(response)
    }

    /// Inserts `(embed(text), response)` as most-recently-used, evicting the least-recently-used
    /// entry if the cache is already at capacity. Duplicate vectors are not de-duplicated.
    pub fn add(&self, text: &str, response: impl Into<String>) {
        let vector = self.embedder.embed(text);
        let mut entries = self.entries.lock();

        if entries.len() >= self.max_entries {
            entries.pop_back();
        }

        entries.push_front(CacheEntry {
            vector,
            response: response.into(),
        });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::embed::HashingEmbedder;

    fn cache(max_entries: usize, threshold: f32) -> SemanticCache {
        SemanticCache::new(Arc::new(HashingEmbedder::new(256)), max_entries, threshold)
    }

    #[test]
    fn idempotent_hit_on_identical_text() {
        let cache = cache(8, DEFAULT_THRESHOLD);
        cache.add("what color is the sky", "blue");
        assert_eq!(cache.get("what color is the sky"), Some("blue".to_string()));
    }

    #[test]
    fn miss_below_threshold() {
        let cache = cache(8, DEFAULT_THRESHOLD);
        cache.add("what color is the sky", "blue");
        assert_eq!(cache.get("describe a recipe for banana bread"), None);
    }

    #[test]
    fn bounded_eviction_is_least_recently_used() {
        let cache = cache(2, DEFAULT_THRESHOLD);
        cache.add("alpha request", "ra");
        cache.add("beta request", "rb");
        cache.add("gamma request", "rc");

        // "alpha" was the least-recently-touched entry when "gamma" was added, so it is evicted.
        assert_eq!(cache.get("alpha request"), None);
        assert_eq!(cache.get("beta request"), Some("rb".to_string()));
        assert_eq!(cache.get("gamma request"), Some("rc".to_string()));
    }

    #[test]
    fn get_promotes_entry_to_most_recently_used() {
        let cache = cache(2, DEFAULT_THRESHOLD);
        cache.add("alpha request", "ra");
        cache.add("beta request", "rb");

        // Touch "alpha" so it becomes MRU; "beta" is now the LRU entry.
        assert_eq!(cache.get("alpha request"), Some("ra".to_string()));
        cache.add("gamma request", "rc");

        assert_eq!(cache.get("beta request"), None);
        assert_eq!(cache.get("alpha request"), Some("ra".to_string()));
        assert_eq!(cache.get("gamma request"), Some("rc".to_string()));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = cache(4, DEFAULT_THRESHOLD);
        cache.add("alpha request", "ra");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("alpha request"), None);
    }
}
