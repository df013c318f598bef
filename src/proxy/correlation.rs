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
use dashmap::DashMap;
use uuid::Uuid;

/// Process-wide map from a forwarded request's id to its original request text (§3).
///
/// Entries are created on the forward path (cache miss), and removed either by the reverse path
/// (once the matching response arrives) or by the owning session on termination, so that a
/// session's own in-flight requests never leak past its lifetime. Keys are 128-bit random tokens,
/// unique within the process, so there is no ABA hazard even under heavy concurrent use (§5).
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<String, String>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        CorrelationTable { pending: DashMap::new() }
    }

    /// Mints a fresh request id, records the mapping, and returns the id to frame onto the
    /// forwarded payload.
    pub fn insert(&self, original_text: impl Into<String>) -> String {
        let request_id = Uuid::new_v4().to_string();
        self.pending.insert(request_id.clone(), original_text.into());
        request_id
    }

    /// Removes and returns the original request text for `request_id`, if present. Returns `None`
    /// for ids not (or no longer) tracked — e.g. a second response for an id already consumed.
    pub fn take(&self, request_id: &str) -> Option<String> {
        self.pending.remove(request_id).map(|(_, text)| text)
    }

    /// Drops a tracked id without consuming its text. Used at session close to clean up any
    /// requests that never received a response (§4.4).
    pub fn forget(&self, request_id: &str) {
        self.pending.remove(request_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_take_round_trips_the_text() {
        let table = CorrelationTable::new();
        let id = table.insert("hello there");
        assert_eq!(table.take(&id), Some("hello there".to_string()));
    }

    #[test]
    fn take_is_one_shot() {
        let table = CorrelationTable::new();
        let id = table.insert("hello there");
        assert!(table.take(&id).is_some());
        assert_eq!(table.take(&id), None);
    }

    #[test]
    fn ids_are_unique() {
        let table = CorrelationTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn forget_removes_without_returning() {
        let table = CorrelationTable::new();
        let id = table.insert("orphaned");
        table.forget(&id);
        assert_eq!(table.len(), 0);
    }
}
