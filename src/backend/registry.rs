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
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::RegistryError;

/// A single live backend as tracked by the registry.
///
/// `seq` records insertion order; it breaks ties in the least-connections policy and is never
/// exposed outside this module.
#[derive(Debug, Clone)]
struct BackendEntry {
    host: String,
    port: u16,
    in_flight: usize,
    seq: u64,
}

/// An immutable snapshot of a backend, handed out by `pick` and `snapshot`.
///
/// This is a value type: holding one does not keep the backend alive in the registry, and it does
/// not track eviction. Callers identify "the same backend" by `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub host: String,
    pub port: u16,
    pub in_flight: usize,
}

impl From<&BackendEntry> for BackendInfo {
    fn from(e: &BackendEntry) -> Self {
        BackendInfo {
            host: e.host.clone(),
            port: e.port,
            in_flight: e.in_flight,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    backends: Vec<BackendEntry>,
    /// Round-robin cursor. Only `RoundRobin::pick` advances this; it is kept here, rather than on
    /// the policy, because the data model ties it to the registry's ordering (I3).
    cursor: usize,
}

impl RegistryState {
    fn find(&self, host: &str, port: u16) -> Option<usize> {
        self.backends.iter().position(|b| b.host == host && b.port == port)
    }

    /// Clamp the cursor per I3: it must index a live backend, or wrap to 0 when the registry is
    /// empty.
    fn clamp_cursor(&mut self) {
        if self.backends.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.backends.len() {
            self.cursor = 0;
        }
    }
}

/// The balancer's view of live backends.
///
/// All mutation — insert, remove, cursor advance, and `in_flight` increment/decrement — happens
/// under a single mutex, so that `pick` can perform selection-plus-increment atomically (I2).
pub struct Registry {
    state: Mutex<RegistryState>,
    next_seq: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            state: Mutex::new(RegistryState::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registers a new backend. Fails if a live backend already holds `(host, port)` (I1).
    pub fn add(&self, host: impl Into<String>, port: u16) -> Result<(), RegistryError> {
        let host = host.into();
        let mut state = self.state.lock();
        if state.find(&host, port).is_some() {
            return Err(RegistryError::DuplicateBackend(host, port));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        state.backends.push(BackendEntry {
            host,
            port,
            in_flight: 0,
            seq,
        });
        Ok(())
    }

    /// Evicts a backend by identity. A no-op if it is not present (already evicted).
    pub fn remove(&self, host: &str, port: u16) {
        let mut state = self.state.lock();
        if let Some(idx) = state.find(host, port) {
            state.backends.remove(idx);
            // Removing an entry before the cursor shifts everything after it left by one; the
            // simplest correct fix-up consistent with I3 is to re-clamp rather than track shift
            // deltas, since round-robin fairness only promises "insertion order modulo n", not a
            // specific backend per absolute cursor value.
            state.clamp_cursor();
        }
    }

    /// Decrements `in_flight` for the named backend, if it is still registered. Called exactly
    /// once per proxy session on termination; a backend evicted mid-session is simply not found,
    /// which is fine — eviction does not forcibly tear down sessions already using it.
    pub fn release(&self, host: &str, port: u16) {
        let mut state = self.state.lock();
        if let Some(idx) = state.find(host, port) {
            let entry = &mut state.backends[idx];
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
    }

    /// Point-in-time snapshot of all live backends, in registry order.
    pub fn snapshot(&self) -> Vec<BackendInfo> {
        self.state.lock().backends.iter().map(BackendInfo::from).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().backends.is_empty()
    }

    /// Round-robin selection: returns the backend at the cursor, advances `cursor = (cursor + 1)
    /// mod n`, and increments its `in_flight` before returning.
    pub(crate) fn pick_round_robin(&self) -> Result<BackendInfo, RegistryError> {
        let mut state = self.state.lock();
        if state.backends.is_empty() {
            return Err(RegistryError::NoBackendsAvailable);
        }

        state.clamp_cursor();
        let idx = state.cursor;
        state.cursor = (state.cursor + 1) % state.backends.len();

        state.backends[idx].in_flight += 1;
        Ok(BackendInfo::from(&state.backends[idx]))
    }

    /// Least-connections selection: argmin over `in_flight`, ties broken by insertion order.
    pub(crate) fn pick_least_connections(&self) -> Result<BackendInfo, RegistryError> {
        let mut state = self.state.lock();
        if state.backends.is_empty() {
            return Err(RegistryError::NoBackendsAvailable);
        }

        let idx = state
            .backends
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| (b.in_flight, b.seq))
            .map(|(idx, _)| idx)
            .expect("checked non-empty above");

        state.backends[idx].in_flight += 1;
        Ok(BackendInfo::from(&state.backends[idx]))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
