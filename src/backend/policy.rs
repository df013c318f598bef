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
use std::fmt;
use std::str::FromStr;

use crate::backend::registry::{BackendInfo, Registry};
use crate::error::RegistryError;

/// A pluggable backend-selection strategy.
///
/// `pick` is atomic with respect to the registry and with respect to itself across concurrent
/// callers: the registry holds the lock across selection-plus-increment (see
/// `Registry::pick_round_robin` / `Registry::pick_least_connections`), so the returned
/// `BackendInfo.in_flight` already reflects this pick.
pub trait SelectionPolicy: Send + Sync {
    fn pick(&self, registry: &Registry) -> Result<BackendInfo, RegistryError>;

    fn name(&self) -> &'static str;
}

/// Cycles through live backends in registry insertion order.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl SelectionPolicy for RoundRobin {
    fn pick(&self, registry: &Registry) -> Result<BackendInfo, RegistryError> {
        registry.pick_round_robin()
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Always selects the live backend with the fewest in-flight requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastConnections;

impl SelectionPolicy for LeastConnections {
    fn pick(&self, registry: &Registry) -> Result<BackendInfo, RegistryError> {
        registry.pick_least_connections()
    }

    fn name(&self) -> &'static str {
        "least-connections"
    }
}

/// CLI-selected policy, chosen once at process startup (§4.3, §6).
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    RoundRobin,
    LeastConnections,
}

impl SelectionPolicy for Policy {
    fn pick(&self, registry: &Registry) -> Result<BackendInfo, RegistryError> {
        match self {
            Policy::RoundRobin => RoundRobin.pick(registry),
            Policy::LeastConnections => LeastConnections.pick(registry),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Policy::RoundRobin => RoundRobin.name(),
            Policy::LeastConnections => LeastConnections.name(),
        }
    }
}

/// Error returned when the `[r|c]` CLI argument is neither.
#[derive(Debug)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown algorithm type: '{}'", self.0)
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for Policy {
    type Err = UnknownPolicy;

    /// No argument or `r` selects round-robin; `c` selects least-connections; anything else is
    /// CLI misuse (§6, exit code 2).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "r" => Ok(Policy::RoundRobin),
            "c" => Ok(Policy::LeastConnections),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_policies() {
        assert!(matches!("r".parse::<Policy>().unwrap(), Policy::RoundRobin));
        assert!(matches!("".parse::<Policy>().unwrap(), Policy::RoundRobin));
        assert!(matches!("c".parse::<Policy>().unwrap(), Policy::LeastConnections));
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!("x".parse::<Policy>().is_err());
    }

    #[test]
    fn round_robin_fairness_over_k_n_picks() {
        let registry = Registry::new();
        registry.add("localhost", 2001).unwrap();
        registry.add("localhost", 2002).unwrap();
        registry.add("localhost", 2003).unwrap();

        let policy = Policy::RoundRobin;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..9 {
            let picked = policy.pick(&registry).unwrap();
            *counts.entry(picked.port).or_insert(0) += 1;
        }

        assert_eq!(counts.get(&2001), Some(&3));
        assert_eq!(counts.get(&2002), Some(&3));
        assert_eq!(counts.get(&2003), Some(&3));
    }
}
