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

//! CLI surface (§6, §10.3).
//!
//! The positional `[r|c]` argument keeps its exact literal contract: it is parsed as a plain
//! string and validated by hand against `Policy::from_str`, not through `clap`'s `ValueEnum`, so
//! that "anything else" always produces our own one-line usage message and exit code 2 rather
//! than a generic clap error. The remaining flags are additive (§10.3): when none are given, the
//! defaults reproduce the distilled spec's hardcoded host, port, and cache threshold exactly.

use clap::Parser;

use crate::cache::semantic::DEFAULT_THRESHOLD;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

#[derive(Parser, Debug)]
#[command(
    name = "tokenrelay",
    about = "TCP load balancer for LLM backend worker pools, with a semantic response cache",
    override_usage = "tokenrelay [r|c]"
)]
pub struct Cli {
    /// Load balancing algorithm: "r" (round-robin, default) or "c" (least-connections).
    #[arg(default_value = "")]
    pub algorithm: String,

    /// Address the balancer listens on for both backends and clients.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port the balancer listens on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of entries held by the semantic cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Minimum cosine similarity for a semantic cache hit.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub cache_threshold: f32,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}
