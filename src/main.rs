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

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;

use tokenrelay::backend::{Policy, Registry};
use tokenrelay::cache::{HashingEmbedder, SemanticCache};
use tokenrelay::config::{Cli, LogFormat};
use tokenrelay::dispatcher::{self, SharedState};
use tokenrelay::proxy::CorrelationTable;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let policy = match Policy::from_str(&cli.algorithm) {
        Ok(policy) => policy,
        Err(_) => {
            eprintln!("usage: tokenrelay [r|c]");
            return ExitCode::from(2);
        },
    };

    init_logging(cli.log_format);

    let registry = Arc::new(Registry::new());
    let cache = Arc::new(SemanticCache::new(
        Arc::new(HashingEmbedder::default()),
        cli.cache_capacity,
        cli.cache_threshold,
    ));
    let correlation = Arc::new(CorrelationTable::new());
    let state = Arc::new(SharedState::new(registry, Arc::new(policy), cache, correlation));

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    match dispatcher::serve((cli.host, cli.port), state, shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind listening socket");
            ExitCode::from(1)
        },
    }
}

fn init_logging(format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Pretty => subscriber.pretty().init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
