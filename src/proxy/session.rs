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
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::backend::registry::{BackendInfo, Registry};
use crate::cache::SemanticCache;
use crate::error::ProxyError;
use crate::proxy::correlation::CorrelationTable;
use crate::wire::{build_correlated_frame, split_correlated_frame};
use crate::MAX_DATA_SIZE;

/// Runs one proxied client connection end to end (§4.4): dials the chosen backend, then drives
/// the forward and reverse pumps concurrently until either terminates, at which point the whole
/// session tears down — the other pump is cancelled, the backend's `in_flight` is decremented
/// exactly once, and any correlation entries this session never got a response for are dropped.
pub async fn run(
    client: TcpStream, backend_info: BackendInfo, registry: Arc<Registry>, cache: Arc<SemanticCache>,
    correlation: Arc<CorrelationTable>,
) {
    run_with_initial_chunk(client, None, backend_info, registry, cache, correlation).await
}

/// Same as [`run`], but with a chunk already read off the client socket (by the dispatcher's
/// classification read, §4.1) replayed through the forward path before the pump starts reading
/// fresh data. Without this, a client's very first message would be silently consumed by
/// classification and never reach a backend or the cache.
pub async fn run_with_initial_chunk(
    client: TcpStream, initial_chunk: Option<String>, backend_info: BackendInfo, registry: Arc<Registry>,
    cache: Arc<SemanticCache>, correlation: Arc<CorrelationTable>,
) {
    let backend_stream = match TcpStream::connect((backend_info.host.as_str(), backend_info.port)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(host = %backend_info.host, port = backend_info.port, error = %e, "failed to dial backend");
            registry.release(&backend_info.host, backend_info.port);
            return;
        },
    };

    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend_stream.into_split();
    let client_write = Arc::new(AsyncMutex::new(client_write));

    // Ids this session has emitted to the backend but not yet seen a response for. Used to clean
    // up the correlation table if the session ends before a response arrives (§4.4, §4.6).
    let session_ids: Arc<SyncMutex<Vec<String>>> = Arc::new(SyncMutex::new(Vec::new()));

    let mut forward_handle = tokio::spawn(forward_pump(
        client_read,
        initial_chunk,
        backend_write,
        client_write.clone(),
        cache.clone(),
        correlation.clone(),
        session_ids.clone(),
    ));
    let mut reverse_handle = tokio::spawn(reverse_pump(
        backend_read,
        client_write,
        cache,
        correlation.clone(),
        session_ids.clone(),
    ));

    tokio::select! {
        result = &mut forward_handle => {
            reverse_handle.abort();
            log_pump_result("forward", result);
        },
        result = &mut reverse_handle => {
            forward_handle.abort();
            log_pump_result("reverse", result);
        },
    }

    for request_id in session_ids.lock().drain(..) {
        correlation.forget(&request_id);
    }

    registry.release(&backend_info.host, backend_info.port);
    tracing::debug!(host = %backend_info.host, port = backend_info.port, "proxy session closed");
}

fn log_pump_result(which: &str, result: Result<Result<(), ProxyError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::debug!(pump = which, "pump reached eof"),
        Ok(Err(e)) => tracing::debug!(pump = which, error = %e, "pump terminated with error"),
        Err(e) if e.is_cancelled() => {},
        Err(e) => tracing::warn!(pump = which, error = %e, "pump task panicked"),
    }
}

/// Client → backend, with cache interception (§4.4). A cache hit is written straight back to the
/// client and the request is never forwarded; a miss is framed with a fresh correlation id and
/// sent on to the backend.
async fn forward_pump(
    mut client_read: OwnedReadHalf, initial_chunk: Option<String>, mut backend_write: OwnedWriteHalf,
    client_write: Arc<AsyncMutex<OwnedWriteHalf>>, cache: Arc<SemanticCache>, correlation: Arc<CorrelationTable>,
    session_ids: Arc<SyncMutex<Vec<String>>>,
) -> Result<(), ProxyError> {
    if let Some(chunk) = initial_chunk {
        handle_forward_chunk(&chunk, &mut backend_write, &client_write, &cache, &correlation, &session_ids).await?;
    }

    let mut buf = vec![0u8; MAX_DATA_SIZE];
    loop {
        let n = client_read.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let chunk = std::str::from_utf8(&buf[..n])?;
        handle_forward_chunk(chunk, &mut backend_write, &client_write, &cache, &correlation, &session_ids).await?;
    }
}

async fn handle_forward_chunk(
    chunk: &str, backend_write: &mut OwnedWriteHalf, client_write: &Arc<AsyncMutex<OwnedWriteHalf>>,
    cache: &Arc<SemanticCache>, correlation: &Arc<CorrelationTable>, session_ids: &Arc<SyncMutex<Vec<String>>>,
) -> Result<(), ProxyError> {
    if let Some(response) = cache.get(chunk) {
        tracing::debug!("cache hit, short-circuiting request");
        let mut writer = client_write.lock().await;
        writer.write_all(response.as_bytes()).await?;
    } else {
        let request_id = correlation.insert(chunk);
        session_ids.lock().push(request_id.clone());

        tracing::debug!(%request_id, "cache miss, forwarding to backend");
        let framed = build_correlated_frame(&request_id, chunk);
        backend_write.write_all(framed.as_bytes()).await?;
    }
    Ok(())
}

/// Backend → client, with cache insertion (§4.4). Every frame must carry its correlation id; a
/// frame with no `|` separator is a protocol violation and terminates the session.
async fn reverse_pump(
    mut backend_read: OwnedReadHalf, client_write: Arc<AsyncMutex<OwnedWriteHalf>>, cache: Arc<SemanticCache>,
    correlation: Arc<CorrelationTable>, session_ids: Arc<SyncMutex<Vec<String>>>,
) -> Result<(), ProxyError> {
    let mut buf = vec![0u8; MAX_DATA_SIZE];
    loop {
        let n = backend_read.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let chunk = std::str::from_utf8(&buf[..n])?;
        let (request_id, response_payload) =
            split_correlated_frame(chunk).ok_or(ProxyError::MalformedReverseFrame)?;

        if let Some(original_text) = correlation.take(request_id) {
            session_ids.lock().retain(|id| id != request_id);
            tracing::debug!(%request_id, "caching response for original request");
            cache.add(&original_text, response_payload);
        }

        let mut writer = client_write.lock().await;
        writer.write_all(response_payload.as_bytes()).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::HashingEmbedder;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn spawn_echo_backend() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; MAX_DATA_SIZE];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let frame = std::str::from_utf8(&buf[..n]).unwrap();
                let (id, payload) = split_correlated_frame(frame).unwrap();
                let reply = build_correlated_frame(id, &payload.to_uppercase());
                if socket.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn cache_miss_round_trips_through_backend() {
        let (backend_addr, _backend) = spawn_echo_backend().await;

        let registry = Arc::new(Registry::new());
        registry.add(backend_addr.ip().to_string(), backend_addr.port()).unwrap();
        let backend_info = registry.snapshot().remove(0);

        let cache = Arc::new(SemanticCache::new(Arc::new(HashingEmbedder::new(64)), 8, 0.95));
        let correlation = Arc::new(CorrelationTable::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();

        let registry_clone = registry.clone();
        let cache_clone = cache.clone();
        let correlation_clone = correlation.clone();
        tokio::spawn(async move {
            let (client, _) = listener.accept().await.unwrap();
            run(client, backend_info, registry_clone, cache_clone, correlation_clone).await;
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();

        let mut buf = vec![0u8; MAX_DATA_SIZE];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"HELLO");

        // The response must now be cached under the *original* request text.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("hello"), Some("HELLO".to_string()));
    }

    #[tokio::test]
    async fn cache_hit_never_touches_the_backend() {
        let (backend_addr, _backend) = spawn_echo_backend().await;

        let registry = Arc::new(Registry::new());
        registry.add(backend_addr.ip().to_string(), backend_addr.port()).unwrap();
        let backend_info = registry.snapshot().remove(0);

        let cache = Arc::new(SemanticCache::new(Arc::new(HashingEmbedder::new(64)), 8, 0.95));
        cache.add("hello", "world");
        let correlation = Arc::new(CorrelationTable::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (client, _) = listener.accept().await.unwrap();
            run(client, backend_info, registry, cache, correlation).await;
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();

        let mut buf = vec![0u8; MAX_DATA_SIZE];
        let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        // Comes straight from the cache, not the echo backend's upper-cased reply.
        assert_eq!(&buf[..n], b"world");
    }
}
