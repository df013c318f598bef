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
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::backend::registry::Registry;
use crate::MAX_DATA_SIZE;

/// Deadline for a single heartbeat read, per §4.2.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the heartbeat loop for one registered backend's control connection.
///
/// Any non-empty read within the deadline is treated as a liveness signal (the content is
/// informational and otherwise discarded). A timeout, EOF, or any read error evicts the backend
/// and returns. This does not tear down proxy sessions already using the backend — they terminate
/// independently on their own stream errors (§4.2, §4.6).
pub async fn run(mut socket: TcpStream, registry: Arc<Registry>, host: String, port: u16) {
    tracing::info!(%host, port, "started heartbeat listener");

    let mut buf = vec![0u8; MAX_DATA_SIZE];
    loop {
        match tokio::time::timeout(HEARTBEAT_TIMEOUT, socket.read(&mut buf)).await {
            Ok(Ok(0)) => {
                tracing::info!(%host, port, "backend connection closed");
                break;
            },
            Ok(Ok(n)) => {
                tracing::debug!(%host, port, bytes = n, "received heartbeat");
            },
            Ok(Err(e)) => {
                tracing::warn!(%host, port, error = %e, "heartbeat read error");
                break;
            },
            Err(_) => {
                tracing::warn!(%host, port, "timed out waiting for heartbeat");
                break;
            },
        }
    }

    registry.remove(&host, port);
    tracing::info!(%host, port, "backend evicted from registry");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn eof_evicts_the_backend() {
        let registry = Arc::new(Registry::new());
        registry.add("127.0.0.1", 9001).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = TcpStream::connect(addr).await.unwrap();
        let server_side = accept.await.unwrap();

        drop(client); // triggers EOF on the server side

        run(server_side, registry.clone(), "127.0.0.1".to_string(), 9001).await;

        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn nonempty_read_keeps_backend_alive_until_next_timeout() {
        let registry = Arc::new(Registry::new());
        registry.add("127.0.0.1", 9002).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let mut client = TcpStream::connect(addr).await.unwrap();
        let server_side = accept.await.unwrap();

        let heartbeat = tokio::spawn(run(server_side, registry.clone(), "127.0.0.1".to_string(), 9002));

        use tokio::io::AsyncWriteExt;
        client.write_all(b"ping").await.unwrap();
        // Give the heartbeat task a moment to observe the read before we tear things down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.snapshot().len(), 1);

        drop(client);
        heartbeat.await.unwrap();
        assert!(registry.snapshot().is_empty());
    }
}
