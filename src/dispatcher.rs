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

//! Accepts inbound connections, classifies their first frame, and routes each one to either the
//! registration handler or the client proxy (§4.1).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::backend::heartbeat;
use crate::backend::registry::Registry;
use crate::backend::SelectionPolicy;
use crate::cache::SemanticCache;
use crate::error::{DispatchError, RegistrationError};
use crate::proxy::{session, CorrelationTable};
use crate::wire::{parse_register_frame, REGISTER_PREFIX};
use crate::MAX_DATA_SIZE;

/// Deadline for a new connection's first frame, per §4.1.
const INITIAL_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared, process-wide state threaded explicitly through every accepted connection, per the
/// "process-wide singletons, constructed once" guidance of §9.
pub struct SharedState {
    pub registry: Arc<Registry>,
    pub policy: Arc<dyn SelectionPolicy>,
    pub cache: Arc<SemanticCache>,
    pub correlation: Arc<CorrelationTable>,
    /// Count of connections currently being dispatched (registration, heartbeat, or proxy), for
    /// observability only (§5). A relaxed atomic is enough: nothing ever branches on its value.
    pub active_connections: AtomicU64,
}

impl SharedState {
    pub fn new(
        registry: Arc<Registry>, policy: Arc<dyn SelectionPolicy>, cache: Arc<SemanticCache>,
        correlation: Arc<CorrelationTable>,
    ) -> Self {
        SharedState {
            registry,
            policy,
            cache,
            correlation,
            active_connections: AtomicU64::new(0),
        }
    }
}

/// Binds `addr` and accepts connections until the listener itself fails or the process is asked
/// to shut down.
pub async fn serve(addr: (String, u16), state: Arc<SharedState>, shutdown: tokio::sync::broadcast::Receiver<()>) -> std::io::Result<()> {
    let listener = TcpListener::bind((addr.0.as_str(), addr.1)).await?;
    tracing::info!(host = %addr.0, port = addr.1, "load balancer listening");
    serve_on(listener, state, shutdown).await
}

/// Same as [`serve`], but over a listener the caller already bound — lets tests bind an ephemeral
/// port and learn its address before handing the listener off to the accept loop.
pub async fn serve_on(
    listener: TcpListener, state: Arc<SharedState>, mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                tracing::debug!(%peer, "accepted connection");
                let state = state.clone();
                tokio::spawn(async move {
                    dispatch(socket, state).await;
                });
            },
            _ = shutdown.recv() => {
                tracing::info!("dispatcher shutting down, listening socket closed");
                return Ok(());
            },
        }
    }
}

/// Reads and classifies the first frame of a freshly-accepted connection, then hands it off to
/// the appropriate handler. Dispatch ownership transfers fully to that handler; this function
/// never returns control to a caller that still expects to use `socket`.
async fn dispatch(mut socket: TcpStream, state: Arc<SharedState>) {
    let count = state.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::trace!(active_connections = count, "connection dispatched");

    let frame = match read_initial_frame(&mut socket).await {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "closing connection: failed to read initial frame");
            state.active_connections.fetch_sub(1, Ordering::Relaxed);
            return;
        },
    };

    // Classification (§4.1) is decided on the trimmed text, since `REGISTER|...` frames are
    // themselves line-oriented, but the literal bytes of a client's opening message must survive
    // untouched: they are cached/embedded/forwarded exactly as sent, same as every later chunk
    // the forward pump reads off the same connection (§4.4, §6).
    if frame.trimmed.starts_with(REGISTER_PREFIX) {
        if let Err(e) = handle_registration(socket, &frame.trimmed, state.clone()).await {
            tracing::debug!(error = %e, "registration handler terminated");
        }
    } else {
        handle_client(socket, frame.raw, state.clone()).await;
    }

    state.active_connections.fetch_sub(1, Ordering::Relaxed);
}

/// The first frame of a freshly-accepted connection, kept in two forms: `raw` is the literal
/// decoded bytes, used verbatim as the connection's first client chunk; `trimmed` is used only to
/// classify the connection and to parse a registration frame (§4.1, §4.2).
struct InitialFrame {
    raw: String,
    trimmed: String,
}

async fn read_initial_frame(socket: &mut TcpStream) -> Result<InitialFrame, DispatchError> {
    let mut buf = vec![0u8; MAX_DATA_SIZE];
    let n = tokio::time::timeout(INITIAL_FRAME_TIMEOUT, socket.read(&mut buf))
        .await
        .map_err(|_| DispatchError::Timeout)??;

    if n == 0 {
        return Err(DispatchError::EmptyRead);
    }

    let raw = std::str::from_utf8(&buf[..n])?.to_string();
    let trimmed = raw.trim().to_string();
    Ok(InitialFrame { raw, trimmed })
}

/// Handles a classified registration frame (§4.2): validates it, replies, registers the backend,
/// and then blocks in the heartbeat loop on the same connection until the backend goes silent.
async fn handle_registration(
    mut socket: TcpStream, frame: &str, state: Arc<SharedState>,
) -> Result<(), RegistrationError> {
    use tokio::io::AsyncWriteExt;

    let parsed = match parse_register_frame(frame) {
        Some(parsed) => parsed,
        None => {
            tracing::warn!(%frame, "invalid register message");
            socket.write_all(b"INVALID REGISTER MESSAGE").await?;
            return Err(RegistrationError::Malformed);
        },
    };

    // A duplicate (host, port) is a malformed registration (§3 I1, §4.2): same reply and closure
    // as a frame with the wrong field count, not a silent drop.
    if let Err(e) = state.registry.add(parsed.host.clone(), parsed.port) {
        tracing::warn!(host = %parsed.host, port = parsed.port, "invalid register message: duplicate backend");
        socket.write_all(b"INVALID REGISTER MESSAGE").await?;
        return Err(e.into());
    }
    socket.write_all(b"REGISTERED").await?;
    tracing::info!(host = %parsed.host, port = parsed.port, "backend registered");

    heartbeat::run(socket, state.registry.clone(), parsed.host, parsed.port).await;
    Ok(())
}

/// Handles a classified client connection (§4.4): picks a backend and launches the proxy session.
/// `NoBackendsAvailable` closes the client with no reply, as does a dial failure — the client
/// protocol has no error payloads (§7).
///
/// The classification read (§4.1) already consumed the client's first chunk; it is replayed,
/// byte-for-byte, through the session's forward path rather than discarded, so that a client's
/// opening message is not silently dropped (see DESIGN.md for why this departs from the distilled
/// spec's literal phrasing, which is silent on the point). `read_initial_frame` guarantees this
/// text is non-empty, so it is always forwarded — including a whitespace-only message, which is a
/// real request under §4.4's byte-for-byte framing, not something to discard.
async fn handle_client(socket: TcpStream, first_chunk: String, state: Arc<SharedState>) {
    let backend_info = match state.policy.pick(&state.registry) {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(error = %e, "no backend available, closing client");
            return;
        },
    };

    session::run_with_initial_chunk(
        socket,
        Some(first_chunk),
        backend_info,
        state.registry.clone(),
        state.cache.clone(),
        state.correlation.clone(),
    )
    .await;
}
