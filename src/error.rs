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
use thiserror::Error;

/// Errors raised while mutating or querying the backend registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No live backends to select from.
    #[error("no backends available")]
    NoBackendsAvailable,

    /// A registration attempted to reuse a `(host, port)` pair already held by a live backend.
    #[error("backend {0}:{1} is already registered")]
    DuplicateBackend(String, u16),
}

/// Errors raised while classifying or reading the very first frame of a new connection.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No data arrived within the initial-frame deadline.
    #[error("timed out waiting for initial frame")]
    Timeout,

    /// The peer closed the connection before sending anything.
    #[error("connection closed before sending a frame")]
    EmptyRead,

    /// The frame could not be decoded as UTF-8 text.
    #[error("failed to decode frame as utf-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// Underlying I/O failure while reading the frame.
    #[error("i/o error reading initial frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that terminate a registration handshake.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The `REGISTER|<host>|<port>` frame did not have exactly three fields, or the port was not
    /// a valid `u16`.
    #[error("invalid register message")]
    Malformed,

    /// The registry rejected the registration (duplicate host/port).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Underlying I/O failure while writing the handshake reply.
    #[error("i/o error during registration: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that terminate a proxied client session.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// No backend was available to serve the session.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Dialing the chosen backend failed.
    #[error("failed to dial backend {0}:{1}: {2}")]
    Dial(String, u16, std::io::Error),

    /// A reverse (backend-to-client) frame had no `|` separator.
    #[error("malformed reverse frame: missing '|' separator")]
    MalformedReverseFrame,

    /// A chunk could not be decoded as UTF-8 text.
    #[error("failed to decode chunk as utf-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// Underlying I/O failure on either leg of the proxied connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
