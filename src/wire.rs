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

//! Wire framing helpers.
//!
//! The protocol is unlengthed, newline-free text: one read of up to `MAX_DATA_SIZE` bytes is one
//! logical message (§6). This module only ever parses bytes that have already been read off the
//! socket; it never itself touches I/O.

/// Literal prefix that marks a connection's first frame as a backend registration (§4.1).
pub const REGISTER_PREFIX: &str = "REGISTER|";

/// A parsed `REGISTER|<host>|<port>` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFrame {
    pub host: String,
    pub port: u16,
}

/// Parses a registration frame. Requires exactly three `|`-delimited fields and a valid `u16`
/// port; anything else is malformed (§4.2).
pub fn parse_register_frame(frame: &str) -> Option<RegisterFrame> {
    let mut parts = frame.split('|');
    let literal = parts.next()?;
    let host = parts.next()?;
    let port = parts.next()?;
    if literal != "REGISTER" || parts.next().is_some() {
        return None;
    }
    if host.is_empty() {
        return None;
    }

    let port = port.parse::<u16>().ok()?;
    Some(RegisterFrame {
        host: host.to_string(),
        port,
    })
}

/// Splits a `<request_id>|<payload>` frame on the first `|`. Used for both directions of the
/// balancer-backend protocol (§6): forward framing is constructed, not parsed, by the caller;
/// reverse frames are parsed here.
pub fn split_correlated_frame(frame: &str) -> Option<(&str, &str)> {
    frame.split_once('|')
}

/// Builds the forward frame `"<request_id>|<payload>"` sent to a backend.
pub fn build_correlated_frame(request_id: &str, payload: &str) -> String {
    format!("{}|{}", request_id, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_register_frame() {
        let parsed = parse_register_frame("REGISTER|localhost|2001").unwrap();
        assert_eq!(parsed, RegisterFrame {
            host: "localhost".to_string(),
            port: 2001,
        });
    }

    #[test]
    fn rejects_missing_field() {
        assert!(parse_register_frame("REGISTER|localhost").is_none());
    }

    #[test]
    fn rejects_extra_field() {
        assert!(parse_register_frame("REGISTER|localhost|2001|extra").is_none());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse_register_frame("REGISTER|localhost|notaport").is_none());
    }

    #[test]
    fn splits_correlated_frame_on_first_pipe_only() {
        let (id, payload) = split_correlated_frame("abcd-1234|hello|world").unwrap();
        assert_eq!(id, "abcd-1234");
        assert_eq!(payload, "hello|world");
    }

    #[test]
    fn missing_pipe_is_malformed() {
        assert_eq!(split_correlated_frame("no-separator-here"), None);
    }

    #[test]
    fn round_trips_build_and_split() {
        let frame = build_correlated_frame("req-1", "hello");
        assert_eq!(split_correlated_frame(&frame), Some(("req-1", "hello")));
    }
}
