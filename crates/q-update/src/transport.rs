// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HTTP transport capability
//!
//! The updater only ever issues GET requests and consumes the body as a
//! stream of chunks. Platforms plug in their HTTP stack through
//! [`HttpClient`]; response bodies are pushed into a [`ChunkSink`].

use core::time::Duration;

use q_common::Error;

/// Consumer of a streamed response body
pub trait ChunkSink {
    /// Accept the next body chunk
    ///
    /// Returning an error aborts the transfer; the client must pass that
    /// error back to its caller unchanged.
    fn accept(&mut self, chunk: &[u8]) -> Result<(), Error>;
}

impl<F> ChunkSink for F
where
    F: FnMut(&[u8]) -> Result<(), Error>,
{
    fn accept(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self(chunk)
    }
}

/// Blocking HTTP GET capability
pub trait HttpClient {
    /// Fetch `url`, streaming the body into `sink`
    ///
    /// # Errors
    ///
    /// - `Error::HttpStatus(code)` for a non-2xx response
    /// - `Error::NetworkTimeout` when `timeout` elapses
    /// - `Error::ConnectFailed` when the host cannot be reached
    /// - any error returned by `sink`
    fn get(&mut self, url: &str, timeout: Duration, sink: &mut dyn ChunkSink) -> Result<(), Error>;
}

/// URL scheme accepted by the updater
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// TLS
    Https,
    /// Plain text (development only)
    Http,
}

/// Check that `url` is absolute with a supported scheme and a host
///
/// Plain `http` is accepted only when `allow_insecure` is set.
///
/// # Errors
///
/// `Error::InvalidUrl` otherwise.
pub fn check_url(url: &str, allow_insecure: bool) -> Result<Scheme, Error> {
    let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (Scheme::Https, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        if !allow_insecure {
            return Err(Error::InvalidUrl);
        }
        (Scheme::Http, rest)
    } else {
        return Err(Error::InvalidUrl);
    };

    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() || host.starts_with(':') || host.contains(char::is_whitespace) {
        return Err(Error::InvalidUrl);
    }
    Ok(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        assert_eq!(check_url("https://ota.local/m.json", false), Ok(Scheme::Https));
        assert_eq!(check_url("https://ota.local:8443", false), Ok(Scheme::Https));
    }

    #[test]
    fn test_http_gated() {
        assert_eq!(check_url("http://10.0.0.2/m.json", false), Err(Error::InvalidUrl));
        assert_eq!(check_url("http://10.0.0.2/m.json", true), Ok(Scheme::Http));
    }

    #[test]
    fn test_malformed_rejected() {
        for bad in ["", "ota.local/m.json", "ftp://h/m", "https://", "https:///m.json", "https://a b/"] {
            assert_eq!(check_url(bad, true), Err(Error::InvalidUrl), "{bad}");
        }
    }

    #[test]
    fn test_closure_is_a_sink() {
        let mut total = 0usize;
        let mut sink = |chunk: &[u8]| {
            total += chunk.len();
            Ok::<(), Error>(())
        };
        sink.accept(b"abcd").unwrap();
        sink.accept(b"ef").unwrap();
        assert_eq!(total, 6);
    }
}
