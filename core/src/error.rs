/*
 * error.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Strada, a blocking-style HTTP/1.1 client library.
 *
 * Strada is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Strada is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Strada.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Socket, TLS, URL and HTTP errors.
//!
//! Connect outcomes keep "timed out" apart from hard socket errors, and TLS
//! failures apart from both, so callers can tell an unreachable server from a
//! slow one from one that rejected the handshake.

use std::io;

use thiserror::Error;

/// Last error recorded by a socket, queryable after any failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketError {
    #[default]
    NoError,
    WouldBlock,
    AddressInUse,
    ConnectionRefused,
    AlreadyConnected,
    TimedOut,
    NetworkUnreachable,
    TlsError,
    Unknown,
}

impl From<&io::Error> for SocketError {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => SocketError::WouldBlock,
            io::ErrorKind::AddrInUse => SocketError::AddressInUse,
            io::ErrorKind::ConnectionRefused => SocketError::ConnectionRefused,
            io::ErrorKind::TimedOut => SocketError::TimedOut,
            _ => match err.raw_os_error() {
                Some(libc::EISCONN) => SocketError::AlreadyConnected,
                Some(libc::ENETUNREACH) | Some(libc::EHOSTUNREACH) => {
                    SocketError::NetworkUnreachable
                }
                _ => SocketError::Unknown,
            },
        }
    }
}

/// Outcome of a failed plain or TLS connect.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The session has no client TLS configuration to connect with.
    #[error("socket not initialized for connecting")]
    NotInitialized,

    #[error("connect timed out")]
    TimedOut,

    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// Handshake rejected or certificate verification failed.
    #[error("TLS error: {0}")]
    Tls(#[source] rustls::Error),

    /// The handshake did not complete within the handshake timeout.
    #[error("TLS handshake timed out")]
    HandshakeTimedOut,
}

impl ConnectError {
    /// True when the server was reached but the TLS layer failed or stalled.
    pub fn is_tls(&self) -> bool {
        matches!(self, ConnectError::Tls(_) | ConnectError::HandshakeTimedOut)
    }
}

/// Outcome of a failed server-side TLS accept.
#[derive(Debug, Error)]
pub enum AcceptError {
    #[error("accepted socket is not valid")]
    InvalidSocket,

    #[error("TLS context has no server configuration")]
    InvalidContext,

    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[source] rustls::Error),

    #[error("TLS handshake timed out")]
    HandshakeTimedOut,
}

/// Errors building a TLS context (trust store or server identity).
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("no certificate found in {0}")]
    NoCertificate(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("rejected certificate: {0}")]
    Certificate(String),

    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// URL parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("missing protocol")]
    MissingProtocol,
    #[error("invalid URL format")]
    InvalidFormat,
    #[error("missing host")]
    MissingHost,
    #[error("invalid port")]
    InvalidPort,
    #[error("invalid character")]
    InvalidCharacter,
    #[error("base URL is not valid")]
    SourceInvalid,
}

/// Errors from `HttpRequest::perform` and response parsing.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),

    #[error("cannot resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("connect to {host} failed: {source}")]
    Connect { host: String, source: ConnectError },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("no live connection")]
    NotConnected,

    #[error("connection closed before the response head was complete")]
    ConnectionClosed,

    #[error("response does not start with HTTP/1.: {0:?}")]
    MissingHttpPrefix(String),

    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("more than {max} response headers")]
    TooManyHeaders { max: usize },

    #[error("gave up after {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("cannot follow redirect to {location:?}: {source}")]
    InvalidRedirect { location: String, source: UrlError },

    #[error("unsupported transfer encoding {0:?}")]
    UnsupportedTransferEncoding(String),

    #[error("request does not expect a response body")]
    NoResponseBody,
}

/// Errors loading a `TransportConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_error_from_io_kind() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(SocketError::from(&refused), SocketError::ConnectionRefused);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(SocketError::from(&timed_out), SocketError::TimedOut);
        let unreachable = io::Error::from_raw_os_error(libc::ENETUNREACH);
        assert_eq!(
            SocketError::from(&unreachable),
            SocketError::NetworkUnreachable
        );
    }

    #[test]
    fn tls_connect_errors_are_classified() {
        assert!(ConnectError::HandshakeTimedOut.is_tls());
        assert!(!ConnectError::TimedOut.is_tls());
        assert!(!ConnectError::Socket(io::Error::from(io::ErrorKind::ConnectionRefused)).is_tls());
    }
}
