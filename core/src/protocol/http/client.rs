/*
 * client.rs
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

//! HTTP/1.1 request orchestrator.
//!
//! `HttpRequest` owns at most one live connection. `perform` connects (or
//! reuses the kept-alive connection to the same origin), writes the request
//! head, and unless the caller streams a body, parses the response and
//! follows redirects up to `MAX_REDIRECTS` requests.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::cookie::{unix_now, CookieJar};
use crate::error::{ConnectError, HttpError, SocketError};
use crate::line_reader::{LineEnding, LineReader};
use crate::net::TlsContext;
use crate::protocol::http::body::{RequestBody, ResponseBody};
use crate::protocol::http::connection::HttpStream;
use crate::protocol::http::request::{HeaderMap, Method, RequestHead};
use crate::socket::TcpSocket;
use crate::tls::TlsSession;
use crate::uri::{Origin, Url};

/// Requests sent by one `perform` call, redirects included.
pub const MAX_REDIRECTS: usize = 16;
/// Response header lines accepted per response.
pub const MAX_RESPONSE_HEADERS: usize = 256;

/// What `set_target` did to the live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    /// Same origin on a kept-alive connection; the next `perform` reuses it.
    Kept,
    /// Origin changed on a kept-alive connection; it was closed.
    Dropped,
    /// No kept-alive connection was involved.
    Unaffected,
}

fn lock(jar: &Mutex<CookieJar>) -> MutexGuard<'_, CookieJar> {
    jar.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One request target plus the connection and response state around it.
///
/// Not reentrant: use one instance per thread, or lock around it.
pub struct HttpRequest {
    url: Url,
    method: Method,
    config: TransportConfig,
    request_headers: HeaderMap,
    response_headers: HeaderMap,
    stream: Option<HttpStream>,
    connection_origin: Option<Origin>,
    reader: LineReader,
    response_code: u16,
    status: String,
    got_response: bool,
    does_output: bool,
    does_input: bool,
    follows_location: bool,
    keep_alive: bool,
    /// The last response announced `Connection: close`.
    peer_closing: bool,
    cookie_jar: Option<Arc<Mutex<CookieJar>>>,
    tls_context: Option<TlsContext>,
    connections_opened: usize,
    socket_error: SocketError,
    tls_error: Option<rustls::Error>,
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url.to_string())
            .field("method", &self.method)
            .field("response_code", &self.response_code)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl HttpRequest {
    pub fn new(url: Url) -> Self {
        Self::with_config(url, TransportConfig::default())
    }

    pub fn with_config(url: Url, config: TransportConfig) -> Self {
        let mut request_headers = HeaderMap::new();
        request_headers.set("Connection", "close");
        let reader = LineReader::new(LineEnding::CrLf, config.max_line_length);
        Self {
            url,
            method: Method::Get,
            config,
            request_headers,
            response_headers: HeaderMap::new(),
            stream: None,
            connection_origin: None,
            reader,
            response_code: 0,
            status: String::new(),
            got_response: false,
            does_output: false,
            does_input: true,
            follows_location: true,
            keep_alive: false,
            peer_closing: false,
            cookie_jar: None,
            tls_context: None,
            connections_opened: 0,
            socket_error: SocketError::NoError,
            tls_error: None,
        }
    }

    pub fn parse(url: &str) -> Result<Self, HttpError> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Send the request and, unless a body is to be streamed, read the
    /// response head, following redirects when enabled.
    pub fn perform(&mut self) -> Result<(), HttpError> {
        for hop in 0..MAX_REDIRECTS {
            self.ensure_connection()?;
            self.send_request_head()?;
            if self.does_output {
                return Ok(());
            }
            self.receive_response()?;
            let next = match self.redirect_target()? {
                Some(next) => next,
                None => return Ok(()),
            };
            debug!(hop, code = self.response_code, to = %next, "following redirect");
            self.discard_redirect_body();
            self.set_target(next);
        }
        warn!(limit = MAX_REDIRECTS, url = %self.url, "too many redirects");
        self.disconnect();
        Err(HttpError::TooManyRedirects {
            limit: MAX_REDIRECTS,
        })
    }

    fn redirect_target(&self) -> Result<Option<Url>, HttpError> {
        if !self.follows_location || !(300..400).contains(&self.response_code) {
            return Ok(None);
        }
        let Some(location) = self.response_headers.get("Location") else {
            return Ok(None);
        };
        Url::parse_relative(&self.url, location)
            .map(Some)
            .map_err(|source| HttpError::InvalidRedirect {
                location: location.to_string(),
                source,
            })
    }

    /// Leave a kept-alive connection positioned after the redirect response.
    fn discard_redirect_body(&mut self) {
        if !self.reuses_connection() || self.stream.is_none() {
            return;
        }
        if self.unsupported_transfer_encoding().is_some() {
            self.disconnect();
            return;
        }
        let Some(len) = self.body_length() else {
            self.disconnect();
            return;
        };
        let drained = {
            let mut body = ResponseBody::new(self, Some(len));
            io::copy(&mut body, &mut io::sink())
        };
        if !matches!(drained, Ok(n) if n == len) {
            self.disconnect();
        }
    }

    /// Point the request at `url`. On a kept-alive connection to a different
    /// origin the connection is closed here, so the next `perform` opens a
    /// fresh one.
    pub fn set_target(&mut self, url: Url) -> TargetChange {
        let live = self.stream.is_some();
        let same_origin = self.connection_origin.as_ref() == Some(&url.origin());
        let change = if !live || !self.reuses_connection() {
            TargetChange::Unaffected
        } else if same_origin {
            TargetChange::Kept
        } else {
            self.disconnect();
            TargetChange::Dropped
        };
        self.url = url;
        self.reset_response();
        change
    }

    pub fn set_url(&mut self, url: &str) -> Result<TargetChange, HttpError> {
        Ok(self.set_target(Url::parse(url)?))
    }

    fn ensure_connection(&mut self) -> Result<(), HttpError> {
        let origin = self.url.origin();
        let live = self.stream.as_ref().map_or(false, HttpStream::is_valid);
        if self.reuses_connection() && live && self.connection_origin.as_ref() == Some(&origin) {
            trace!(%origin, "reusing connection");
            return Ok(());
        }
        self.disconnect();

        let tls = match origin.protocol.as_str() {
            "http" => false,
            "https" => true,
            other => return Err(HttpError::UnsupportedProtocol(other.to_string())),
        };
        let host = self.url.host().to_string();
        let addrs = (host.as_str(), self.url.port())
            .to_socket_addrs()
            .map_err(|source| HttpError::Resolve {
                host: host.clone(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            let attempt = if tls {
                self.open_tls(addr, &host)
            } else {
                self.open_plain(addr)
            };
            match attempt {
                Ok(stream) => {
                    debug!(%origin, %addr, "connected");
                    self.stream = Some(stream);
                    self.connection_origin = Some(origin);
                    self.connections_opened += 1;
                    self.peer_closing = false;
                    self.reader.reset();
                    return Ok(());
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    // The server answered; another address will not fix a TLS failure.
                    let stop = e.is_tls();
                    last_err = Some(e);
                    if stop {
                        break;
                    }
                }
            }
        }
        match last_err {
            Some(source) => Err(HttpError::Connect { host, source }),
            None => Err(HttpError::Resolve {
                host,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
            }),
        }
    }

    fn open_plain(&mut self, addr: SocketAddr) -> Result<HttpStream, ConnectError> {
        let mut socket = TcpSocket::with_config(&self.config);
        match socket.connect(addr) {
            Ok(()) => Ok(HttpStream::Plain(socket)),
            Err(e) => {
                self.socket_error = socket.last_error();
                Err(e)
            }
        }
    }

    fn open_tls(&mut self, addr: SocketAddr, host: &str) -> Result<HttpStream, ConnectError> {
        let context = self
            .tls_context
            .clone()
            .unwrap_or_else(TlsContext::client_default);
        let mut session = TlsSession::with_config(context, &self.config);
        match session.connect(addr, host) {
            Ok(()) => Ok(HttpStream::Tls(session)),
            Err(e) => {
                self.socket_error = session.last_error();
                self.tls_error = session.last_tls_error().cloned();
                Err(e)
            }
        }
    }

    fn send_request_head(&mut self) -> Result<(), HttpError> {
        self.reset_response();
        let cookie = self
            .cookie_jar
            .as_ref()
            .and_then(|jar| lock(jar).cookie_header(&self.url, unix_now()));
        let head = RequestHead {
            method: self.method,
            url: &self.url,
            headers: &self.request_headers,
            user_agent: &self.config.user_agent,
            has_body: self.does_output,
            cookie: cookie.as_deref(),
        }
        .serialize();
        trace!(method = %self.method, url = %self.url, len = head.len(), "sending request head");
        let stream = self.stream.as_mut().ok_or(HttpError::NotConnected)?;
        if let Err(e) = stream.write_all(head.as_bytes()) {
            warn!(error = %e, "request send failed");
            self.disconnect();
            return Err(HttpError::Send(e));
        }
        Ok(())
    }

    /// Parse the status line and headers. A second call after success does
    /// nothing. On failure the connection is closed and no response state is kept.
    pub fn receive_response(&mut self) -> Result<(), HttpError> {
        if self.got_response {
            return Ok(());
        }
        match self.read_response_head() {
            Ok(()) => {
                self.got_response = true;
                self.peer_closing = self
                    .response_headers
                    .get("Connection")
                    .map_or(false, |v| {
                        v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close"))
                    });
                debug!(code = self.response_code, status = %self.status, "response received");
                if !self.reuses_connection() && !self.does_input {
                    self.disconnect();
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "response parsing failed");
                self.reset_response();
                self.disconnect();
                Err(e)
            }
        }
    }

    fn read_response_head(&mut self) -> Result<(), HttpError> {
        self.response_headers.clear();
        let stream = self.stream.as_mut().ok_or(HttpError::NotConnected)?;
        if !self.reader.next_line(stream).map_err(HttpError::Receive)? {
            return Err(HttpError::ConnectionClosed);
        }
        let line = self.reader.line();
        if !line.starts_with("HTTP/1.") {
            return Err(HttpError::MissingHttpPrefix(line.to_string()));
        }
        let rest = match line.split_once(' ') {
            Some((_, rest)) => rest,
            None => return Err(HttpError::MalformedStatusLine(line.to_string())),
        };
        let (code, status) = rest
            .split_once(' ')
            .ok_or_else(|| HttpError::MalformedStatusLine(line.to_string()))?;
        self.response_code = code
            .parse()
            .map_err(|_| HttpError::MalformedStatusLine(line.to_string()))?;
        self.status = status.to_string();

        let mut count = 0;
        loop {
            if !self.reader.next_line(stream).map_err(HttpError::Receive)? {
                return Err(HttpError::ConnectionClosed);
            }
            let line = self.reader.line();
            if line.is_empty() {
                return Ok(());
            }
            count += 1;
            if count > MAX_RESPONSE_HEADERS {
                return Err(HttpError::TooManyHeaders {
                    max: MAX_RESPONSE_HEADERS,
                });
            }
            let (name, value) = match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => (name.trim(), value.trim()),
                _ => return Err(HttpError::MalformedHeader(line.to_string())),
            };
            // Cookies only ever go to the jar.
            if name.eq_ignore_ascii_case("Set-Cookie") {
                if let Some(jar) = &self.cookie_jar {
                    if !lock(jar).parse_and_put_cookie(value) {
                        debug!(value, "ignoring malformed Set-Cookie");
                    }
                }
                continue;
            }
            // A repeated field keeps its last value.
            self.response_headers.set(name, value);
        }
    }

    /// Reader over the response body. Parses the response first if a
    /// streamed request body was just finished.
    pub fn response_body(&mut self) -> Result<ResponseBody<'_>, HttpError> {
        if !self.does_input {
            return Err(HttpError::NoResponseBody);
        }
        self.receive_response()?;
        if let Some(encoding) = self.unsupported_transfer_encoding() {
            return Err(HttpError::UnsupportedTransferEncoding(encoding));
        }
        let length = self.body_length();
        Ok(ResponseBody::new(self, length))
    }

    /// Writer for the request body, after `perform` with `does_output` set.
    pub fn request_body(&mut self) -> Result<RequestBody<'_>, HttpError> {
        if !self.does_output || self.stream.is_none() {
            return Err(HttpError::NotConnected);
        }
        Ok(RequestBody::new(self))
    }

    fn unsupported_transfer_encoding(&self) -> Option<String> {
        self.response_headers
            .get("Transfer-Encoding")
            .filter(|te| !te.eq_ignore_ascii_case("identity"))
            .map(str::to_string)
    }

    /// Body size the response framing implies, if known.
    fn body_length(&self) -> Option<u64> {
        let bodiless = self.method == Method::Head
            || self.response_code == 204
            || self.response_code == 304
            || (100..200).contains(&self.response_code);
        if bodiless {
            Some(0)
        } else {
            self.content_length()
        }
    }

    /// Bytes already buffered past the response head first, then the connection.
    pub(crate) fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.reader.remaining().is_empty() {
            return Ok(self.reader.take_remaining(buf));
        }
        match self.stream.as_mut() {
            Some(stream) => stream.read(buf),
            None => Ok(0),
        }
    }

    pub(crate) fn write_raw(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.write(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// Close the connection now. The next `perform` reconnects.
    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            self.socket_error = stream.last_error();
            if let Some(e) = stream.tls_error() {
                self.tls_error = Some(e.clone());
            }
            stream.close();
            trace!(origin = ?self.connection_origin, "connection closed");
        }
        self.connection_origin = None;
        self.reader.reset();
    }

    fn reset_response(&mut self) {
        self.got_response = false;
        self.response_code = 0;
        self.status.clear();
        self.response_headers.clear();
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn has_response(&self) -> bool {
        self.got_response
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(name)
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Declared `Content-Length` of the response.
    pub fn content_length(&self) -> Option<u64> {
        self.response_headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn has_content_length(&self) -> bool {
        self.content_length().is_some()
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name)
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Set a request header. `Host` always comes from the URL and is ignored here.
    pub fn set_request_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("Host") {
            return;
        }
        self.request_headers.set(name, value);
    }

    pub fn remove_request_header(&mut self, name: &str) -> Option<String> {
        self.request_headers.remove(name)
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.request_headers.set("Content-Type", content_type);
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.request_headers.set("Content-Length", length.to_string());
    }

    pub fn set_follows_location(&mut self, follow: bool) {
        self.follows_location = follow;
    }

    pub fn follows_location(&self) -> bool {
        self.follows_location
    }

    /// The caller will stream a request body after `perform`.
    pub fn set_does_output(&mut self, output: bool) {
        self.does_output = output;
    }

    pub fn does_output(&self) -> bool {
        self.does_output
    }

    /// The caller will read a response body.
    pub fn set_does_input(&mut self, input: bool) {
        self.does_input = input;
    }

    pub fn does_input(&self) -> bool {
        self.does_input
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.request_headers.set("Connection", value);
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Keep-alive was requested and the server did not announce a close.
    pub(crate) fn reuses_connection(&self) -> bool {
        self.keep_alive && !self.peer_closing
    }

    pub fn set_cookie_jar(&mut self, jar: Option<Arc<Mutex<CookieJar>>>) {
        self.cookie_jar = jar;
    }

    pub fn cookie_jar(&self) -> Option<&Arc<Mutex<CookieJar>>> {
        self.cookie_jar.as_ref()
    }

    /// TLS context for https connections; the process default when unset.
    pub fn set_tls_context(&mut self, context: Option<TlsContext>) {
        self.tls_context = context;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.as_ref().map_or(false, HttpStream::is_valid)
    }

    /// Connections opened over the life of this request.
    pub fn connections_opened(&self) -> usize {
        self.connections_opened
    }

    /// Last socket error on the current or most recent connection.
    pub fn socket_error(&self) -> SocketError {
        self.stream
            .as_ref()
            .map_or(self.socket_error, HttpStream::last_error)
    }

    /// Last TLS error on the current or most recent connection.
    pub fn tls_error(&self) -> Option<&rustls::Error> {
        self.stream
            .as_ref()
            .and_then(HttpStream::tls_error)
            .or(self.tls_error.as_ref())
    }
}
