/*
 * body.rs
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

//! Body adapters bound to an `HttpRequest`: a reader for the response body
//! and a writer for a streamed request body.

use std::io::{self, Read, Write};

use tracing::trace;

use crate::protocol::http::client::HttpRequest;

/// Response body reader, bounded by `Content-Length` when the response has one.
///
/// Without a declared length it reads until the connection ends.
pub struct ResponseBody<'a> {
    request: &'a mut HttpRequest,
    position: u64,
    length: Option<u64>,
    keep_alive: bool,
    finished: bool,
}

impl<'a> ResponseBody<'a> {
    pub(crate) fn new(request: &'a mut HttpRequest, length: Option<u64>) -> Self {
        let keep_alive = request.reuses_connection();
        Self {
            request,
            position: 0,
            length,
            keep_alive,
            finished: false,
        }
    }

    /// Bytes read so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Declared body length, if any.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Fraction of the declared length read so far; `None` when unknown.
    pub fn progress(&self) -> Option<f64> {
        self.length.map(|len| {
            if len == 0 {
                1.0
            } else {
                self.position as f64 / len as f64
            }
        })
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        trace!(read = self.position, "response body complete");
        if !self.keep_alive {
            self.request.disconnect();
        }
    }
}

impl Read for ResponseBody<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let want = match self.length {
            Some(len) => {
                let left = len.saturating_sub(self.position);
                if left == 0 {
                    self.finish();
                    return Ok(0);
                }
                usize::try_from(left).unwrap_or(usize::MAX).min(buf.len())
            }
            None => buf.len(),
        };
        if self.finished {
            return Ok(0);
        }
        let n = self.request.read_raw(&mut buf[..want])?;
        self.position += n as u64;
        if n == 0 {
            self.finish();
            if let Some(len) = self.length {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {} of {} body bytes", self.position, len),
                ));
            }
        } else if self.length == Some(self.position) {
            self.finish();
        }
        Ok(n)
    }
}

/// Streams a request body straight to the connection.
pub struct RequestBody<'a> {
    request: &'a mut HttpRequest,
    position: u64,
}

impl<'a> RequestBody<'a> {
    pub(crate) fn new(request: &'a mut HttpRequest) -> Self {
        Self {
            request,
            position: 0,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Write for RequestBody<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.request.write_raw(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
