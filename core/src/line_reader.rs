/*
 * line_reader.rs
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

//! Delimited line reader over a byte stream.
//!
//! Bytes pulled from the source past the end of the current line stay in the
//! buffer; the HTTP body reader drains them before touching the socket again.

use std::io::{self, Read};

use bytes::{Buf, BytesMut};

const READ_CHUNK: usize = 4096;

/// Line terminator convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    CrLf,
    Lf,
    Cr,
}

impl LineEnding {
    fn delimiter(self) -> &'static [u8] {
        match self {
            LineEnding::CrLf => b"\r\n",
            LineEnding::Lf => b"\n",
            LineEnding::Cr => b"\r",
        }
    }
}

#[derive(Debug)]
pub struct LineReader {
    buf: BytesMut,
    ending: LineEnding,
    max_length: usize,
    line: String,
}

impl LineReader {
    pub fn new(ending: LineEnding, max_length: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            ending,
            max_length,
            line: String::new(),
        }
    }

    /// Read the next line from `src`. `Ok(false)` when the source ended before a
    /// full line; any partial line stays buffered.
    pub fn next_line<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<bool> {
        let delim = self.ending.delimiter();
        let mut scanned = 0;
        loop {
            if let Some(pos) = find(&self.buf[scanned..], delim) {
                let end = scanned + pos;
                let raw = self.buf.split_to(end + delim.len());
                let text = std::str::from_utf8(&raw[..end]).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "line is not valid UTF-8")
                })?;
                self.line.clear();
                self.line.push_str(text);
                return Ok(true);
            }
            if self.buf.len() >= self.max_length {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line longer than {} bytes", self.max_length),
                ));
            }
            // A CR at the end may be the first half of CRLF.
            scanned = self.buf.len().saturating_sub(delim.len() - 1);
            let mut chunk = [0u8; READ_CHUNK];
            let want = (self.max_length - self.buf.len()).clamp(1, READ_CHUNK);
            let n = src.read(&mut chunk[..want])?;
            if n == 0 {
                return Ok(false);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// The line most recently returned by `next_line`, without its terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Bytes buffered past the last line.
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    /// Move up to `out.len()` buffered bytes into `out`.
    pub fn take_remaining(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        n
    }

    /// Forget buffered bytes and the current line, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.line.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
