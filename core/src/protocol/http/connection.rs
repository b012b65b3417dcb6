/*
 * connection.rs
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

//! One live HTTP connection: plain TCP or TLS.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use crate::error::SocketError;
use crate::socket::TcpSocket;
use crate::tls::TlsSession;

/// Unified stream: plain TCP or TLS. Implements Read + Write.
#[derive(Debug)]
pub enum HttpStream {
    Plain(TcpSocket),
    Tls(TlsSession),
}

impl HttpStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, HttpStream::Tls(_))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            HttpStream::Plain(s) => s.is_valid(),
            HttpStream::Tls(s) => s.is_valid(),
        }
    }

    pub fn close(&mut self) {
        match self {
            HttpStream::Plain(s) => s.close(),
            HttpStream::Tls(s) => s.close(),
        }
    }

    pub fn last_error(&self) -> SocketError {
        match self {
            HttpStream::Plain(s) => s.last_error(),
            HttpStream::Tls(s) => s.last_error(),
        }
    }

    pub fn tls_error(&self) -> Option<&rustls::Error> {
        match self {
            HttpStream::Plain(_) => None,
            HttpStream::Tls(s) => s.last_tls_error(),
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            HttpStream::Plain(s) => s.peer_addr(),
            HttpStream::Tls(s) => s.socket().peer_addr(),
        }
    }
}

impl Read for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            HttpStream::Plain(s) => s.receive(buf),
            HttpStream::Tls(s) => s.receive(buf),
        }
    }
}

impl Write for HttpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            HttpStream::Plain(s) => s.send(buf),
            HttpStream::Tls(s) => s.send(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
