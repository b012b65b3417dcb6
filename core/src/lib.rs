/*
 * lib.rs
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

//! Strada core: a blocking-style HTTP/1.1 client over non-blocking sockets.
//!
//! Layers, leaves first: `sys` (libc socket and poll glue), `retry` (the
//! readiness-retry loop), `socket` (plain TCP with timeouts), `net` (shared
//! TLS context), `tls` (TLS session and handshake), `line_reader`, `uri`,
//! `cookie`, and `protocol::http` (request orchestration and body adapters).

pub mod config;
pub mod cookie;
pub mod error;
pub mod line_reader;
pub mod net;
pub mod protocol;
pub mod retry;
pub mod socket;
mod sys;
pub mod tls;
pub mod uri;

pub use config::TransportConfig;
pub use cookie::{Cookie, CookieJar};
pub use error::{AcceptError, ConfigError, ConnectError, HttpError, SocketError, UrlError};
pub use net::TlsContext;
pub use protocol::http::{HttpRequest, Method};
pub use socket::{TcpListener, TcpSocket};
pub use tls::TlsSession;
pub use uri::Url;
