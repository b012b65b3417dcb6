/*
 * mod.rs
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

//! HTTP/1.1 client: one request target, one connection, kept alive on request.
//!
//! - `request`: method, header map, request head layout.
//! - `connection`: plain or TLS stream.
//! - `client`: `HttpRequest`, the connect / send / parse / redirect cycle.
//! - `body`: response body reader and request body writer.

mod body;
mod request;

pub mod client;
pub mod connection;

pub use body::{RequestBody, ResponseBody};
pub use client::{HttpRequest, TargetChange, MAX_REDIRECTS, MAX_RESPONSE_HEADERS};
pub use connection::HttpStream;
pub use request::{HeaderMap, Method, DEFAULT_CONTENT_TYPE};
