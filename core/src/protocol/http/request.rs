/*
 * request.rs
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

//! HTTP/1.1 request pieces: method, header map, request head serialization.

use std::fmt::Write as _;

use crate::uri::Url;

/// Default body type for requests that send one without saying what it is.
pub const DEFAULT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Head,
    Delete,
    Trace,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Head => "HEAD",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header fields in insertion order with case-insensitive names.
///
/// `set` replaces an existing field in place, so emission order is the order
/// names were first set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replace the value of `name` in place, or add it at the end.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Everything that goes into one request head.
pub(crate) struct RequestHead<'a> {
    pub method: Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub user_agent: &'a str,
    pub has_body: bool,
    pub cookie: Option<&'a str>,
}

impl RequestHead<'_> {
    /// Request line, `Host`, caller headers, defaults, `Cookie`, blank line.
    pub fn serialize(&self) -> String {
        let mut head = String::with_capacity(256);
        let _ = write!(
            head,
            "{} {} HTTP/1.1\r\nHost: {}",
            self.method.as_str(),
            self.url.request_target(),
            self.url.host()
        );
        if !self.url.is_default_port() {
            let _ = write!(head, ":{}", self.url.port());
        }
        head.push_str("\r\n");
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("Host") {
                continue;
            }
            let _ = write!(head, "{}: {}\r\n", name, value);
        }
        if !self.headers.contains("User-Agent") {
            let _ = write!(head, "User-Agent: {}\r\n", self.user_agent);
        }
        if self.has_body && !self.headers.contains("Content-Type") {
            let _ = write!(head, "Content-Type: {}\r\n", DEFAULT_CONTENT_TYPE);
        }
        if let Some(cookie) = self.cookie {
            let _ = write!(head, "Cookie: {}\r\n", cookie);
        }
        head.push_str("\r\n");
        head
    }
}
