/*
 * cookie.rs
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

//! Cookies: `Set-Cookie` parsing, the suitability rules applied when building
//! a request, and a name-keyed jar that persists as JSON.
//!
//! Times are unix seconds.

use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uri::Url;

/// Date layouts accepted in `Expires`, tried in order after whitespace is collapsed.
const EXPIRES_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %d %H:%M:%S %Y",
];

pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

fn parse_expires(value: &str) -> Option<i64> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    EXPIRES_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(&normalized, fmt)
            .ok()
            .map(|dt| dt.and_utc().timestamp())
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    name: String,
    value: String,
    creation: i64,
    /// Absolute expiry from `Expires`; `None` never expires.
    expiry: Option<i64>,
    /// Lifetime in seconds from `Max-Age`, counted from `creation`.
    max_age: Option<i64>,
    domain: String,
    path: String,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            creation: unix_now(),
            expiry: None,
            max_age: None,
            domain: String::new(),
            path: String::new(),
            secure: false,
            http_only: false,
        }
    }

    /// Parse a `Set-Cookie` value. `None` when there is no `name=value` pair.
    pub fn parse(header: &str) -> Option<Cookie> {
        Self::parse_at(header, unix_now())
    }

    /// Parse with an explicit creation time.
    pub fn parse_at(header: &str, now: i64) -> Option<Cookie> {
        let header = header.trim();
        let mut parts = header.split(';');
        let pair = parts.next()?;
        let (name, value) = pair.split_once('=')?;
        if name.is_empty() {
            return None;
        }
        let mut cookie = Cookie::new(name, value);
        cookie.creation = now;

        for attr in parts {
            let attr = attr.trim_start_matches([' ', '\t']);
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k, v),
                None => (attr, ""),
            };
            if key.eq_ignore_ascii_case("Secure") {
                cookie.secure = true;
            } else if key.eq_ignore_ascii_case("HttpOnly") {
                cookie.http_only = true;
            } else if key.eq_ignore_ascii_case("Path") {
                if val.starts_with('/') {
                    // Prefix matching needs "/app", not "/app/".
                    let trimmed = if val.len() > 1 {
                        val.strip_suffix('/').unwrap_or(val)
                    } else {
                        val
                    };
                    cookie.path = trimmed.to_string();
                }
            } else if key.eq_ignore_ascii_case("Domain") {
                if !val.is_empty() {
                    cookie.domain = val.strip_prefix('.').unwrap_or(val).to_ascii_lowercase();
                }
            } else if key.eq_ignore_ascii_case("Max-Age") {
                let digits: String = val.chars().take_while(char::is_ascii_digit).collect();
                if let Ok(age) = digits.parse::<i64>() {
                    cookie.max_age = Some(age);
                }
            } else if key.eq_ignore_ascii_case("Expires") {
                if let Some(at) = parse_expires(val) {
                    cookie.expiry = Some(at);
                }
            }
        }
        Some(cookie)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn expiry(&self) -> Option<i64> {
        self.expiry
    }

    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn set_domain(&mut self, domain: &str) {
        self.domain = domain.trim_start_matches('.').to_ascii_lowercase();
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = path.to_string();
    }

    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    pub fn set_expiry(&mut self, expiry: Option<i64>) {
        self.expiry = expiry;
    }

    pub fn set_max_age(&mut self, max_age: Option<i64>) {
        self.max_age = max_age;
    }

    /// Not yet expired, by `Expires` and by `Max-Age`.
    pub fn is_valid(&self, now: i64) -> bool {
        self.expiry.map_or(true, |at| now < at)
            && self.max_age.map_or(true, |age| now - self.creation < age)
    }

    /// Whether the cookie may be sent to `url`.
    pub fn is_suitable_for(&self, url: &Url) -> bool {
        if self.secure && !url.protocol().eq_ignore_ascii_case("https") {
            return false;
        }
        if !self.domain.is_empty() && !url.host().to_ascii_lowercase().ends_with(&self.domain) {
            return false;
        }
        if self.path.is_empty() || self.path == "/" {
            return true;
        }
        url.location().starts_with(&self.path)
    }
}

/// Cookies keyed by name; a new cookie replaces an older one of the same name.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<String, Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Set-Cookie` value and store it. False if it did not parse.
    pub fn parse_and_put_cookie(&mut self, header: &str) -> bool {
        match Cookie::parse(header) {
            Some(cookie) => {
                self.put_cookie(cookie);
                true
            }
            None => false,
        }
    }

    pub fn put_cookie(&mut self, cookie: Cookie) {
        self.cookies.insert(cookie.name.clone(), cookie);
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(Cookie::value)
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Cookie> {
        self.cookies.remove(name)
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    /// Value for a `Cookie` request header: every valid cookie suitable for
    /// `url` as `name=value`, joined by `"; "`, in name order. `None` if none match.
    pub fn cookie_header(&self, url: &Url, now: i64) -> Option<String> {
        let mut matching: Vec<&Cookie> = self
            .cookies
            .values()
            .filter(|c| c.is_valid(now) && c.is_suitable_for(url))
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        let pairs: Vec<String> = matching
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        Some(pairs.join("; "))
    }

    /// Serialize the cookies still valid at `now`.
    pub fn to_json(&self, now: i64) -> serde_json::Result<String> {
        let mut live: Vec<&Cookie> = self.cookies.values().filter(|c| c.is_valid(now)).collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::to_string(&live)
    }

    /// Load a jar written by `to_json`, dropping cookies that expired since.
    pub fn from_json(json: &str, now: i64) -> serde_json::Result<CookieJar> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)?;
        let mut jar = CookieJar::new();
        for cookie in cookies.into_iter().filter(|c| c.is_valid(now)) {
            jar.put_cookie(cookie);
        }
        Ok(jar)
    }
}
