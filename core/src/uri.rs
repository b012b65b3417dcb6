/*
 * uri.rs
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

//! HTTP URL value: protocol, host, port and location (path plus query).
//! Relative references are resolved against a base the way redirects need
//! them. Component percent-encoding helpers live here too.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::UrlError;

/// Everything except unreserved characters (`A-Z a-z 0-9 - _ . ~`).
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Like `COMPONENT` but leaves path and query structure intact, including
/// existing `%` escapes.
const PATHNAME: &AsciiSet = &COMPONENT
    .remove(b'/')
    .remove(b'%')
    .remove(b'?')
    .remove(b'=')
    .remove(b'&')
    .remove(b'#')
    .remove(b'*');

/// Percent-encode everything but unreserved characters.
pub fn encode_uri_component(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

/// Decode `%XX` escapes. Malformed escapes are kept literally.
pub fn decode_uri_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Encode a path (and query) for a request line without touching its
/// separators or escapes it already carries.
pub fn smart_encode_pathname(pathname: &str) -> String {
    utf8_percent_encode(pathname, PATHNAME).to_string()
}

pub fn default_port(protocol: &str) -> Option<u16> {
    match protocol {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '~')
}

/// Collapse `.` and `..` segments in the path part of an absolute location.
/// `..` never climbs above the root.
fn remove_dot_segments(location: &str) -> String {
    let (path, query) = match location.find('?') {
        Some(q) => location.split_at(q),
        None => (location, ""),
    };
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    let mut kept: Vec<&str> = Vec::with_capacity(segments.len());
    let mut trailing_slash = false;
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => trailing_slash |= i == last,
            ".." => {
                kept.pop();
                trailing_slash |= i == last;
            }
            other => kept.push(other),
        }
    }
    let mut out = String::with_capacity(location.len());
    for segment in kept {
        out.push('/');
        out.push_str(segment);
    }
    if trailing_slash || out.is_empty() {
        out.push('/');
    }
    out.push_str(query);
    out
}

/// Protocol, lowercase host and port: two URLs with equal origins may share a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Url {
    protocol: String,
    host: String,
    port: u16,
    /// Empty, or starts with `/`.
    location: String,
}

impl Url {
    /// Parse `protocol://host[:port][/location]`.
    pub fn parse(url: &str) -> Result<Url, UrlError> {
        let proto_end = match url.find(':') {
            Some(i) if i > 0 => i,
            _ => return Err(UrlError::MissingProtocol),
        };
        let rest = url[proto_end + 1..]
            .strip_prefix("//")
            .ok_or(UrlError::InvalidFormat)?;
        let protocol = &url[..proto_end];
        if !protocol.chars().all(is_unreserved) {
            return Err(UrlError::InvalidCharacter);
        }
        let protocol = protocol.to_ascii_lowercase();

        let loc_start = rest.find('/').unwrap_or(rest.len());
        let (authority, location) = rest.split_at(loc_start);
        let (host, port) = match authority.find(':') {
            Some(i) => {
                let digits = &authority[i + 1..];
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(UrlError::InvalidPort);
                }
                let port: u32 = digits.parse().map_err(|_| UrlError::InvalidPort)?;
                let port = u16::try_from(port).map_err(|_| UrlError::InvalidPort)?;
                (&authority[..i], port)
            }
            None => (authority, default_port(&protocol).unwrap_or(0)),
        };
        if host.is_empty() {
            return Err(UrlError::MissingHost);
        }
        if !host.chars().all(|c| c == '.' || is_unreserved(c)) {
            return Err(UrlError::InvalidCharacter);
        }
        Ok(Url {
            protocol,
            host: host.to_string(),
            port,
            location: location.to_string(),
        })
    }

    /// Resolve `reference` against `base`, as for a `Location` header.
    pub fn parse_relative(base: &Url, reference: &str) -> Result<Url, UrlError> {
        if !base.is_valid() {
            return Err(UrlError::SourceInvalid);
        }
        if reference.is_empty() {
            return Ok(base.clone());
        }
        if reference.starts_with("//") {
            return Url::parse(&format!("{}:{}", base.protocol, reference));
        }
        if reference.starts_with('/') {
            return Ok(Url {
                location: remove_dot_segments(reference),
                ..base.clone()
            });
        }
        let scheme_len = reference
            .find(|c: char| !is_unreserved(c))
            .unwrap_or(reference.len());
        if reference[scheme_len..].starts_with("://") {
            return Url::parse(reference);
        }
        let base_path = match base.location.find('?') {
            Some(q) => &base.location[..q],
            None => base.location.as_str(),
        };
        if reference.starts_with('?') {
            let path = if base_path.is_empty() { "/" } else { base_path };
            return Ok(Url {
                location: format!("{}{}", path, reference),
                ..base.clone()
            });
        }
        // Relative to the base's directory.
        let dir = match base_path.rfind('/') {
            Some(slash) => &base_path[..=slash],
            None => "/",
        };
        Ok(Url {
            location: remove_dot_segments(&format!("{}{}", dir, reference)),
            ..base.clone()
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.protocol.is_empty() && !self.host.is_empty()
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Path for the request line: the location, or `/` when empty.
    pub fn request_target(&self) -> &str {
        if self.location.is_empty() {
            "/"
        } else {
            &self.location
        }
    }

    pub fn is_default_port(&self) -> bool {
        default_port(&self.protocol) == Some(self.port) || self.port == 0
    }

    pub fn origin(&self) -> Origin {
        Origin {
            protocol: self.protocol.clone(),
            host: self.host.to_ascii_lowercase(),
            port: self.port,
        }
    }
}

impl std::str::FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.host)?;
        if !self.is_default_port() {
            write!(f, ":{}", self.port)?;
        }
        f.write_str(&self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_port_by_protocol() {
        let u = Url::parse("HTTPS://Example.com/a/b?q=1").unwrap();
        assert_eq!(u.protocol(), "https");
        assert_eq!(u.host(), "Example.com");
        assert_eq!(u.port(), 443);
        assert_eq!(u.location(), "/a/b?q=1");
        assert_eq!(u.origin().host, "example.com");
        assert_eq!(Url::parse("http://h").unwrap().request_target(), "/");
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Url::parse("example.com"), Err(UrlError::MissingProtocol));
        assert_eq!(Url::parse("http:/x"), Err(UrlError::InvalidFormat));
        assert_eq!(Url::parse("http://"), Err(UrlError::MissingHost));
        assert_eq!(Url::parse("http://h:70000/"), Err(UrlError::InvalidPort));
        assert_eq!(Url::parse("http://h:8a/"), Err(UrlError::InvalidPort));
        assert_eq!(Url::parse("http://h:/"), Err(UrlError::InvalidPort));
        assert_eq!(Url::parse("http://a b/"), Err(UrlError::InvalidCharacter));
        assert_eq!(Url::parse("ht.tp://h/"), Err(UrlError::InvalidCharacter));
    }

    #[test]
    fn display_omits_default_port() {
        assert_eq!(
            Url::parse("http://h:80/x").unwrap().to_string(),
            "http://h/x"
        );
        assert_eq!(
            Url::parse("https://h:8443").unwrap().to_string(),
            "https://h:8443"
        );
    }

    #[test]
    fn relative_resolution() {
        let base = Url::parse("http://h:8080/dir/page?x").unwrap();
        assert_eq!(Url::parse_relative(&base, "").unwrap(), base);
        assert_eq!(
            Url::parse_relative(&base, "//other/y").unwrap().to_string(),
            "http://other/y"
        );
        assert_eq!(
            Url::parse_relative(&base, "/root").unwrap().to_string(),
            "http://h:8080/root"
        );
        assert_eq!(
            Url::parse_relative(&base, "https://s/z").unwrap().to_string(),
            "https://s/z"
        );
        assert_eq!(
            Url::parse_relative(&base, "next").unwrap().location(),
            "/dir/next"
        );
        assert_eq!(
            Url::parse_relative(&base, "?y=1").unwrap().location(),
            "/dir/page?y=1"
        );
        assert_eq!(
            Url::parse_relative(&base, "../up/./file").unwrap().location(),
            "/up/file"
        );
        assert_eq!(
            Url::parse_relative(&base, "/a/b/../../../c?q=../x").unwrap().location(),
            "/c?q=../x"
        );
        assert_eq!(Url::parse_relative(&base, "sub/..").unwrap().location(), "/dir/");
        let slash_query = Url::parse("http://h/a/b?next=/c/d").unwrap();
        assert_eq!(
            Url::parse_relative(&slash_query, "e").unwrap().location(),
            "/a/e"
        );
        let bare = Url::parse("http://h").unwrap();
        assert_eq!(Url::parse_relative(&bare, "?q").unwrap().location(), "/?q");
        assert_eq!(Url::parse_relative(&bare, "p").unwrap().location(), "/p");
        assert_eq!(
            Url::parse_relative(&Url::default(), "/x"),
            Err(UrlError::SourceInvalid)
        );
    }

    #[test]
    fn origin_distinguishes_port_and_protocol() {
        let a = Url::parse("http://h/").unwrap().origin();
        assert_eq!(a, Url::parse("http://H:80/other").unwrap().origin());
        assert_ne!(a, Url::parse("http://h:81/").unwrap().origin());
        assert_ne!(a, Url::parse("https://h/").unwrap().origin());
    }

    #[test]
    fn component_encoding() {
        assert_eq!(encode_uri_component("a b/c~"), "a%20b%2Fc~");
        assert_eq!(decode_uri_component("a%20b%2fc%zz"), "a b/c%zz");
        assert_eq!(smart_encode_pathname("/a b/c?d=é&e"), "/a%20b/c?d=%C3%A9&e");
    }
}
