/*
 * config.rs
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

//! Transport configuration: socket and handshake timeouts, default
//! User-Agent, line length limit. Loadable from JSON; every field is optional
//! and a `null` timeout means "wait forever".

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_user_agent() -> String {
    format!("Strada/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
    /// Sent when the request does not set its own `User-Agent`.
    pub user_agent: String,
    /// Longest status or header line accepted, CRLF included.
    pub max_line_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: Some(10_000),
            read_timeout_ms: Some(2_000),
            write_timeout_ms: Some(2_000),
            handshake_timeout_ms: Some(10_000),
            user_agent: default_user_agent(),
            max_line_length: 8192,
        }
    }
}

impl TransportConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }
}
