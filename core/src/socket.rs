/*
 * socket.rs
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

//! Plain TCP socket primitive over a non-blocking descriptor, with per-call
//! connect/read/write timeouts and a queryable last error. Also a listener
//! whose accept is bounded by the same kind of timeout.

use std::io::{self, Read, Write};
use std::net::{self, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use tracing::trace;

use crate::config::TransportConfig;
use crate::error::{ConnectError, SocketError};
use crate::retry::{self, Operation, RetryError, Step, WantedOp};
use crate::sys;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Completes a connect started with `sys::start_connect`.
struct ConnectPending {
    waited: bool,
}

impl Operation<TcpStream> for ConnectPending {
    type Output = ();

    fn apply(&mut self, stream: &mut TcpStream) -> Step<()> {
        if !self.waited {
            self.waited = true;
            return Step::WantWrite;
        }
        match stream.take_error() {
            Ok(Some(err)) | Err(err) => return Step::Failed(err.into()),
            Ok(None) => {}
        }
        match stream.peer_addr() {
            Ok(_) => Step::Done(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Step::WantWrite,
            Err(e) => Step::Failed(e.into()),
        }
    }
}

struct ReadOp<'a> {
    buf: &'a mut [u8],
}

impl Operation<TcpStream> for ReadOp<'_> {
    type Output = usize;

    fn apply(&mut self, stream: &mut TcpStream) -> Step<usize> {
        loop {
            if let Some(step) = retry::step_from_io(stream.read(self.buf), WantedOp::Read) {
                return step;
            }
        }
    }
}

struct WriteOp<'a> {
    buf: &'a [u8],
}

impl Operation<TcpStream> for WriteOp<'_> {
    type Output = usize;

    fn apply(&mut self, stream: &mut TcpStream) -> Step<usize> {
        loop {
            if let Some(step) = retry::step_from_io(stream.write(self.buf), WantedOp::Write) {
                return step;
            }
        }
    }
}

/// Non-blocking TCP socket presenting blocking-looking calls.
///
/// Owned by exactly one connection holder; moves, never copies.
#[derive(Debug)]
pub struct TcpSocket {
    stream: Option<TcpStream>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    last_error: SocketError,
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpSocket {
    /// Unconnected socket with the default timeouts (connect 10 s, read and write 2 s).
    pub fn new() -> Self {
        Self {
            stream: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_IO_TIMEOUT),
            write_timeout: Some(DEFAULT_IO_TIMEOUT),
            last_error: SocketError::NoError,
        }
    }

    /// Unconnected socket taking its timeouts from `config`.
    pub fn with_config(config: &TransportConfig) -> Self {
        Self {
            stream: None,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            last_error: SocketError::NoError,
        }
    }

    pub(crate) fn from_accepted(stream: TcpStream, template: &TcpSocket) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: Some(stream),
            connect_timeout: template.connect_timeout,
            read_timeout: template.read_timeout,
            write_timeout: template.write_timeout,
            last_error: SocketError::NoError,
        })
    }

    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.connect_timeout = timeout;
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Connect to `addr`, waiting at most the connect timeout. Any previous
    /// connection is closed first.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), ConnectError> {
        self.close();
        let mut stream = sys::nonblocking_stream(&addr).map_err(|e| self.fail_connect(e))?;
        let connected = sys::start_connect(stream.as_raw_fd(), &addr)
            .map_err(|e| self.fail_connect(e))?;
        if !connected {
            let mut op = ConnectPending { waited: false };
            match retry::retry(&mut stream, &mut op, self.connect_timeout) {
                Ok(()) => {}
                Err(RetryError::TimedOut(_)) => {
                    self.last_error = SocketError::TimedOut;
                    trace!(%addr, "connect timed out");
                    return Err(ConnectError::TimedOut);
                }
                Err(e) => return Err(self.fail_connect(e.into_io())),
            }
        }
        trace!(%addr, "connected");
        self.last_error = SocketError::NoError;
        self.stream = Some(stream);
        Ok(())
    }

    fn fail_connect(&mut self, err: io::Error) -> ConnectError {
        self.last_error = SocketError::from(&err);
        if self.last_error == SocketError::TimedOut {
            ConnectError::TimedOut
        } else {
            ConnectError::Socket(err)
        }
    }

    /// Receive up to `buf.len()` bytes; `Ok(0)` means the peer closed the stream.
    pub fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.read_timeout;
        let stream = self.stream_or_err()?;
        let mut op = ReadOp { buf };
        let result = retry::retry(stream, &mut op, timeout);
        self.record(result)
    }

    /// Send some prefix of `buf`, returning how many bytes were written.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let timeout = self.write_timeout;
        let stream = self.stream_or_err()?;
        let mut op = WriteOp { buf };
        let result = retry::retry(stream, &mut op, timeout);
        self.record(result)
    }

    fn stream_or_err(&mut self) -> io::Result<&mut TcpStream> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    fn record(&mut self, result: Result<usize, RetryError>) -> io::Result<usize> {
        match result {
            Ok(n) => Ok(n),
            Err(RetryError::TimedOut(_)) => {
                self.last_error = SocketError::TimedOut;
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
            Err(e) => {
                let err = e.into_io();
                self.last_error = SocketError::from(&err);
                Err(err)
            }
        }
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(net::Shutdown::Both);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.stream.is_some()
    }

    pub fn last_error(&self) -> SocketError {
        self.last_error
    }

    pub(crate) fn set_last_error(&mut self, err: SocketError) {
        self.last_error = err;
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Descriptor for callers polling from their own event loop.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub(crate) fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }
}

impl Read for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.receive(buf)
    }
}

impl Write for TcpSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Accept;

impl Operation<net::TcpListener> for Accept {
    type Output = (TcpStream, SocketAddr);

    fn apply(&mut self, listener: &mut net::TcpListener) -> Step<Self::Output> {
        loop {
            if let Some(step) = retry::step_from_io(listener.accept(), WantedOp::Read) {
                return step;
            }
        }
    }
}

/// Non-blocking listening socket; `accept` waits at most the accept timeout.
#[derive(Debug)]
pub struct TcpListener {
    inner: net::TcpListener,
    template: TcpSocket,
    last_error: SocketError,
}

impl TcpListener {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = net::TcpListener::bind(addr)?;
        inner.set_nonblocking(true)?;
        Ok(Self {
            inner,
            template: TcpSocket::new(),
            last_error: SocketError::NoError,
        })
    }

    /// Accept timeout; accepted sockets inherit all three timeouts.
    pub fn set_accept_timeout(&mut self, timeout: Option<Duration>) {
        self.template.set_connect_timeout(timeout);
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.template.set_read_timeout(timeout);
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.template.set_write_timeout(timeout);
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept one connection. A timeout yields `ErrorKind::TimedOut` and
    /// `last_error() == SocketError::TimedOut`.
    pub fn accept(&mut self) -> io::Result<(TcpSocket, SocketAddr)> {
        let timeout = self.template.connect_timeout;
        match retry::retry(&mut self.inner, &mut Accept, timeout) {
            Ok((stream, addr)) => {
                self.last_error = SocketError::NoError;
                Ok((TcpSocket::from_accepted(stream, &self.template)?, addr))
            }
            Err(RetryError::TimedOut(_)) => {
                self.last_error = SocketError::TimedOut;
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
            Err(e) => {
                let err = e.into_io();
                self.last_error = SocketError::from(&err);
                Err(err)
            }
        }
    }

    pub fn last_error(&self) -> SocketError {
        self.last_error
    }
}
