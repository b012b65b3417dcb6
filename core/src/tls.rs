/*
 * tls.rs
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

//! TLS session over the non-blocking socket primitive.
//!
//! rustls is driven by hand: records move between the connection and the
//! socket with `read_tls`/`write_tls`, and every step that cannot make
//! progress reports want-read or want-write to the shared retry loop. The
//! handshake can also be stepped from an external event loop through
//! `resume_handshake`/`resume_accept`.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, ServerConnection};
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::error::{AcceptError, ConnectError, SocketError};
use crate::net::TlsContext;
use crate::retry::{self, Failure, Operation, RetryError, Step, WantedOp};
use crate::socket::TcpSocket;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Uninitialized,
    /// Handshake started, possibly suspended on want-read/want-write.
    Connecting,
    Established,
    Closing,
    Closed,
}

enum TlsConnKind {
    Client(ClientConnection),
    Server(ServerConnection),
}

impl TlsConnKind {
    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        match self {
            TlsConnKind::Client(c) => c.read_tls(rd),
            TlsConnKind::Server(c) => c.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        match self {
            TlsConnKind::Client(c) => c.write_tls(wr),
            TlsConnKind::Server(c) => c.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> Result<(), rustls::Error> {
        match self {
            TlsConnKind::Client(c) => c.process_new_packets().map(|_| ()),
            TlsConnKind::Server(c) => c.process_new_packets().map(|_| ()),
        }
    }

    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            TlsConnKind::Client(c) => c.reader(),
            TlsConnKind::Server(c) => c.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            TlsConnKind::Client(c) => c.writer(),
            TlsConnKind::Server(c) => c.writer(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            TlsConnKind::Client(c) => c.wants_write(),
            TlsConnKind::Server(c) => c.wants_write(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match self {
            TlsConnKind::Client(c) => c.is_handshaking(),
            TlsConnKind::Server(c) => c.is_handshaking(),
        }
    }

    fn send_close_notify(&mut self) {
        match self {
            TlsConnKind::Client(c) => c.send_close_notify(),
            TlsConnKind::Server(c) => c.send_close_notify(),
        }
    }
}

/// The TLS state and the socket it runs over, borrowed together for one operation.
struct TlsIo<'a> {
    conn: &'a mut TlsConnKind,
    stream: &'a mut TcpStream,
}

impl AsRawFd for TlsIo<'_> {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl TlsIo<'_> {
    /// Push pending records to the socket. `None` once nothing is left to send.
    fn flush<T>(&mut self) -> Option<Step<T>> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut *self.stream) {
                Ok(0) => {
                    return Some(Step::Failed(Failure::Io(io::Error::from(
                        io::ErrorKind::WriteZero,
                    ))))
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Some(Step::WantWrite),
                Err(e) => return Some(Step::Failed(e.into())),
            }
        }
        None
    }

    /// Read one batch of records and process them. `Ok(false)` on transport EOF.
    fn fill<T>(&mut self) -> Result<bool, Step<T>> {
        loop {
            match self.conn.read_tls(&mut *self.stream) {
                Ok(n) => {
                    if let Err(e) = self.conn.process_new_packets() {
                        // Let the peer see our alert if the socket takes it.
                        let _ = self.flush::<()>();
                        return Err(Step::Failed(Failure::Tls(e)));
                    }
                    return Ok(n > 0);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Step::WantRead),
                Err(e) => return Err(Step::Failed(e.into())),
            }
        }
    }
}

struct Handshake;

impl Operation<TlsIo<'_>> for Handshake {
    type Output = ();

    fn apply(&mut self, io: &mut TlsIo<'_>) -> Step<()> {
        loop {
            if let Some(step) = io.flush() {
                return step;
            }
            if !io.conn.is_handshaking() {
                return Step::Done(());
            }
            match io.fill() {
                Ok(true) => {}
                Ok(false) => {
                    return Step::Failed(Failure::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed during TLS handshake",
                    )))
                }
                Err(step) => return step,
            }
        }
    }
}

struct TlsRead<'b> {
    buf: &'b mut [u8],
}

impl Operation<TlsIo<'_>> for TlsRead<'_> {
    type Output = usize;

    fn apply(&mut self, io: &mut TlsIo<'_>) -> Step<usize> {
        if self.buf.is_empty() {
            return Step::Done(0);
        }
        loop {
            match io.conn.reader().read(self.buf) {
                Ok(n) => return Step::Done(n),
                // Transport closed without close_notify: treat as end of stream.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Step::Done(0),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Step::Failed(e.into()),
            }
            if let Some(step) = io.flush() {
                return step;
            }
            if let Err(step) = io.fill() {
                return step;
            }
        }
    }
}

struct TlsWrite<'b> {
    buf: &'b [u8],
    accepted: Option<usize>,
}

impl Operation<TlsIo<'_>> for TlsWrite<'_> {
    type Output = usize;

    fn apply(&mut self, io: &mut TlsIo<'_>) -> Step<usize> {
        let accepted = match self.accepted {
            Some(n) => n,
            None => match io.conn.writer().write(self.buf) {
                Ok(n) => {
                    self.accepted = Some(n);
                    n
                }
                Err(e) => return Step::Failed(e.into()),
            },
        };
        match io.flush() {
            Some(step) => step,
            None => Step::Done(accepted),
        }
    }
}

struct Shutdown {
    sent: bool,
}

impl Operation<TlsIo<'_>> for Shutdown {
    type Output = ();

    fn apply(&mut self, io: &mut TlsIo<'_>) -> Step<()> {
        if !self.sent {
            io.conn.send_close_notify();
            self.sent = true;
        }
        match io.flush() {
            Some(step) => step,
            None => Step::Done(()),
        }
    }
}

enum HandshakeFailure {
    TimedOut,
    Socket(io::Error),
    Tls(rustls::Error),
}

/// TLS client or server session owning its socket.
///
/// The rustls connection and the socket live and die together: the session is
/// valid only while both are present.
pub struct TlsSession {
    socket: TcpSocket,
    context: TlsContext,
    conn: Option<TlsConnKind>,
    handshake_timeout: Option<Duration>,
    state: HandshakeState,
    last_tls_error: Option<rustls::Error>,
    last_wanted: WantedOp,
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("socket", &self.socket)
            .field("state", &self.state)
            .field("last_tls_error", &self.last_tls_error)
            .field("last_wanted", &self.last_wanted)
            .finish()
    }
}

impl TlsSession {
    pub fn new(context: TlsContext) -> Self {
        Self {
            socket: TcpSocket::new(),
            context,
            conn: None,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            state: HandshakeState::Uninitialized,
            last_tls_error: None,
            last_wanted: WantedOp::None,
        }
    }

    pub fn with_config(context: TlsContext, config: &TransportConfig) -> Self {
        let mut session = Self::new(context);
        session.socket = TcpSocket::with_config(config);
        session.handshake_timeout = config.handshake_timeout();
        session
    }

    pub fn set_handshake_timeout(&mut self, timeout: Option<Duration>) {
        self.handshake_timeout = timeout;
    }

    /// Socket timeouts and last error live on the underlying socket.
    pub fn socket(&self) -> &TcpSocket {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut TcpSocket {
        &mut self.socket
    }

    pub fn context(&self) -> &TlsContext {
        &self.context
    }

    /// TCP connect to `addr`, then run the client handshake for `server_name`
    /// within the handshake timeout.
    pub fn connect(&mut self, addr: SocketAddr, server_name: &str) -> Result<(), ConnectError> {
        self.close();
        self.last_tls_error = None;
        self.last_wanted = WantedOp::None;
        self.state = HandshakeState::Uninitialized;
        let config = self
            .context
            .client_config()
            .ok_or(ConnectError::NotInitialized)?;
        let name = ServerName::try_from(server_name)
            .map(|name| name.to_owned())
            .map_err(|_| ConnectError::InvalidServerName(server_name.to_string()))?;
        self.socket.connect(addr)?;
        match ClientConnection::new(config, name) {
            Ok(conn) => self.conn = Some(TlsConnKind::Client(conn)),
            Err(e) => {
                self.socket.close();
                return Err(ConnectError::Tls(e));
            }
        }
        self.state = HandshakeState::Connecting;
        match self.drive_handshake(self.handshake_timeout) {
            Ok(()) => {
                debug!(%addr, server_name, "TLS handshake complete");
                Ok(())
            }
            Err(failure) => {
                let err = match failure {
                    HandshakeFailure::TimedOut => ConnectError::HandshakeTimedOut,
                    HandshakeFailure::Socket(e) => ConnectError::Socket(e),
                    HandshakeFailure::Tls(e) => ConnectError::Tls(e),
                };
                warn!(%addr, server_name, error = %err, "TLS connect failed");
                self.abort();
                Err(err)
            }
        }
    }

    /// Take over an accepted plain socket and run the server handshake.
    pub fn accept(&mut self, socket: TcpSocket) -> Result<(), AcceptError> {
        self.close();
        self.last_tls_error = None;
        self.last_wanted = WantedOp::None;
        if !socket.is_valid() {
            return Err(AcceptError::InvalidSocket);
        }
        let config = self
            .context
            .server_config()
            .ok_or(AcceptError::InvalidContext)?;
        let conn = ServerConnection::new(config).map_err(AcceptError::Tls)?;
        self.socket = socket;
        self.conn = Some(TlsConnKind::Server(conn));
        self.state = HandshakeState::Connecting;
        match self.drive_handshake(self.handshake_timeout) {
            Ok(()) => {
                debug!(peer = ?self.socket.peer_addr(), "TLS accept complete");
                Ok(())
            }
            Err(failure) => {
                let err = match failure {
                    HandshakeFailure::TimedOut => AcceptError::HandshakeTimedOut,
                    HandshakeFailure::Socket(e) => AcceptError::Socket(e),
                    HandshakeFailure::Tls(e) => AcceptError::Tls(e),
                };
                warn!(error = %err, "TLS accept failed");
                self.abort();
                Err(err)
            }
        }
    }

    /// Advance a suspended client handshake without waiting. `Ok(false)` means
    /// it is still in progress; poll `raw_fd()` for `last_wanted()` and call again.
    pub fn resume_handshake(&mut self) -> Result<bool, ConnectError> {
        match self.resume() {
            Ok(done) => Ok(done),
            Err(HandshakeFailure::Socket(e)) => Err(ConnectError::Socket(e)),
            Err(HandshakeFailure::Tls(e)) => Err(ConnectError::Tls(e)),
            Err(HandshakeFailure::TimedOut) => Ok(false),
        }
    }

    /// Server-side counterpart of `resume_handshake`.
    pub fn resume_accept(&mut self) -> Result<bool, AcceptError> {
        match self.resume() {
            Ok(done) => Ok(done),
            Err(HandshakeFailure::Socket(e)) => Err(AcceptError::Socket(e)),
            Err(HandshakeFailure::Tls(e)) => Err(AcceptError::Tls(e)),
            Err(HandshakeFailure::TimedOut) => Ok(false),
        }
    }

    fn resume(&mut self) -> Result<bool, HandshakeFailure> {
        match self.state {
            HandshakeState::Established => return Ok(true),
            HandshakeState::Connecting => {}
            _ => {
                return Err(HandshakeFailure::Socket(io::Error::from(
                    io::ErrorKind::NotConnected,
                )))
            }
        }
        match self.drive_handshake(Some(Duration::ZERO)) {
            Ok(()) => Ok(true),
            Err(HandshakeFailure::TimedOut) => Ok(false),
            Err(failure) => {
                self.abort();
                Err(failure)
            }
        }
    }

    fn drive_handshake(&mut self, budget: Option<Duration>) -> Result<(), HandshakeFailure> {
        let (Some(conn), Some(stream)) = (self.conn.as_mut(), self.socket.stream_mut()) else {
            return Err(HandshakeFailure::Socket(io::Error::from(
                io::ErrorKind::NotConnected,
            )));
        };
        let mut io = TlsIo { conn, stream };
        match retry::retry(&mut io, &mut Handshake, budget) {
            Ok(()) => {
                self.state = HandshakeState::Established;
                self.last_wanted = WantedOp::None;
                Ok(())
            }
            Err(RetryError::TimedOut(wanted)) => {
                self.last_wanted = wanted;
                self.socket.set_last_error(SocketError::TimedOut);
                Err(HandshakeFailure::TimedOut)
            }
            Err(RetryError::Poll(e)) | Err(RetryError::Failed(Failure::Io(e))) => {
                self.socket.set_last_error(SocketError::from(&e));
                Err(HandshakeFailure::Socket(e))
            }
            Err(RetryError::Failed(Failure::Tls(e))) => {
                self.last_tls_error = Some(e.clone());
                self.socket.set_last_error(SocketError::TlsError);
                Err(HandshakeFailure::Tls(e))
            }
        }
    }

    /// Receive decrypted bytes; `Ok(0)` at end of stream.
    pub fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.socket.read_timeout();
        let mut op = TlsRead { buf };
        self.run(&mut op, timeout)
    }

    /// Encrypt and send a prefix of `buf`, returning how much was taken.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let timeout = self.socket.write_timeout();
        let mut op = TlsWrite {
            buf,
            accepted: None,
        };
        self.run(&mut op, timeout)
    }

    fn run<O>(&mut self, op: &mut O, timeout: Option<Duration>) -> io::Result<usize>
    where
        O: for<'a> Operation<TlsIo<'a>, Output = usize>,
    {
        if self.state != HandshakeState::Established {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let (Some(conn), Some(stream)) = (self.conn.as_mut(), self.socket.stream_mut()) else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        let mut io = TlsIo { conn, stream };
        match retry::retry(&mut io, op, timeout) {
            Ok(n) => {
                self.last_wanted = WantedOp::None;
                Ok(n)
            }
            Err(RetryError::TimedOut(wanted)) => {
                self.last_wanted = wanted;
                self.socket.set_last_error(SocketError::TimedOut);
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
            Err(RetryError::Failed(Failure::Tls(e))) => {
                trace!(error = %e, "TLS record failure");
                self.last_tls_error = Some(e.clone());
                self.socket.set_last_error(SocketError::TlsError);
                Err(io::Error::new(io::ErrorKind::InvalidData, e))
            }
            Err(e) => {
                let err = e.into_io();
                self.socket.set_last_error(SocketError::from(&err));
                Err(err)
            }
        }
    }

    /// Best-effort close_notify, then close the socket. Safe to call repeatedly.
    pub fn close(&mut self) {
        let timeout = self.socket.write_timeout();
        if let (Some(conn), Some(stream)) = (self.conn.as_mut(), self.socket.stream_mut()) {
            if self.state == HandshakeState::Established {
                self.state = HandshakeState::Closing;
                let mut io = TlsIo { conn, stream };
                if let Err(e) = retry::retry(&mut io, &mut Shutdown { sent: false }, timeout) {
                    trace!(error = ?e, "TLS shutdown incomplete");
                }
            }
        }
        if self.conn.is_some() || self.socket.is_valid() {
            self.conn = None;
            self.socket.close();
            self.state = HandshakeState::Closed;
        }
    }

    /// Drop the connection without a close_notify.
    fn abort(&mut self) {
        self.conn = None;
        self.socket.close();
        self.state = HandshakeState::Closed;
    }

    pub fn is_valid(&self) -> bool {
        self.conn.is_some() && self.socket.is_valid()
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Last TLS-layer error; `None` after a handshake that merely timed out.
    pub fn last_tls_error(&self) -> Option<&rustls::Error> {
        self.last_tls_error.as_ref()
    }

    pub fn last_wanted(&self) -> WantedOp {
        self.last_wanted
    }

    pub fn last_error(&self) -> SocketError {
        self.socket.last_error()
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.raw_fd()
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Read for TlsSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.receive(buf)
    }
}

impl Write for TlsSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
