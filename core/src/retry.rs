/*
 * retry.rs
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

//! Readiness retry: apply an operation on a non-blocking socket and, while it
//! reports that it is blocked, wait for the wanted readiness with a shrinking
//! time budget before applying it again.
//!
//! Every blocking-looking call in the crate (TCP connect completion, plain
//! send/receive, TLS handshake, TLS read/write/shutdown, accept) is one
//! `Operation` driven by [`retry`].

use std::io;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use crate::sys::{self, Interest, Readiness};

/// Which readiness an operation last waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WantedOp {
    #[default]
    None,
    Read,
    Write,
}

/// Result of applying an operation once.
#[derive(Debug)]
pub(crate) enum Step<T> {
    Done(T),
    WantRead,
    WantWrite,
    Failed(Failure),
}

/// Hard failure of an operation.
#[derive(Debug)]
pub(crate) enum Failure {
    Io(io::Error),
    Tls(rustls::Error),
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Failure::Io(err)
    }
}

/// Why `retry` gave up.
#[derive(Debug)]
pub(crate) enum RetryError {
    /// Budget exhausted while waiting; not an error on the socket itself.
    TimedOut(WantedOp),
    /// The readiness wait itself failed.
    Poll(io::Error),
    Failed(Failure),
}

impl RetryError {
    /// Collapse into an `io::Error` for `Read`/`Write` implementations.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            RetryError::TimedOut(_) => io::Error::from(io::ErrorKind::TimedOut),
            RetryError::Poll(e) | RetryError::Failed(Failure::Io(e)) => e,
            RetryError::Failed(Failure::Tls(e)) => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

/// One retryable operation over a subject (a socket or a TLS channel).
pub(crate) trait Operation<S: ?Sized> {
    type Output;

    fn apply(&mut self, subject: &mut S) -> Step<Self::Output>;
}

/// Drive `op` until it completes, fails, or `budget` runs out. `None` never times out.
pub(crate) fn retry<S, O>(
    subject: &mut S,
    op: &mut O,
    budget: Option<Duration>,
) -> Result<O::Output, RetryError>
where
    S: AsRawFd + ?Sized,
    O: Operation<S>,
{
    let deadline = budget.map(|b| Instant::now() + b);
    loop {
        let wanted = match op.apply(subject) {
            Step::Done(value) => return Ok(value),
            Step::Failed(failure) => return Err(RetryError::Failed(failure)),
            Step::WantRead => WantedOp::Read,
            Step::WantWrite => WantedOp::Write,
        };
        let remaining = match deadline {
            None => None,
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RetryError::TimedOut(wanted));
                }
                Some(deadline - now)
            }
        };
        let interest = match wanted {
            WantedOp::Write => Interest::Write,
            _ => Interest::Read,
        };
        match sys::wait_ready(subject.as_raw_fd(), interest, remaining) {
            Ok(Readiness::Ready) => continue,
            Ok(Readiness::TimedOut) => return Err(RetryError::TimedOut(wanted)),
            Err(e) => return Err(RetryError::Poll(e)),
        }
    }
}

/// Map a raw I/O result of a non-blocking call onto a step.
pub(crate) fn step_from_io<T>(result: io::Result<T>, wanted: WantedOp) -> Option<Step<T>> {
    match result {
        Ok(value) => Some(Step::Done(value)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => None,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Some(match wanted {
            WantedOp::Write => Step::WantWrite,
            _ => Step::WantRead,
        }),
        Err(e) => Some(Step::Failed(Failure::Io(e))),
    }
}
