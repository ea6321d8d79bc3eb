// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! The mining agent errors

use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

use std::io;

/// Agent-wide error type. The [`ErrorKind`] names what went wrong in
/// protocol terms and stays cheaply matchable; the `Context` underneath
/// keeps whatever foreign error triggered it attached as the cause.
#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    /// General error used for more specific input/output error.
    #[fail(display = "{}", _0)]
    General(String),

    /// Standard input/output error.
    #[fail(display = "IO: {}", _0)]
    Io(String),

    /// Serial port open/configuration error.
    #[fail(display = "Serial port: {}", _0)]
    Serial(String),

    /// UART framing layer error.
    #[fail(display = "Frame: {}", _0)]
    Frame(Frame),

    /// Job protocol error reported by a chip or the poll loop.
    #[fail(display = "Job: {}", _0)]
    Job(Job),

    /// PLL programming error.
    #[fail(display = "PLL: {}", _0)]
    Pll(String),

    /// Pool or package server communication error.
    #[fail(display = "Remote: {}", _0)]
    Remote(String),

    /// GPIO errors.
    #[fail(display = "GPIO: {}", _0)]
    Gpio(String),

    /// Invalid command line or debug configuration.
    #[fail(display = "Config: {}", _0)]
    Config(String),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Fail)]
pub enum Frame {
    /// CRC of a received frame does not match its body
    #[fail(display = "checksum mismatch")]
    Checksum,

    /// Frame shorter than a header or length field disagrees with payload
    #[fail(display = "invalid frame")]
    Invalid,

    /// No complete frame arrived within the read deadline
    #[fail(display = "read timeout")]
    Timeout,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Fail)]
pub enum Job {
    /// Chip reports it knows nothing about any job
    #[fail(display = "no job found")]
    NoJob,

    /// Status response carries a different query id than was submitted
    #[fail(display = "job mismatch")]
    Mismatch,

    /// Job did not complete within the caller supplied wall clock budget
    #[fail(display = "job timeout")]
    Timeout,

    /// Status byte outside the known state machine
    #[fail(display = "invalid job state")]
    InvalidState,

    /// Result referenced a midstate slot outside 1..=4
    #[fail(display = "invalid prefix index")]
    PrefixIndex,

    /// Locally recomputed hash differs from the one the chip reported
    #[fail(display = "hash mismatch")]
    HashMismatch,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.inner.get_context().clone()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Self {
        Self { inner }
    }
}

impl From<Frame> for Error {
    fn from(frame: Frame) -> Self {
        ErrorKind::Frame(frame).into()
    }
}

impl From<Job> for Error {
    fn from(job: Job) -> Self {
        ErrorKind::Job(job).into()
    }
}

/// Conversion from a foreign error: the error becomes the cause of a kind
/// chosen per source type, with its message duplicated into the kind so a
/// single log line still tells the whole story.
macro_rules! foreign_error_impl {
    ($source:ty, $kind:ident) => {
        impl From<$source> for Error {
            fn from(e: $source) -> Self {
                let msg = e.to_string();
                Self {
                    inner: e.context(ErrorKind::$kind(msg)),
                }
            }
        }
    };
}

foreign_error_impl!(io::Error, Io);
foreign_error_impl!(tokio_serial::Error, Serial);
foreign_error_impl!(reqwest::Error, Remote);
foreign_error_impl!(serde_json::Error, Remote);
foreign_error_impl!(sysfs_gpio::Error, Gpio);

/// A specialized `Result` type bound to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
