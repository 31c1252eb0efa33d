//! Error types for duplex streaming calls.
//!
//! This module defines the central `Error` enum returned by every operation
//! on a [`RequestSink`], [`ResponseSource`] or [`DuplexCall`]. It implements
//! `From<Error>` for `tonic::Status` so failures can be surfaced to gRPC
//! callers with appropriate status codes and messages.
//!
//! ## Error Cases
//! - `AlreadyClosed`: A request was sent (or a second half-close issued) after
//!   the request half was closed.
//! - `ConcurrentOperation`: A second operation was issued on a half while
//!   another one was still in flight.
//! - `Transport`: The transport collaborator reported a failure.
//! - `Cancelled`: The call was cancelled by the caller, by its deadline, or
//!   upstream.
//!
//! The first two are usage errors: they are detected locally, never reach the
//! transport and leave the half's state untouched.
//!
//! [`RequestSink`]: crate::RequestSink
//! [`ResponseSource`]: crate::ResponseSource
//! [`DuplexCall`]: crate::DuplexCall

use core::fmt;
use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for duplex streaming calls.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The request half has already been half-closed.
    #[error("Request stream already closed")]
    AlreadyClosed,

    /// Another operation is still in flight on the same half.
    #[error("Concurrent {half} operation not allowed")]
    ConcurrentOperation { half: Half },

    /// The transport collaborator failed the half.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The call was cancelled before the operation could complete.
    #[error("Call cancelled: {reason}")]
    Cancelled { reason: CancelReason },
}

impl Error {
    /// Returns `true` for errors caused by misuse of the API rather than by
    /// the transport or by cancellation.
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::AlreadyClosed | Self::ConcurrentOperation { .. })
    }

    /// Returns `true` if this error is a cancellation signal.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::AlreadyClosed => Status::failed_precondition("Request stream already closed"),
            Error::ConcurrentOperation { half } => {
                Status::failed_precondition(format!("Concurrent {half} operation not allowed"))
            }
            Error::Transport(e) => e.into(),
            Error::Cancelled {
                reason: CancelReason::Deadline,
            } => Status::deadline_exceeded("Call deadline exceeded"),
            Error::Cancelled { reason } => Status::cancelled(format!("Call cancelled: {reason}")),
        }
    }
}

/// Identifies one direction of a duplex call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Half {
    Request,
    Response,
}

impl Half {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The application cancelled the call through [`DuplexCall::cancel`].
    ///
    /// [`DuplexCall::cancel`]: crate::DuplexCall::cancel
    Caller,
    /// The call's deadline elapsed.
    Deadline,
    /// The shared cancellation token was cancelled from outside the call,
    /// e.g. by a parent token or the transport layer.
    Upstream,
}

impl CancelReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Deadline => "deadline",
            Self::Upstream => "upstream",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => f.write_str("cancelled by caller"),
            Self::Deadline => f.write_str("deadline exceeded"),
            Self::Upstream => f.write_str("cancelled upstream"),
        }
    }
}

/// A failure reported by the transport collaborator.
///
/// Transport errors are terminal for the half that observed them. They are
/// cheap to clone so the same error can be replayed on every later operation
/// of that half.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[error("{message} ({code:?})")]
pub struct TransportError {
    code: Code,
    message: String,
}

impl TransportError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The peer or connection went away.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// The peer aborted the stream.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Code::Aborted, message)
    }

    pub const fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Status> for TransportError {
    fn from(status: Status) -> Self {
        Self::new(status.code(), status.message())
    }
}

impl From<TransportError> for Status {
    fn from(err: TransportError) -> Self {
        Status::new(err.code, err.message)
    }
}
