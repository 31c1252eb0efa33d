use crate::error::{Error, TransportError};

/// Terminal outcome of one half of a duplex call.
///
/// Each half reports its own completion; a call never merges them into a
/// single status. A half that is still open has no completion yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The half finished cleanly: the request half was half-closed, or the
    /// response half reached end-of-stream.
    Ok,
    /// The transport failed the half.
    Error(TransportError),
    /// The call was cancelled before the half finished.
    Cancelled,
}

impl Completion {
    /// Builds the completion recorded for a half that failed with `err`.
    ///
    /// Usage errors never terminate a half, so they are not expected here;
    /// they map to `Error` with a `FailedPrecondition` code if they do.
    pub(crate) fn from_error(err: &Error) -> Self {
        match err {
            Error::Transport(e) => Self::Error(e.clone()),
            Error::Cancelled { .. } => Self::Cancelled,
            usage => Self::Error(TransportError::new(
                tonic::Code::FailedPrecondition,
                usage.to_string(),
            )),
        }
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Per-half completions of a call, as reported by
/// [`DuplexCall::completion`](crate::DuplexCall::completion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCompletion {
    pub request: Option<Completion>,
    pub response: Option<Completion>,
}

impl CallCompletion {
    /// Returns `true` once both halves have a completion.
    pub const fn is_finished(&self) -> bool {
        self.request.is_some() && self.response.is_some()
    }
}
