//! The response half of a duplex call.
//!
//! [`ResponseSource`] wraps a [`ResponseTransport`] with an explicit
//! `Open -> Completed | Failed` state machine. It is pull-based: nothing is
//! buffered beyond the single message currently being pulled, so the pace at
//! which the caller invokes [`receive_next`](ResponseSource::receive_next) is
//! the backpressure signal seen by the transport.
//!
//! Once end-of-stream or an error has been returned, every later call returns
//! the same terminal signal without polling the transport again.

use crate::{
    completion::Completion,
    context::CallContext,
    error::{Error, Half, Result},
    telemetry::{increment_half_failures, increment_messages_received},
    transport::ResponseTransport,
};
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

/// Lifecycle state of a [`ResponseSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    /// More responses may arrive.
    Open,
    /// The peer cleanly finished sending.
    Completed,
    /// The transport failed or the call was cancelled.
    Failed(Error),
}

impl SourceState {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Inbound half of a duplex call.
pub struct ResponseSource<R: ResponseTransport> {
    // Held for the duration of a pull; `try_lock` failing means another
    // `receive_next` is in flight.
    transport: AsyncMutex<R>,
    state: Mutex<SourceState>,
    ctx: CallContext,
}

impl<R: ResponseTransport> ResponseSource<R> {
    pub fn new(transport: R, ctx: CallContext) -> Self {
        Self {
            transport: AsyncMutex::new(transport),
            state: Mutex::new(SourceState::Open),
            ctx,
        }
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Current state. A fired cancellation signal is reflected here even if
    /// no operation has observed it yet.
    pub fn state(&self) -> SourceState {
        self.observe_cancellation();
        self.state.lock().clone()
    }

    /// This half's own completion, or `None` while it is still open.
    pub fn completion(&self) -> Option<Completion> {
        match self.state() {
            SourceState::Open => None,
            SourceState::Completed => Some(Completion::Ok),
            SourceState::Failed(e) => Some(Completion::from_error(&e)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Pulls the next response.
    ///
    /// Returns `Ok(Some(message))` for each message in peer-send order, then
    /// `Ok(None)` once the peer has finished. Both `Ok(None)` and errors are
    /// sticky.
    ///
    /// # Errors
    ///
    /// - [`Error::ConcurrentOperation`] if another `receive_next` is in
    ///   flight.
    /// - [`Error::Transport`] or [`Error::Cancelled`] if the source failed,
    ///   now or earlier.
    pub async fn receive_next(&self) -> Result<Option<R::Response>> {
        let mut transport = match self.acquire()? {
            Acquired::Transport(transport) => transport,
            Acquired::EndOfStream => return Ok(None),
        };

        let outcome = tokio::select! {
            biased;
            reason = self.ctx.cancelled() => Err(Error::Cancelled { reason }),
            res = transport.next_message() => res.map_err(Error::from),
        };

        match outcome {
            Ok(Some(message)) => {
                increment_messages_received();
                #[cfg(feature = "tracing")]
                tracing::trace!("{} response received", self.ctx.id());
                Ok(Some(message))
            }
            Ok(None) => self.complete(),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Adapts the pull API into a [`Stream`] of responses.
    ///
    /// The stream yields each message as `Ok`, then ends after end-of-stream,
    /// or yields a single `Err` and ends. It borrows the source, so it follows
    /// the same one-pull-at-a-time rule.
    pub fn messages(&self) -> impl Stream<Item = Result<R::Response>> + '_ {
        futures::stream::unfold(Some(self), |source| async move {
            let source = source?;
            match source.receive_next().await {
                Ok(Some(message)) => Some((Ok(message), Some(source))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub(crate) fn observe_cancellation(&self) {
        if let Some(reason) = self.ctx.reason() {
            self.fail(Error::Cancelled { reason });
        }
    }

    fn acquire(&self) -> Result<Acquired<'_, R>> {
        self.observe_cancellation();

        // Terminal reads never touch the transport.
        match &*self.state.lock() {
            SourceState::Open => {}
            SourceState::Completed => return Ok(Acquired::EndOfStream),
            SourceState::Failed(e) => return Err(e.clone()),
        }

        let Ok(transport) = self.transport.try_lock() else {
            #[cfg(feature = "tracing")]
            tracing::debug!("{} rejected concurrent receive", self.ctx.id());
            return Err(Error::ConcurrentOperation {
                half: Half::Response,
            });
        };

        // Re-check: a pull holding the lock may have finished between the
        // state read and `try_lock`.
        match &*self.state.lock() {
            SourceState::Open => Ok(Acquired::Transport(transport)),
            SourceState::Completed => Ok(Acquired::EndOfStream),
            SourceState::Failed(e) => Err(e.clone()),
        }
    }

    fn complete(&self) -> Result<Option<R::Response>> {
        let mut state = self.state.lock();
        match &*state {
            SourceState::Open => {
                #[cfg(feature = "tracing")]
                tracing::debug!("{} response stream completed", self.ctx.id());
                *state = SourceState::Completed;
                Ok(None)
            }
            SourceState::Completed => Ok(None),
            SourceState::Failed(e) => Err(e.clone()),
        }
    }

    /// Records `err` as the terminal error if the source is still open, and
    /// returns whichever terminal error is recorded.
    fn fail(&self, err: Error) -> Error {
        let mut state = self.state.lock();
        match &*state {
            SourceState::Open => {
                #[cfg(feature = "tracing")]
                match &err {
                    Error::Cancelled { reason } => {
                        tracing::debug!("{} response half cancelled: {reason}", self.ctx.id());
                    }
                    _ => tracing::warn!("{} response half failed: {err}", self.ctx.id()),
                }
                increment_half_failures(Half::Response);
                *state = SourceState::Failed(err.clone());
                err
            }
            SourceState::Failed(recorded) => recorded.clone(),
            SourceState::Completed => err,
        }
    }
}

enum Acquired<'a, R> {
    Transport(AsyncMutexGuard<'a, R>),
    EndOfStream,
}

impl<R: ResponseTransport> core::fmt::Debug for ResponseSource<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResponseSource")
            .field("call", &self.ctx.id())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
