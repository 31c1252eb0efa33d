//! The request half of a duplex call.
//!
//! [`RequestSink`] wraps a [`RequestTransport`] with an explicit
//! `Open -> HalfClosed | Failed` state machine. It holds no message history:
//! each accepted message is handed to the transport and forgotten.
//!
//! ## Rules
//!
//! - At most one `send`/`half_close` is in flight at a time. A second call
//!   issued before the first resolves fails fast with
//!   [`Error::ConcurrentOperation`] and does not touch the transport.
//! - Successive sends reach the transport in invocation order.
//! - After a successful `half_close`, every `send` or `half_close` fails with
//!   [`Error::AlreadyClosed`].
//! - A transport error or cancellation is terminal; the captured error is
//!   replayed on every later operation.

use crate::{
    completion::Completion,
    context::CallContext,
    error::{Error, Half, Result},
    telemetry::{increment_half_failures, increment_messages_sent},
    transport::RequestTransport,
};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

/// Lifecycle state of a [`RequestSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkState {
    /// Requests may be sent.
    Open,
    /// `half_close` succeeded; no further requests are accepted.
    HalfClosed,
    /// The transport failed or the call was cancelled.
    Failed(Error),
}

impl SinkState {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Outbound half of a duplex call.
pub struct RequestSink<W: RequestTransport> {
    // The transport lock doubles as the in-flight flag: operations only ever
    // `try_lock` it and fail fast when it is held.
    transport: AsyncMutex<W>,
    state: Mutex<SinkState>,
    ctx: CallContext,
}

impl<W: RequestTransport> RequestSink<W> {
    pub fn new(transport: W, ctx: CallContext) -> Self {
        Self {
            transport: AsyncMutex::new(transport),
            state: Mutex::new(SinkState::Open),
            ctx,
        }
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Current state. A fired cancellation signal is reflected here even if
    /// no operation has observed it yet.
    pub fn state(&self) -> SinkState {
        self.observe_cancellation();
        self.state.lock().clone()
    }

    /// This half's own completion, or `None` while it is still open.
    pub fn completion(&self) -> Option<Completion> {
        match self.state() {
            SinkState::Open => None,
            SinkState::HalfClosed => Some(Completion::Ok),
            SinkState::Failed(e) => Some(Completion::from_error(&e)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Submits one message for transmission.
    ///
    /// Resolves once the transport has accepted the message for delivery.
    ///
    /// # Errors
    ///
    /// - [`Error::ConcurrentOperation`] if another operation is in flight.
    /// - [`Error::AlreadyClosed`] after a successful `half_close`.
    /// - [`Error::Transport`] or [`Error::Cancelled`] if the sink failed, now
    ///   or earlier.
    pub async fn send(&self, message: W::Request) -> Result<()> {
        let mut transport = self.acquire()?;

        let outcome = tokio::select! {
            biased;
            reason = self.ctx.cancelled() => Err(Error::Cancelled { reason }),
            res = transport.write(message) => res.map_err(Error::from),
        };

        match outcome {
            Ok(()) => {
                increment_messages_sent();
                #[cfg(feature = "tracing")]
                tracing::trace!("{} request accepted by transport", self.ctx.id());
                // Cancellation raced the transport and was recorded first.
                match &*self.state.lock() {
                    SinkState::Failed(e) => Err(e.clone()),
                    SinkState::Open | SinkState::HalfClosed => Ok(()),
                }
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Signals that no further requests will be sent.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send); a second `half_close` fails with
    /// [`Error::AlreadyClosed`] without signalling the transport again.
    pub async fn half_close(&self) -> Result<()> {
        let mut transport = self.acquire()?;

        let outcome = tokio::select! {
            biased;
            reason = self.ctx.cancelled() => Err(Error::Cancelled { reason }),
            res = transport.half_close() => res.map_err(Error::from),
        };

        match outcome {
            Ok(()) => {
                let mut state = self.state.lock();
                match &*state {
                    SinkState::Open => {
                        *state = SinkState::HalfClosed;
                        #[cfg(feature = "tracing")]
                        tracing::debug!("{} request half closed", self.ctx.id());
                        Ok(())
                    }
                    // Cancellation raced the transport and was recorded first.
                    SinkState::Failed(e) => Err(e.clone()),
                    SinkState::HalfClosed => Err(Error::AlreadyClosed),
                }
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Forces an open sink into `Failed(Cancelled)` once the call's signal
    /// has fired. Terminal sinks are left untouched.
    pub(crate) fn observe_cancellation(&self) {
        if let Some(reason) = self.ctx.reason() {
            self.fail(Error::Cancelled { reason });
        }
    }

    fn acquire(&self) -> Result<AsyncMutexGuard<'_, W>> {
        self.observe_cancellation();

        let Ok(transport) = self.transport.try_lock() else {
            // A terminal error recorded while the other operation is still
            // unwinding takes precedence over the usage error.
            if let SinkState::Failed(e) = &*self.state.lock() {
                return Err(e.clone());
            }
            #[cfg(feature = "tracing")]
            tracing::debug!("{} rejected concurrent request operation", self.ctx.id());
            return Err(Error::ConcurrentOperation {
                half: Half::Request,
            });
        };

        match &*self.state.lock() {
            SinkState::Open => Ok(transport),
            SinkState::HalfClosed => Err(Error::AlreadyClosed),
            SinkState::Failed(e) => Err(e.clone()),
        }
    }

    /// Records `err` as the terminal error if the sink is still open, and
    /// returns whichever terminal error is recorded.
    fn fail(&self, err: Error) -> Error {
        let mut state = self.state.lock();
        match &*state {
            SinkState::Open => {
                #[cfg(feature = "tracing")]
                match &err {
                    Error::Cancelled { reason } => {
                        tracing::debug!("{} request half cancelled: {reason}", self.ctx.id());
                    }
                    _ => tracing::warn!("{} request half failed: {err}", self.ctx.id()),
                }
                increment_half_failures(Half::Request);
                *state = SinkState::Failed(err.clone());
                err
            }
            SinkState::Failed(recorded) => recorded.clone(),
            SinkState::HalfClosed => err,
        }
    }
}

impl<W: RequestTransport> core::fmt::Debug for RequestSink<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestSink")
            .field("call", &self.ctx.id())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
