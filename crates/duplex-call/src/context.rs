//! Per-call identity and the shared cancellation/deadline signal.
//!
//! Both halves of a [`DuplexCall`] hold a clone of the same [`CallContext`].
//! Firing it, whether through [`DuplexCall::cancel`], an elapsed deadline, or
//! the underlying [`CancellationToken`] being cancelled from outside, is a
//! forced terminal transition for every half that is still open.
//!
//! [`DuplexCall`]: crate::DuplexCall
//! [`DuplexCall::cancel`]: crate::DuplexCall::cancel

use crate::{error::CancelReason, telemetry::increment_cancellations};
use core::fmt;
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a call, used in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    fn next() -> Self {
        Self(NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Call identity, cancellation token and optional deadline, shared by both
/// halves.
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    id: CallId,
    token: CancellationToken,
    deadline: Option<Instant>,
    // Set at most once; the first recorded reason wins.
    reason: OnceLock<CancelReason>,
}

impl CallContext {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: CallId::next(),
                token,
                deadline,
                reason: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> CallId {
        self.inner.id
    }

    /// The token backing this ctx. Cancelling it from outside the call is
    /// reported as [`CancelReason::Upstream`].
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Fires the signal, recording `reason` unless another reason was
    /// recorded first.
    pub fn cancel(&self, reason: CancelReason) {
        // A token already cancelled from outside keeps reading as upstream.
        if !self.inner.token.is_cancelled() && self.inner.reason.set(reason).is_ok() {
            increment_cancellations(reason);
        }
        self.inner.token.cancel();
    }

    /// Returns `true` once the signal has fired.
    ///
    /// An elapsed deadline fires the signal as a side effect, so halves that
    /// have no operation in flight still observe it.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.token.is_cancelled() {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel(CancelReason::Deadline);
                true
            }
            _ => false,
        }
    }

    /// The reason the signal fired, or `None` while it has not.
    pub fn reason(&self) -> Option<CancelReason> {
        self.is_cancelled().then(|| self.recorded_reason())
    }

    /// Resolves once the signal fires, yielding the reason.
    pub async fn cancelled(&self) -> CancelReason {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.inner.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {
                        self.cancel(CancelReason::Deadline);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
        self.recorded_reason()
    }

    fn recorded_reason(&self) -> CancelReason {
        *self.inner.reason.get_or_init(|| {
            increment_cancellations(CancelReason::Upstream);
            CancelReason::Upstream
        })
    }
}
