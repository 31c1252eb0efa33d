use crate::context::CallContext;
use core::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default capacity of the request channel used by channel-backed
/// transports.
pub const DEFAULT_REQUEST_BUFFER: usize = 16;

/// Per-call settings.
///
/// Options describe the call's shared cancellation/deadline signal and, for
/// channel-backed transports such as [`grpc::open`](crate::grpc::open), the
/// request buffer. They are consumed when the call is created.
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use duplex_call::CallOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let shutdown = CancellationToken::new();
/// let options = CallOptions::default()
///     .with_timeout(Duration::from_secs(30))
///     .with_parent(shutdown.clone())
///     .with_request_buffer(64);
/// assert_eq!(options.request_buffer(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct CallOptions {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    parent: Option<CancellationToken>,
    request_buffer: usize,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            deadline: None,
            parent: None,
            request_buffer: DEFAULT_REQUEST_BUFFER,
        }
    }
}

impl CallOptions {
    /// Cancels the call once `timeout` has elapsed, measured from call
    /// creation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancels the call at `deadline`. When combined with a timeout, the
    /// earlier of the two wins.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Derives the call's token from `parent`, so cancelling the parent
    /// cancels the call upstream.
    #[must_use]
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Capacity of the request channel. Clamped to at least 1.
    #[must_use]
    pub fn with_request_buffer(mut self, capacity: usize) -> Self {
        self.request_buffer = capacity.max(1);
        self
    }

    pub const fn request_buffer(&self) -> usize {
        self.request_buffer
    }

    /// Builds the shared context for a new call.
    pub fn into_context(self) -> CallContext {
        let from_timeout = self.timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, from_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let token = self
            .parent
            .map_or_else(CancellationToken::new, |parent| parent.child_token());
        CallContext::new(token, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_buffer_is_clamped() {
        assert_eq!(CallOptions::default().request_buffer(), DEFAULT_REQUEST_BUFFER);
        assert_eq!(CallOptions::default().with_request_buffer(0).request_buffer(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = CallOptions::default()
            .with_timeout(Duration::from_secs(10))
            .with_deadline(now + Duration::from_secs(2))
            .into_context();
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(2)));

        let ctx = CallOptions::default()
            .with_timeout(Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(2))
            .into_context();
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = CallOptions::default().with_parent(parent.clone()).into_context();

        assert!(!ctx.is_cancelled());
        parent.cancel();
        assert!(ctx.is_cancelled());
    }
}
