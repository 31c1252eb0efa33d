//! The duplex call coordinator.
//!
//! [`DuplexCall`] is the handle application code holds for one
//! bidirectional-streaming call. It binds a [`RequestSink`] and a
//! [`ResponseSource`] that share one [`CallContext`], and otherwise adds
//! nothing: `send`, `half_close` and `receive_next` delegate straight to the
//! halves, which serialize their own operations. The two directions are
//! never coupled, so a pending `send` does not hold up `receive_next` and
//! vice versa.
//!
//! ## Lifecycle
//!
//! A call has no explicit close. It is finished once both halves are
//! terminal; releasing the connection at that point belongs to the
//! transport. Cancelling the call (or letting its deadline elapse) forces
//! every open half into a failed state and resolves any pending operation
//! with [`Error::Cancelled`](crate::Error::Cancelled).

use crate::{
    completion::CallCompletion,
    context::{CallContext, CallId},
    error::{CancelReason, Result},
    options::CallOptions,
    sink::RequestSink,
    source::ResponseSource,
    telemetry::increment_calls_started,
    transport::{RequestTransport, ResponseTransport},
};
use std::sync::Arc;

/// Client-side handle for one bidirectional-streaming call.
///
/// Cloning the handle is cheap and shares the same halves, which makes it
/// easy to send from one task while receiving on another.
pub struct DuplexCall<W: RequestTransport, R: ResponseTransport> {
    ctx: CallContext,
    requests: Arc<RequestSink<W>>,
    responses: Arc<ResponseSource<R>>,
}

impl<W: RequestTransport, R: ResponseTransport> DuplexCall<W, R> {
    /// Starts a call over the given transports with default options.
    pub fn new(requests: W, responses: R) -> Self {
        Self::with_options(requests, responses, CallOptions::default())
    }

    /// Starts a call whose cancellation and deadline come from `options`.
    pub fn with_options(requests: W, responses: R, options: CallOptions) -> Self {
        Self::with_context(requests, responses, options.into_context())
    }

    /// Starts a call on an existing context, e.g. one whose token the
    /// transport layer also holds.
    pub fn with_context(requests: W, responses: R, ctx: CallContext) -> Self {
        increment_calls_started();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "{} started (deadline: {:?})",
            ctx.id(),
            ctx.deadline().map(|d| d.saturating_duration_since(tokio::time::Instant::now()))
        );

        Self {
            requests: Arc::new(RequestSink::new(requests, ctx.clone())),
            responses: Arc::new(ResponseSource::new(responses, ctx.clone())),
            ctx,
        }
    }

    pub fn id(&self) -> CallId {
        self.ctx.id()
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Writes a request. See [`RequestSink::send`].
    pub async fn send(&self, message: W::Request) -> Result<()> {
        self.requests.send(message).await
    }

    /// Closes the request half. See [`RequestSink::half_close`].
    pub async fn half_close(&self) -> Result<()> {
        self.requests.half_close().await
    }

    /// Reads the next response. See [`ResponseSource::receive_next`].
    pub async fn receive_next(&self) -> Result<Option<R::Response>> {
        self.responses.receive_next().await
    }

    /// The request half. Holding the `Arc` keeps the half usable
    /// independently of this handle.
    pub fn request_sink(&self) -> &Arc<RequestSink<W>> {
        &self.requests
    }

    /// The response half. Holding the `Arc` keeps the half usable
    /// independently of this handle.
    pub fn response_source(&self) -> &Arc<ResponseSource<R>> {
        &self.responses
    }

    /// Splits the call into its two halves.
    pub fn into_parts(self) -> (Arc<RequestSink<W>>, Arc<ResponseSource<R>>) {
        (self.requests, self.responses)
    }

    /// Cancels the call.
    ///
    /// Pending operations on either half resolve with
    /// [`Error::Cancelled`](crate::Error::Cancelled) and every half that is
    /// still open becomes terminal. Halves that already finished keep their
    /// outcome. Cancelling twice has no further effect.
    pub fn cancel(&self) {
        #[cfg(feature = "tracing")]
        if !self.ctx.is_cancelled() {
            tracing::debug!("{} cancelled by caller", self.ctx.id());
        }
        self.ctx.cancel(CancelReason::Caller);
        self.requests.observe_cancellation();
        self.responses.observe_cancellation();
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }

    /// Returns `true` once both halves have reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.requests.is_terminal() && self.responses.is_terminal()
    }

    /// Each half's own completion. The two are never merged.
    pub fn completion(&self) -> CallCompletion {
        CallCompletion {
            request: self.requests.completion(),
            response: self.responses.completion(),
        }
    }
}

impl<W: RequestTransport, R: ResponseTransport> Clone for DuplexCall<W, R> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            requests: Arc::clone(&self.requests),
            responses: Arc::clone(&self.responses),
        }
    }
}

impl<W: RequestTransport, R: ResponseTransport> core::fmt::Debug for DuplexCall<W, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DuplexCall")
            .field("id", &self.ctx.id())
            .field("requests", &self.requests)
            .field("responses", &self.responses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        completion::Completion,
        error::{Error, TransportError},
        sink::SinkState,
        source::SourceState,
        testing::{RecordingTransport, ScriptedSource, Step, WriteEvent},
    };
    use core::time::Duration;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn delegates_to_both_halves() {
        let (requests, log) = RecordingTransport::new();
        let (responses, _calls) = ScriptedSource::new([Step::Message(10), Step::End]);
        let call = DuplexCall::new(requests, responses);

        call.send(1).await.unwrap();
        assert_eq!(call.receive_next().await, Ok(Some(10)));
        call.send(2).await.unwrap();
        call.half_close().await.unwrap();
        assert_eq!(call.receive_next().await, Ok(None));

        assert_eq!(
            log.events(),
            vec![
                WriteEvent::Message(1),
                WriteEvent::Message(2),
                WriteEvent::HalfClose
            ]
        );
        assert!(call.is_finished());
        assert_eq!(
            call.completion(),
            CallCompletion {
                request: Some(Completion::Ok),
                response: Some(Completion::Ok),
            }
        );
    }

    #[tokio::test]
    async fn halves_finish_independently() {
        let (requests, _log) = RecordingTransport::new();
        let (responses, _calls) = ScriptedSource::new([Step::End]);
        let call = DuplexCall::new(requests, responses);

        assert_eq!(call.receive_next().await, Ok(None));
        assert!(!call.is_finished());

        // The request half is unaffected by the response half completing.
        call.send(1).await.unwrap();
        assert_eq!(call.request_sink().state(), SinkState::Open);

        call.half_close().await.unwrap();
        assert!(call.is_finished());
    }

    #[tokio::test]
    async fn request_failure_does_not_fail_response_half() {
        let (requests, log) = RecordingTransport::new();
        let err = TransportError::unavailable("write side reset");
        log.fail_next_write(err.clone());
        let (responses, _calls) = ScriptedSource::new([Step::Message(5), Step::End]);
        let call = DuplexCall::new(requests, responses);

        assert_eq!(call.send(1).await, Err(Error::Transport(err.clone())));

        assert_eq!(call.response_source().state(), SourceState::Open);
        assert_eq!(call.receive_next().await, Ok(Some(5)));
        assert_eq!(call.receive_next().await, Ok(None));
        assert_eq!(
            call.completion(),
            CallCompletion {
                request: Some(Completion::Error(err)),
                response: Some(Completion::Ok),
            }
        );
    }

    #[tokio::test]
    async fn response_failure_does_not_fail_request_half() {
        let (requests, log) = RecordingTransport::new();
        let err = TransportError::aborted("read side reset");
        let (responses, _calls) = ScriptedSource::new([Step::Fail(err.clone())]);
        let call = DuplexCall::new(requests, responses);

        assert_eq!(call.receive_next().await, Err(Error::Transport(err.clone())));

        assert_eq!(call.request_sink().state(), SinkState::Open);
        call.send(1).await.unwrap();
        assert_eq!(log.events(), vec![WriteEvent::Message(1)]);
        assert_eq!(
            call.completion(),
            CallCompletion {
                request: None,
                response: Some(Completion::Error(err)),
            }
        );
        assert!(!call.is_finished());
    }

    #[tokio::test]
    async fn accessors_outlive_the_handle() {
        let (requests, log) = RecordingTransport::new();
        let (responses, _calls) = ScriptedSource::new([Step::Message(3)]);
        let call = DuplexCall::new(requests, responses);

        let sink = Arc::clone(call.request_sink());
        let source = Arc::clone(call.response_source());
        drop(call);

        sink.send(1).await.unwrap();
        assert_eq!(source.receive_next().await, Ok(Some(3)));
        assert_eq!(log.events(), vec![WriteEvent::Message(1)]);
    }

    #[tokio::test]
    async fn cancel_terminates_open_halves_only() {
        let (requests, _log) = RecordingTransport::new();
        let (responses, _calls) = ScriptedSource::new([Step::End]);
        let call = DuplexCall::new(requests, responses);

        assert_eq!(call.receive_next().await, Ok(None));
        call.cancel();
        call.cancel();

        assert!(call.is_cancelled());
        assert!(call.is_finished());
        assert_eq!(
            call.completion(),
            CallCompletion {
                request: Some(Completion::Cancelled),
                response: Some(Completion::Ok),
            }
        );
        assert_eq!(
            call.send(1).await,
            Err(Error::Cancelled {
                reason: CancelReason::Caller
            })
        );
    }

    #[tokio::test]
    async fn cancel_resolves_pending_send_and_receive() {
        let (requests, log) = RecordingTransport::new();
        let gate = log.hold_writes();
        let (responses, calls) = ScriptedSource::new([Step::Pending]);
        let call = DuplexCall::new(requests, responses);

        let send = tokio::spawn({
            let call = call.clone();
            async move { call.send(1).await }
        });
        let receive = tokio::spawn({
            let call = call.clone();
            async move { call.receive_next().await }
        });
        gate.entered().await;
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        call.cancel();

        let cancelled = Err(Error::Cancelled {
            reason: CancelReason::Caller,
        });
        assert_eq!(send.await.unwrap(), cancelled);
        assert_eq!(receive.await.unwrap(), cancelled.map(|()| None));
        assert!(log.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_both_halves() {
        let (requests, _log) = RecordingTransport::new();
        let (responses, _calls) = ScriptedSource::new([Step::Pending]);
        let call = DuplexCall::with_options(
            requests,
            responses,
            CallOptions::default().with_timeout(Duration::from_millis(100)),
        );

        let deadline = Err(Error::Cancelled {
            reason: CancelReason::Deadline,
        });
        assert_eq!(call.receive_next().await, deadline.clone().map(|()| None));
        assert_eq!(call.send(1).await, deadline);
        assert_eq!(
            call.completion(),
            CallCompletion {
                request: Some(Completion::Cancelled),
                response: Some(Completion::Cancelled),
            }
        );
    }
}
