//! Opening duplex calls on tonic clients.
//!
//! A tonic bidirectional-streaming method takes a request stream and resolves
//! to a `Response<Streaming<Resp>>` once the server has sent its headers.
//! [`open`] hands the method a channel-backed request stream, waits for the
//! response (or for the call's cancellation signal, whichever comes first) and
//! wraps both directions in a [`DuplexCall`].
//!
//! ```ignore
//! let mut client = ChatClient::connect("http://[::1]:50051").await?;
//! let call = duplex_call::grpc::open(CallOptions::default(), |requests| {
//!     client.chat(requests)
//! })
//! .await?;
//! call.send(Message::new("hi")).await?;
//! while let Some(reply) = call.receive_next().await? {
//!     println!("{reply:?}");
//! }
//! ```

use crate::{
    adapter::{ChannelRequestTransport, StreamResponseTransport},
    call::DuplexCall,
    error::Error,
    options::CallOptions,
};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Response, Status};

/// A duplex call over a tonic streaming response.
pub type GrpcCall<Req, S> = DuplexCall<ChannelRequestTransport<Req>, StreamResponseTransport<S>>;

/// Starts a bidirectional-streaming call.
///
/// `invoke` receives the request stream and must return the future produced
/// by the generated client method. The request channel holds
/// [`CallOptions::request_buffer`] messages.
///
/// # Errors
///
/// Returns the server's status if the call is rejected, or a `CANCELLED` /
/// `DEADLINE_EXCEEDED` status if the call's signal fires first.
pub async fn open<Req, Resp, S, F, Fut>(
    options: CallOptions,
    invoke: F,
) -> Result<GrpcCall<Req, S>, Status>
where
    Req: Send,
    F: FnOnce(ReceiverStream<Req>) -> Fut,
    Fut: Future<Output = Result<Response<S>, Status>>,
    S: Stream<Item = Result<Resp, Status>> + Unpin + Send,
    Resp: Send,
{
    let (tx, rx) = mpsc::channel(options.request_buffer());
    let ctx = options.into_context();

    let response = tokio::select! {
        biased;
        reason = ctx.cancelled() => {
            #[cfg(feature = "tracing")]
            tracing::debug!("{} cancelled while opening: {reason}", ctx.id());
            return Err(Error::Cancelled { reason }.into());
        }
        res = invoke(ReceiverStream::new(rx)) => res?,
    };

    Ok(DuplexCall::with_context(
        ChannelRequestTransport::new(tx),
        StreamResponseTransport::new(response.into_inner()),
        ctx,
    ))
}
