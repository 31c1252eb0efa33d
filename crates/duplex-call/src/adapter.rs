//! Ready-made transports over common async primitives.
//!
//! - [`ChannelRequestTransport`] feeds requests into a bounded
//!   [`mpsc::Sender`]. The receiving end is typically wrapped in a
//!   `ReceiverStream` and handed to a streaming client as the request body;
//!   half-closing drops the sender, which ends that stream.
//! - [`StreamResponseTransport`] pulls responses from any [`Stream`] of
//!   results, such as `tonic::Streaming`.

use crate::{
    error::TransportError,
    transport::{RequestTransport, ResponseTransport},
};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

/// Request transport backed by a bounded channel.
///
/// `write` resolves once the channel has capacity for the message, which is
/// the point at which the transport has accepted it.
#[derive(Debug)]
pub struct ChannelRequestTransport<T> {
    tx: Option<mpsc::Sender<T>>,
}

impl<T> ChannelRequestTransport<T> {
    pub const fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a transport and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl<T: Send> RequestTransport for ChannelRequestTransport<T> {
    type Request = T;

    async fn write(&mut self, message: T) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::unavailable("request channel already closed"))?;
        tx.send(message)
            .await
            .map_err(|_| TransportError::unavailable("request stream receiver dropped"))
    }

    async fn half_close(&mut self) -> Result<(), TransportError> {
        match self.tx.take() {
            Some(_) => Ok(()),
            None => Err(TransportError::unavailable(
                "request channel already closed",
            )),
        }
    }
}

/// Response transport backed by a [`Stream`] of results.
///
/// The end of the stream is end-of-stream for the call; an `Err` item fails
/// the response half.
#[derive(Debug)]
pub struct StreamResponseTransport<S> {
    stream: S,
}

impl<S> StreamResponseTransport<S> {
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S, T, E> ResponseTransport for StreamResponseTransport<S>
where
    S: Stream<Item = Result<T, E>> + Unpin + Send,
    T: Send,
    E: Into<TransportError>,
{
    type Response = T;

    async fn next_message(&mut self) -> Result<Option<T>, TransportError> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}
