//! In-process transport pair.
//!
//! [`pair`] wires a client-side request/response transport pair to a
//! [`Peer`] that plays the remote side of the call. It is useful for tests,
//! benchmarks, and for driving a [`DuplexCall`] without a network.
//!
//! [`DuplexCall`]: crate::DuplexCall

use crate::{
    adapter::{ChannelRequestTransport, StreamResponseTransport},
    error::TransportError,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Client-side request transport produced by [`pair`].
pub type MemoryRequestTransport<Req> = ChannelRequestTransport<Req>;

/// Client-side response transport produced by [`pair`].
pub type MemoryResponseTransport<Resp> =
    StreamResponseTransport<ReceiverStream<Result<Resp, TransportError>>>;

/// Creates connected client transports and the peer serving them.
///
/// `capacity` bounds each direction independently (minimum 1).
pub fn pair<Req, Resp>(
    capacity: usize,
) -> (
    MemoryRequestTransport<Req>,
    MemoryResponseTransport<Resp>,
    Peer<Req, Resp>,
) {
    let capacity = capacity.max(1);
    let (req_tx, req_rx) = mpsc::channel(capacity);
    let (resp_tx, resp_rx) = mpsc::channel(capacity);

    (
        ChannelRequestTransport::new(req_tx),
        StreamResponseTransport::new(ReceiverStream::new(resp_rx)),
        Peer {
            requests: PeerRequests { rx: req_rx },
            responses: PeerResponses { tx: resp_tx },
        },
    )
}

/// The remote side of an in-process call.
#[derive(Debug)]
pub struct Peer<Req, Resp> {
    requests: PeerRequests<Req>,
    responses: PeerResponses<Resp>,
}

impl<Req, Resp> Peer<Req, Resp> {
    /// Receives the next request; `None` once the client half-closed or
    /// dropped its request transport.
    pub async fn recv(&mut self) -> Option<Req> {
        self.requests.recv().await
    }

    /// Sends a response to the client.
    ///
    /// # Errors
    ///
    /// Fails if the client dropped its response transport.
    pub async fn send(&self, response: Resp) -> Result<(), TransportError> {
        self.responses.send(response).await
    }

    /// Splits the peer so requests and responses can be driven from
    /// different tasks.
    pub fn split(self) -> (PeerRequests<Req>, PeerResponses<Resp>) {
        (self.requests, self.responses)
    }
}

/// Request side of a [`Peer`].
#[derive(Debug)]
pub struct PeerRequests<Req> {
    rx: mpsc::Receiver<Req>,
}

impl<Req> PeerRequests<Req> {
    pub async fn recv(&mut self) -> Option<Req> {
        self.rx.recv().await
    }

    /// Stops accepting requests. Pending and future client writes fail with
    /// an `Unavailable` transport error.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Response side of a [`Peer`].
#[derive(Debug)]
pub struct PeerResponses<Resp> {
    tx: mpsc::Sender<Result<Resp, TransportError>>,
}

impl<Resp> PeerResponses<Resp> {
    /// # Errors
    ///
    /// Fails if the client dropped its response transport.
    pub async fn send(&self, response: Resp) -> Result<(), TransportError> {
        self.tx
            .send(Ok(response))
            .await
            .map_err(|_| TransportError::unavailable("client dropped response stream"))
    }

    /// Cleanly ends the response stream.
    pub fn finish(self) {}

    /// Fails the response stream with `err`. The client observes it after
    /// any responses already sent.
    pub async fn fail(self, err: TransportError) {
        let _ = self.tx.send(Err(err)).await;
    }
}
