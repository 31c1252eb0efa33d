//! Contracts consumed from the transport collaborator.
//!
//! The transport owns the connection, its framing and message encoding. The
//! call coordinator only needs two capabilities from it: somewhere to hand
//! outbound requests, and somewhere to pull inbound responses from. Both are
//! driven by at most one operation at a time; the sink and source wrapping
//! them enforce that, so implementations may assume exclusive access.

use crate::error::TransportError;
use core::future::Future;

/// Outbound half of a streaming call.
pub trait RequestTransport: Send {
    /// The negotiated request message type.
    type Request: Send;

    /// Hands one message to the transport. Resolves once the transport has
    /// accepted it for delivery, not once the peer has received it.
    fn write(
        &mut self,
        message: Self::Request,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Signals that no further requests will be written.
    fn half_close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Inbound half of a streaming call.
pub trait ResponseTransport: Send {
    /// The negotiated response message type.
    type Response: Send;

    /// Pulls the next message, in the order the peer sent it.
    ///
    /// Resolves to `Ok(None)` once the peer has cleanly finished sending.
    /// After `Ok(None)` or an error the transport is not polled again.
    fn next_message(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Response>, TransportError>> + Send;
}
