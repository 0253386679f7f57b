//! Internal messages between the facade and the connection actor.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::Error,
    frame::StreamId,
    payload::{Payload, PayloadStream},
    stream::StreamEvent,
};

/// Commands issued by [`Requester`](crate::requester::Requester) handles
/// and in-flight [`PayloadReceiver`](crate::requester::PayloadReceiver)s.
///
/// Stream ids are allocated by the sender (via the shared allocator) so
/// follow-up commands can address the stream without a round trip to the
/// actor.
pub(crate) enum Command {
    /// Dispatch a fire-and-forget request.
    FireAndForget {
        /// Pre-allocated stream id.
        id: StreamId,
        /// Request payload.
        payload: Payload,
        /// Resolved once the frame is handed to the transport.
        done: oneshot::Sender<Result<(), Error>>,
    },
    /// Dispatch a metadata push on stream zero.
    MetadataPush {
        /// Pushed metadata.
        metadata: Bytes,
        /// Resolved once the frame is handed to the transport.
        done: oneshot::Sender<Result<(), Error>>,
    },
    /// Open a request/response interaction.
    RequestResponse {
        /// Pre-allocated stream id.
        id: StreamId,
        /// Request payload.
        payload: Payload,
        /// Resolved with the response payload or the stream's error.
        reply: oneshot::Sender<Result<Payload, Error>>,
    },
    /// Open a request/stream interaction.
    RequestStream {
        /// Pre-allocated stream id.
        id: StreamId,
        /// Request payload.
        payload: Payload,
        /// Initial request-N credit for the responder.
        initial_n: u32,
        /// Delivery channel for inbound events.
        events: mpsc::UnboundedSender<StreamEvent>,
    },
    /// Open a request/channel interaction.
    RequestChannel {
        /// Pre-allocated stream id.
        id: StreamId,
        /// First payload, carried inside REQUEST_CHANNEL.
        initial: Payload,
        /// Remaining outbound payloads, pulled under peer credit.
        outbound: PayloadStream,
        /// Initial request-N credit for the responder.
        initial_n: u32,
        /// Delivery channel for inbound events.
        events: mpsc::UnboundedSender<StreamEvent>,
    },
    /// Grant more credit on a live stream's inbound direction.
    RequestN {
        /// Stream to credit.
        id: StreamId,
        /// Additional credit.
        n: u32,
    },
    /// Cancel an interaction (or, on a responder stream, its inbound
    /// direction only).
    CancelStream {
        /// Stream to cancel.
        id: StreamId,
    },
    /// Issue a lease to the peer.
    GrantLease {
        /// Validity window.
        ttl: Duration,
        /// Number of requests granted.
        requests: u32,
        /// Resolved once the frame is handed to the transport.
        done: oneshot::Sender<Result<(), Error>>,
    },
    /// Close the connection gracefully.
    Close,
}
