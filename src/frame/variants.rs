//! Typed bodies for every RSocket frame.
//!
//! A [`Frame`] pairs a [`StreamId`](super::StreamId) with a [`FrameBody`].
//! Flag bits that carry protocol meaning (FOLLOWS, COMPLETE, NEXT, lease,
//! respond) surface here as plain booleans; the codec packs and unpacks
//! them.

use bytes::Bytes;

use super::{FrameType, StreamId};
use crate::{error::ErrorCode, payload::Payload};

/// Protocol version carried by SETUP and RESUME frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Version {
    /// Major version word.
    pub major: u16,
    /// Minor version word.
    pub minor: u16,
}

impl Version {
    /// RSocket 1.0, the only version this crate speaks.
    pub const V1: Self = Self { major: 1, minor: 0 };
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// SETUP frame body: the client's half of the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Setup {
    /// Declared protocol version.
    pub version: Version,
    /// Keepalive cadence in milliseconds.
    pub keepalive_interval_ms: u32,
    /// Liveness deadline in milliseconds.
    pub max_lifetime_ms: u32,
    /// Resume token when the client requests resumption.
    pub resume_token: Option<Bytes>,
    /// MIME type describing payload metadata.
    pub metadata_mime: String,
    /// MIME type describing payload data.
    pub data_mime: String,
    /// Whether the client honors responder-issued leases.
    pub lease: bool,
    /// Setup payload handed to the server's acceptor.
    pub payload: Payload,
}

/// LEASE frame body: a time-bounded grant of requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    /// Validity window in milliseconds.
    pub ttl_ms: u32,
    /// Number of requests granted.
    pub requests: u32,
    /// Optional metadata describing the grant.
    pub metadata: Option<Bytes>,
}

/// KEEPALIVE frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    /// Whether the receiver must echo this frame.
    pub respond: bool,
    /// Last received resume position; always zero here (resume is
    /// unsupported) and ignored on receipt.
    pub last_position: u64,
    /// Opaque data echoed back by the peer.
    pub data: Bytes,
}

/// REQUEST_RESPONSE frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestResponse {
    /// Request payload (or its first fragment).
    pub payload: Payload,
    /// More fragments follow.
    pub follows: bool,
}

/// REQUEST_FNF frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestFnf {
    /// Request payload (or its first fragment).
    pub payload: Payload,
    /// More fragments follow.
    pub follows: bool,
}

/// REQUEST_STREAM frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestStream {
    /// Initial request-N credit granted to the responder.
    pub initial_n: u32,
    /// Request payload (or its first fragment).
    pub payload: Payload,
    /// More fragments follow.
    pub follows: bool,
}

/// REQUEST_CHANNEL frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestChannel {
    /// Initial request-N credit granted to the responder.
    pub initial_n: u32,
    /// First payload of the requester's outbound direction.
    pub payload: Payload,
    /// More fragments follow.
    pub follows: bool,
    /// The requester's outbound direction is already complete.
    pub complete: bool,
}

/// REQUEST_N frame body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestN {
    /// Additional credit; always positive on the wire.
    pub n: u32,
}

/// PAYLOAD frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadFrame {
    /// Carried payload.
    pub payload: Payload,
    /// The payload carries a next value.
    pub next: bool,
    /// The sender's direction of the stream is complete.
    pub complete: bool,
    /// More fragments follow.
    pub follows: bool,
}

/// ERROR frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    /// Wire error code.
    pub code: ErrorCode,
    /// Error data; UTF-8 text by convention.
    pub data: Bytes,
}

impl ErrorBody {
    /// The error data as lossy UTF-8 text.
    #[must_use]
    pub fn message(&self) -> String { String::from_utf8_lossy(&self.data).into_owned() }
}

/// METADATA_PUSH frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataPush {
    /// Pushed metadata.
    pub metadata: Bytes,
}

/// RESUME frame body (decoded for interop, never honoured).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resume {
    /// Declared protocol version.
    pub version: Version,
    /// Token identifying the prior session.
    pub token: Bytes,
    /// Last server position the client received.
    pub last_server_position: u64,
    /// First client position available for replay.
    pub first_client_position: u64,
}

/// RESUME_OK frame body (decoded for interop, never honoured).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResumeOk {
    /// Last client position the server received.
    pub last_client_position: u64,
}

/// EXT frame body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ext {
    /// Extension type identifier.
    pub extended_type: u32,
    /// Extension payload.
    pub payload: Payload,
    /// Receiver may drop the frame if the extension is unknown.
    pub can_ignore: bool,
}

/// The body of a frame, one variant per wire type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameBody {
    /// SETUP.
    Setup(Setup),
    /// LEASE.
    Lease(Lease),
    /// KEEPALIVE.
    Keepalive(Keepalive),
    /// REQUEST_RESPONSE.
    RequestResponse(RequestResponse),
    /// REQUEST_FNF.
    RequestFnf(RequestFnf),
    /// REQUEST_STREAM.
    RequestStream(RequestStream),
    /// REQUEST_CHANNEL.
    RequestChannel(RequestChannel),
    /// REQUEST_N.
    RequestN(RequestN),
    /// CANCEL.
    Cancel,
    /// PAYLOAD.
    Payload(PayloadFrame),
    /// ERROR.
    Error(ErrorBody),
    /// METADATA_PUSH.
    MetadataPush(MetadataPush),
    /// RESUME.
    Resume(Resume),
    /// RESUME_OK.
    ResumeOk(ResumeOk),
    /// EXT.
    Ext(Ext),
}

impl FrameBody {
    /// The wire type of this body.
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self {
            Self::Setup(_) => FrameType::Setup,
            Self::Lease(_) => FrameType::Lease,
            Self::Keepalive(_) => FrameType::Keepalive,
            Self::RequestResponse(_) => FrameType::RequestResponse,
            Self::RequestFnf(_) => FrameType::RequestFnf,
            Self::RequestStream(_) => FrameType::RequestStream,
            Self::RequestChannel(_) => FrameType::RequestChannel,
            Self::RequestN(_) => FrameType::RequestN,
            Self::Cancel => FrameType::Cancel,
            Self::Payload(_) => FrameType::Payload,
            Self::Error(_) => FrameType::Error,
            Self::MetadataPush(_) => FrameType::MetadataPush,
            Self::Resume(_) => FrameType::Resume,
            Self::ResumeOk(_) => FrameType::ResumeOk,
            Self::Ext(_) => FrameType::Ext,
        }
    }
}

/// A complete protocol frame: stream id plus typed body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Stream the frame belongs to; zero for connection frames.
    pub stream_id: StreamId,
    /// Typed frame body.
    pub body: FrameBody,
}

impl Frame {
    /// Construct a frame from parts.
    #[must_use]
    pub const fn new(stream_id: StreamId, body: FrameBody) -> Self { Self { stream_id, body } }

    /// The wire type of this frame.
    #[must_use]
    pub const fn frame_type(&self) -> FrameType { self.body.frame_type() }

    /// Whether the frame addresses the connection rather than a stream.
    #[must_use]
    pub const fn is_connection(&self) -> bool { self.stream_id.is_connection() }

    /// Whether this frame is a fragment with more to follow.
    #[must_use]
    pub const fn follows(&self) -> bool {
        match &self.body {
            FrameBody::RequestResponse(body) => body.follows,
            FrameBody::RequestFnf(body) => body.follows,
            FrameBody::RequestStream(body) => body.follows,
            FrameBody::RequestChannel(body) => body.follows,
            FrameBody::Payload(body) => body.follows,
            _ => false,
        }
    }

    /// An ERROR frame carrying a textual message.
    #[must_use]
    pub fn error(stream_id: StreamId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            stream_id,
            FrameBody::Error(ErrorBody {
                code,
                data: Bytes::from(message.into()),
            }),
        )
    }

    /// A PAYLOAD frame carrying a next value.
    #[must_use]
    pub fn next_payload(stream_id: StreamId, payload: Payload) -> Self {
        Self::new(
            stream_id,
            FrameBody::Payload(PayloadFrame {
                payload,
                next: true,
                complete: false,
                follows: false,
            }),
        )
    }

    /// A PAYLOAD frame carrying a final value and completion.
    #[must_use]
    pub fn last_payload(stream_id: StreamId, payload: Payload) -> Self {
        Self::new(
            stream_id,
            FrameBody::Payload(PayloadFrame {
                payload,
                next: true,
                complete: true,
                follows: false,
            }),
        )
    }

    /// A PAYLOAD frame carrying completion with no value.
    #[must_use]
    pub fn complete(stream_id: StreamId) -> Self {
        Self::new(
            stream_id,
            FrameBody::Payload(PayloadFrame {
                payload: Payload::empty(),
                next: false,
                complete: true,
                follows: false,
            }),
        )
    }

    /// A CANCEL frame for the given stream.
    #[must_use]
    pub const fn cancel(stream_id: StreamId) -> Self { Self::new(stream_id, FrameBody::Cancel) }
}
