//! Canonical error and result types for the crate.
//!
//! Two layers are distinguished: [`ErrorCode`] is the fixed set of wire
//! error codes carried by ERROR frames, and [`Error`] is the public
//! taxonomy surfaced to applications. Connection-scoped errors close the
//! connection; stream-scoped errors terminate only the affected stream.

use bytes::Bytes;
use thiserror::Error as ThisError;

use crate::{frame::FrameError, payload::Payload};

/// Wire-level error codes carried by ERROR frames.
///
/// The numeric values are fixed by the RSocket 1.0 specification and must
/// be matched exactly for interop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The SETUP frame was malformed or inconsistent.
    InvalidSetup,
    /// The server does not support the SETUP parameters (e.g. version).
    UnsupportedSetup,
    /// The server refused the SETUP for application reasons.
    RejectedSetup,
    /// Resumption was requested but is not available.
    RejectedResume,
    /// The connection is being terminated because of a protocol fault.
    ConnectionError,
    /// The connection is being closed gracefully.
    ConnectionClose,
    /// The responder's application logic failed.
    ApplicationError,
    /// The responder refused the request (lease exhausted or otherwise).
    Rejected,
    /// The request was cancelled before completion.
    Canceled,
    /// A frame was received in an illegal stream state.
    Invalid,
    /// A code outside the reserved set.
    Other(u32),
}

impl ErrorCode {
    /// The numeric wire value of this code.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::InvalidSetup => 0x001,
            Self::UnsupportedSetup => 0x002,
            Self::RejectedSetup => 0x003,
            Self::RejectedResume => 0x004,
            Self::ConnectionError => 0x101,
            Self::ConnectionClose => 0x102,
            Self::ApplicationError => 0x201,
            Self::Rejected => 0x202,
            Self::Canceled => 0x203,
            Self::Invalid => 0x204,
            Self::Other(code) => code,
        }
    }

    /// Map a numeric wire value back to a code.
    #[must_use]
    pub const fn from_u32(code: u32) -> Self {
        match code {
            0x001 => Self::InvalidSetup,
            0x002 => Self::UnsupportedSetup,
            0x003 => Self::RejectedSetup,
            0x004 => Self::RejectedResume,
            0x101 => Self::ConnectionError,
            0x102 => Self::ConnectionClose,
            0x201 => Self::ApplicationError,
            0x202 => Self::Rejected,
            0x203 => Self::Canceled,
            0x204 => Self::Invalid,
            other => Self::Other(other),
        }
    }

    /// Whether this code is legal only on stream id zero.
    #[must_use]
    pub const fn is_connection_scoped(self) -> bool {
        matches!(
            self,
            Self::InvalidSetup
                | Self::UnsupportedSetup
                | Self::RejectedSetup
                | Self::RejectedResume
                | Self::ConnectionError
                | Self::ConnectionClose
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidSetup => "INVALID_SETUP",
            Self::UnsupportedSetup => "UNSUPPORTED_SETUP",
            Self::RejectedSetup => "REJECTED_SETUP",
            Self::RejectedResume => "REJECTED_RESUME",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::ConnectionClose => "CONNECTION_CLOSE",
            Self::ApplicationError => "APPLICATION_ERROR",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
            Self::Invalid => "INVALID",
            Self::Other(code) => return write!(f, "{code:#x}"),
        };
        f.write_str(name)
    }
}

/// Top-level error type exposed by `weft`.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A wire-level framing fault.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A connection-scoped protocol error; the connection is closed.
    #[error("connection error ({code}): {message}")]
    Connection {
        /// Wire code describing the fault.
        code: ErrorCode,
        /// Human-readable description from the ERROR frame data.
        message: String,
    },

    /// A stream-scoped protocol error; only the stream terminates.
    #[error("stream error ({code}): {message}")]
    Stream {
        /// Wire code describing the fault.
        code: ErrorCode,
        /// Human-readable description from the ERROR frame data.
        message: String,
    },

    /// The responder refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The interaction was cancelled, locally or by the peer.
    #[error("canceled")]
    Canceled,

    /// The responder's application logic reported a failure.
    #[error("application error")]
    Application(Payload),

    /// The connection closed before the interaction completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convenience constructor for a rejection with a message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self { Self::Rejected(message.into()) }

    /// Convenience constructor for an application error with a payload.
    #[must_use]
    pub fn application(payload: impl Into<Payload>) -> Self { Self::Application(payload.into()) }

    /// The wire code an ERROR frame reporting this error would carry.
    #[must_use]
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            Self::Frame(_) | Self::Io(_) => ErrorCode::ConnectionError,
            Self::Connection { code, .. } | Self::Stream { code, .. } => *code,
            Self::Rejected(_) => ErrorCode::Rejected,
            Self::Canceled => ErrorCode::Canceled,
            Self::Application(_) => ErrorCode::ApplicationError,
            Self::ConnectionClosed => ErrorCode::ConnectionClose,
        }
    }

    /// Reconstruct an error from an inbound ERROR frame.
    ///
    /// The wire code and data are preserved so callers can distinguish
    /// rejection from application failure from protocol faults.
    #[must_use]
    pub fn from_wire(code: ErrorCode, data: Bytes) -> Self {
        match code {
            ErrorCode::ApplicationError => Self::Application(Payload::from_data(data)),
            ErrorCode::Rejected => Self::Rejected(text_of(&data)),
            ErrorCode::Canceled => Self::Canceled,
            code if code.is_connection_scoped() => Self::Connection {
                code,
                message: text_of(&data),
            },
            code => Self::Stream {
                code,
                message: text_of(&data),
            },
        }
    }
}

fn text_of(data: &Bytes) -> String { String::from_utf8_lossy(data).into_owned() }

/// Canonical result alias used by `weft` public APIs.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ErrorCode::InvalidSetup, 0x001)]
    #[case(ErrorCode::UnsupportedSetup, 0x002)]
    #[case(ErrorCode::RejectedSetup, 0x003)]
    #[case(ErrorCode::RejectedResume, 0x004)]
    #[case(ErrorCode::ConnectionError, 0x101)]
    #[case(ErrorCode::ConnectionClose, 0x102)]
    #[case(ErrorCode::ApplicationError, 0x201)]
    #[case(ErrorCode::Rejected, 0x202)]
    #[case(ErrorCode::Canceled, 0x203)]
    #[case(ErrorCode::Invalid, 0x204)]
    fn codes_round_trip(#[case] code: ErrorCode, #[case] value: u32) {
        assert_eq!(code.to_u32(), value);
        assert_eq!(ErrorCode::from_u32(value), code);
    }

    #[rstest]
    fn unknown_code_is_preserved() {
        assert_eq!(ErrorCode::from_u32(0x777).to_u32(), 0x777);
    }

    #[rstest]
    fn wire_errors_keep_their_payload() {
        let err = Error::from_wire(ErrorCode::ApplicationError, Bytes::from_static(b"boom"));
        let Error::Application(payload) = err else {
            panic!("expected an application error");
        };
        assert_eq!(payload.data().as_ref(), b"boom");
    }

    #[rstest]
    fn rejection_surfaces_the_message() {
        let err = Error::from_wire(ErrorCode::Rejected, Bytes::from_static(b"no lease"));
        assert!(matches!(err, Error::Rejected(m) if m == "no lease"));
    }
}
